use crate::frame::{Frame, OpCode};
use crate::queue::SharedSendQueue;
use std::time::Duration;
use tokio::time::interval;

/// Periodically enqueues a PING or PONG frame on an interval, the way
/// `nv-websocket-client`'s `PeriodicalFrameSender` drives keepalive traffic
/// independent of application sends. An `interval_ms` of `0` disables the
/// sender entirely (the task exits immediately without enqueueing anything).
pub struct PeriodicSender {
    opcode: OpCode,
    interval_ms: u64,
    send_queue: SharedSendQueue,
    payload_generator: Box<dyn Fn() -> Vec<u8> + Send + Sync>,
}

impl PeriodicSender {
    pub fn new(opcode: OpCode, interval_ms: u64, send_queue: SharedSendQueue) -> Self {
        assert!(
            matches!(opcode, OpCode::Ping | OpCode::Pong),
            "PeriodicSender only supports Ping/Pong"
        );
        PeriodicSender {
            opcode,
            interval_ms,
            send_queue,
            payload_generator: Box::new(Vec::new),
        }
    }

    pub fn with_payload_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        self.payload_generator = Box::new(generator);
        self
    }

    /// Runs until the send queue is closed. Exits immediately if disabled.
    pub async fn run(self) {
        if self.interval_ms == 0 {
            return;
        }
        let mut ticker = interval(Duration::from_millis(self.interval_ms));
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let payload = (self.payload_generator)();
            let frame = match self.opcode {
                OpCode::Ping => Frame::ping(payload),
                OpCode::Pong => Frame::pong(payload),
                _ => unreachable!(),
            };
            let Ok(frame) = frame else {
                continue;
            };
            if self.send_queue.enqueue_control(frame).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SendQueue;
    use std::sync::Arc;

    #[tokio::test]
    async fn disabled_sender_returns_immediately() {
        let queue = Arc::new(SendQueue::new(4));
        let sender = PeriodicSender::new(OpCode::Ping, 0, queue.clone());
        sender.run().await;
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_sender_enqueues_on_interval() {
        let queue = Arc::new(SendQueue::new(4));
        let sender = PeriodicSender::new(OpCode::Ping, 50, queue.clone());
        let handle = tokio::spawn(sender.run());

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;

        assert!(queue.len().await >= 1);
        handle.abort();
    }
}
