use crate::error::Error;
use crate::frame::Frame;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

struct QueueState {
    control: VecDeque<Frame>,
    data: VecDeque<Frame>,
    capacity: usize,
    closed: bool,
}

/// Bounded FIFO of outgoing frames with control-frame priority: PING/PONG/
/// CLOSE frames enqueued with [`SendQueue::enqueue_control`] always drain
/// ahead of data frames enqueued with [`SendQueue::enqueue_data`], and never
/// block even when the queue is at capacity (a peer that stops reading data
/// must not also be able to starve our own keepalive traffic).
pub struct SendQueue {
    state: Mutex<QueueState>,
    not_full: Notify,
    not_empty: Notify,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        SendQueue {
            state: Mutex::new(QueueState {
                control: VecDeque::new(),
                data: VecDeque::new(),
                capacity,
                closed: false,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Enqueues a data frame, waiting for room if the queue is at capacity.
    pub async fn enqueue_data(&self, frame: Frame) -> Result<(), Error> {
        loop {
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(Error::SendQueueClosed);
                }
                if state.data.len() + state.control.len() < state.capacity {
                    state.data.push_back(frame);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Enqueues a control frame without blocking, even past capacity.
    pub async fn enqueue_control(&self, frame: Frame) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::SendQueueClosed);
        }
        state.control.push_back(frame);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Waits for and removes the next frame to send, control frames first.
    pub async fn dequeue(&self) -> Option<Frame> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(frame) = state.control.pop_front() {
                    self.not_full.notify_one();
                    return Some(frame);
                }
                if let Some(frame) = state.data.pop_front() {
                    self.not_full.notify_one();
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    /// Closes the queue, waking any blocked enqueuer/dequeuer. Already
    /// queued frames remain available to `dequeue` until drained.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        drop(state);
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.data.len() + state.control.len()
    }
}

pub type SharedSendQueue = Arc<SendQueue>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::OpCode;

    #[tokio::test]
    async fn control_frames_drain_before_data() {
        let queue = SendQueue::new(8);
        queue
            .enqueue_data(Frame::new(true, OpCode::Text, b"data".to_vec(), false))
            .await
            .unwrap();
        queue
            .enqueue_control(Frame::ping(vec![]).unwrap())
            .await
            .unwrap();

        let first = queue.dequeue().await.unwrap();
        assert_eq!(first.opcode, OpCode::Ping);
        let second = queue.dequeue().await.unwrap();
        assert_eq!(second.opcode, OpCode::Text);
    }

    #[tokio::test]
    async fn closed_queue_rejects_new_data_enqueues() {
        let queue = SendQueue::new(8);
        queue.close().await;
        let err = queue
            .enqueue_data(Frame::new(true, OpCode::Text, b"x".to_vec(), false))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SendQueueClosed));
    }

    #[tokio::test]
    async fn dequeue_returns_none_once_closed_and_drained() {
        let queue = SendQueue::new(8);
        queue.close().await;
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn control_enqueue_ignores_capacity() {
        let queue = SendQueue::new(1);
        queue
            .enqueue_data(Frame::new(true, OpCode::Text, b"x".to_vec(), false))
            .await
            .unwrap();
        // data queue is now at capacity; control must still succeed.
        queue
            .enqueue_control(Frame::ping(vec![]).unwrap())
            .await
            .unwrap();
        assert_eq!(queue.len().await, 2);
    }
}
