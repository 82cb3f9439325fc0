use crate::error::Error;
use crate::frame::{encode_frame, Frame};
use crate::listener::{self, ThreadRole, WebSocketListener};
use crate::queue::SharedSendQueue;
use crate::stream::SocketFlowStream;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Notify;

/// Drains [`crate::queue::SendQueue`] and writes each frame to the socket.
/// Frame masking and header encoding is delegated to
/// [`crate::frame::encode_frame`]; this worker's job is the queue-drain loop
/// plus listener notification and auto-flush behavior.
pub struct Writer {
    write_half: WriteHalf<SocketFlowStream>,
    send_queue: SharedSendQueue,
    listener: Arc<dyn WebSocketListener>,
    auto_flush: bool,
    flush_requested: Arc<Notify>,
}

impl Writer {
    pub fn new(
        write_half: WriteHalf<SocketFlowStream>,
        send_queue: SharedSendQueue,
        listener: Arc<dyn WebSocketListener>,
        auto_flush: bool,
        flush_requested: Arc<Notify>,
    ) -> Self {
        Writer {
            write_half,
            send_queue,
            listener,
            auto_flush,
            flush_requested,
        }
    }

    fn notify(&self, f: impl FnOnce()) {
        listener::guard(&self.listener, ThreadRole::Writing, f);
    }

    /// Runs until the send queue is closed and drained, or a write fails.
    /// On a write failure, the failed frame and everything still queued are
    /// reported via `on_frame_unsent` before returning the error.
    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            let frame = tokio::select! {
                frame = self.send_queue.dequeue() => frame,
                _ = self.flush_requested.notified() => {
                    let _ = self.write_half.flush().await;
                    continue;
                }
            };
            let Some(frame) = frame else {
                return Ok(());
            };

            let set_rsv1 = frame.compressed;
            match encode_frame(&mut self.write_half, &frame, set_rsv1).await {
                Ok(()) => {
                    self.notify(|| self.listener.on_frame_sent(&frame));
                    if self.auto_flush {
                        if let Err(e) = self.write_half.flush().await {
                            let e = Error::from(e);
                            self.notify(|| self.listener.on_error(&e));
                            self.notify(|| self.listener.on_send_error(&e));
                            self.notify(|| self.listener.on_frame_unsent(&frame));
                            self.drain_remaining_as_unsent().await;
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    self.notify(|| self.listener.on_error(&e));
                    self.notify(|| self.listener.on_send_error(&e));
                    self.notify(|| self.listener.on_frame_unsent(&frame));
                    self.drain_remaining_as_unsent().await;
                    return Err(e);
                }
            }
        }
    }

    async fn drain_remaining_as_unsent(&mut self) {
        self.send_queue.close().await;
        while let Some(frame) = self.send_queue.dequeue().await {
            self.notify(|| self.listener.on_frame_unsent(&frame));
        }
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        self.write_half.flush().await.map_err(Error::from)
    }

    pub async fn write_direct(&mut self, frame: &Frame, set_rsv1: bool) -> Result<(), Error> {
        encode_frame(&mut self.write_half, frame, set_rsv1).await?;
        self.write_half.flush().await?;
        Ok(())
    }
}
