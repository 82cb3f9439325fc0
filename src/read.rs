use crate::close::SharedCloseContext;
use crate::compression::Inflator;
use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::frame::{decode_frame, Frame, OpCode};
use crate::listener::{self, ThreadRole, WebSocketListener};
use crate::message::Message;
use crate::queue::SharedSendQueue;
use crate::stream::SocketFlowStream;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, BufReader, ReadHalf};

#[derive(Clone)]
struct FragmentedMessage {
    fragments: Vec<u8>,
    op_code: OpCode,
    compressed: bool,
}

/// How the reader's loop ended, so [`crate::session::Session`] knows whether
/// to treat the disconnect as clean.
pub enum ReadOutcome {
    /// Peer sent a CLOSE frame; we already mirrored it onto the send queue.
    PeerClosed { code: Option<u16>, reason: String },
    /// The underlying stream ended (EOF) without a CLOSE frame.
    StreamClosed,
    /// A protocol violation or I/O error terminated the loop.
    Errored(Error),
}

pub struct Reader {
    buf_reader: BufReader<ReadHalf<SocketFlowStream>>,
    fragmented_message: Option<FragmentedMessage>,
    config: WebSocketConfig,
    inflator: Option<Inflator>,
    permessage_deflate_enabled: bool,
    send_queue: SharedSendQueue,
    listener: Arc<dyn WebSocketListener>,
    close_context: SharedCloseContext,
    pending_close: Option<ReadOutcome>,
}

impl Reader {
    pub fn new(
        read: ReadHalf<SocketFlowStream>,
        config: WebSocketConfig,
        send_queue: SharedSendQueue,
        listener: Arc<dyn WebSocketListener>,
        close_context: SharedCloseContext,
    ) -> Self {
        let permessage_deflate_enabled = config
            .extensions
            .as_ref()
            .map(|e| e.permessage_deflate)
            .unwrap_or(false);
        let inflator = config.extensions.as_ref().and_then(|e| {
            if e.permessage_deflate {
                Some(Inflator::new(
                    e.server_no_context_takeover.unwrap_or(false),
                    e.server_max_window_bits,
                ))
            } else {
                None
            }
        });

        Reader {
            buf_reader: BufReader::new(read),
            fragmented_message: None,
            config,
            inflator,
            permessage_deflate_enabled,
            send_queue,
            listener,
            close_context,
            pending_close: None,
        }
    }

    fn notify(&self, f: impl FnOnce()) {
        listener::guard(&self.listener, ThreadRole::Reading, f);
    }

    /// Runs the decode-dispatch loop until the connection ends, either
    /// cleanly (peer CLOSE, EOF) or via a protocol/I-O error.
    pub async fn run(mut self) -> ReadOutcome {
        loop {
            match self.read_one_frame().await {
                Ok(Some(frame)) => {
                    if let Err(e) = self.dispatch(frame).await {
                        self.notify(|| self.listener.on_error(&e));
                        match &e {
                            Error::DeflateError(_) | Error::InflateError(_) => {
                                self.notify(|| self.listener.on_message_decompression_error(&e))
                            }
                            Error::FromUtf8Error { .. } => {
                                self.notify(|| self.listener.on_text_message_error(&e))
                            }
                            _ => {}
                        }
                        let _ = self.enqueue_close(1002, "").await;
                        return ReadOutcome::Errored(e);
                    }
                }
                Ok(None) => {
                    if self.config.missing_close_frame_allowed {
                        return ReadOutcome::StreamClosed;
                    }
                    let err = Error::MissingCloseFrame;
                    self.notify(|| self.listener.on_error(&err));
                    return ReadOutcome::Errored(err);
                }
                Err(e) => {
                    self.notify(|| self.listener.on_error(&e));
                    self.notify(|| self.listener.on_frame_read_error(&e));
                    return ReadOutcome::Errored(e);
                }
            }
            if let Some(outcome) = self.take_peer_close() {
                return outcome;
            }
        }
    }

    fn take_peer_close(&mut self) -> Option<ReadOutcome> {
        self.pending_close.take()
    }

    async fn read_one_frame(&mut self) -> Result<Option<Frame>, Error> {
        let max_frame_size = self.config.max_frame_size;
        match decode_frame(
            &mut self.buf_reader,
            max_frame_size,
            self.permessage_deflate_enabled,
            self.config.extended,
        )
        .await
        {
            Ok((frame, _rsv1)) => {
                self.notify(|| self.listener.on_frame_received(&frame));
                Ok(Some(frame))
            }
            Err(Error::IOError { source }) if is_eof(&source) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), Error> {
        match frame.opcode {
            OpCode::Text | OpCode::Binary if !frame.final_fragment => {
                if self.fragmented_message.is_some() {
                    return Err(Error::FragmentedInProgress);
                }
                self.fragmented_message = Some(FragmentedMessage {
                    op_code: frame.opcode,
                    fragments: frame.payload,
                    compressed: frame.compressed,
                });
                Ok(())
            }
            OpCode::Continue => {
                let Some(fragmented) = self.fragmented_message.as_mut() else {
                    return Err(Error::InvalidContinuationFrame);
                };
                fragmented.fragments.extend_from_slice(&frame.payload);
                if let Some(max) = self.config.max_message_size {
                    if fragmented.fragments.len() > max {
                        return Err(Error::MaxMessageSize);
                    }
                }
                if frame.final_fragment {
                    let completed = self.fragmented_message.take().unwrap();
                    self.finish_message(completed.op_code, completed.fragments, completed.compressed)
                        .await
                } else {
                    Ok(())
                }
            }
            OpCode::Text | OpCode::Binary => {
                if self.fragmented_message.is_some() {
                    return Err(Error::InvalidFrameFragmentation);
                }
                self.finish_message(frame.opcode, frame.payload, frame.compressed)
                    .await
            }
            OpCode::Close => {
                let (code, reason) = Frame::parse_close_payload(&frame.payload)?;
                self.notify(|| self.listener.on_close_frame_received(code, &reason));

                let mut ctx = self.close_context.lock().await;
                ctx.server_close_received = true;
                ctx.close_code = code;
                ctx.close_reason = reason.clone();
                let client_close_sent = ctx.client_close_sent;
                drop(ctx);

                if !client_close_sent {
                    self.enqueue_close_mirror(code, reason.clone()).await?;
                }
                self.pending_close = Some(ReadOutcome::PeerClosed { code, reason });
                Ok(())
            }
            OpCode::Ping => {
                self.notify(|| self.listener.on_ping_received(&frame.payload));
                self.send_queue
                    .enqueue_control(Frame::pong(frame.payload)?)
                    .await?;
                Ok(())
            }
            OpCode::Pong => {
                self.notify(|| self.listener.on_pong_received(&frame.payload));
                Ok(())
            }
        }
    }

    async fn finish_message(
        &mut self,
        op_code: OpCode,
        mut payload: Vec<u8>,
        compressed: bool,
    ) -> Result<(), Error> {
        if compressed {
            let Some(inflator) = self.inflator.as_mut() else {
                return Err(Error::RSVNotZero);
            };
            payload = inflator.decompress(&payload)?;
        }

        let frame = Frame::new(true, op_code, payload, false);
        match Message::from_frame(frame)? {
            Message::Text(text) => {
                self.notify(|| self.listener.on_text_message(&text));
                Ok(())
            }
            Message::Binary(data) => {
                self.notify(|| self.listener.on_binary_message(&data));
                Ok(())
            }
        }
    }

    async fn enqueue_close_mirror(&mut self, code: Option<u16>, reason: String) -> Result<(), Error> {
        let frame = Frame::close(code, &reason)?;
        self.send_queue.enqueue_control(frame).await
    }

    async fn enqueue_close(&mut self, code: u16, reason: &str) -> Result<(), Error> {
        self.send_queue
            .enqueue_control(Frame::close(Some(code), reason)?)
            .await
    }
}

fn is_eof(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::UnexpectedEof
}
