use crate::close::CloseContext;
use crate::compression::Deflator;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::extensions::Extensions;
use crate::frame::{Frame, OpCode};
use crate::handshake::{self, HandshakeHeaders};
use crate::listener::{self, NoopListener, ThreadRole, WebSocketListener};
use crate::message::Message;
use crate::ping::PeriodicSender;
use crate::queue::{SendQueue, SharedSendQueue};
use crate::read::{ReadOutcome, Reader};
use crate::stream::{self, SocketFlowStream};
use crate::write::Writer;
use std::sync::Arc;
use tokio::io;
use tokio::sync::{Mutex, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{timeout, Duration};

/// Lifecycle of a [`Session`]. Transitions are monotonic within one
/// connect/disconnect cycle: `Created -> Connecting -> Open -> Closing ->
/// Closed`. [`Session::recreate`] is the only way back to `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Open,
    Closing,
    Closed,
}

struct Workers {
    finish_handle: JoinHandle<()>,
    reader_abort: AbortHandle,
    writer_abort: AbortHandle,
}

/// Coordinates the transport dial, opening handshake, and the Reader/Writer/
/// PeriodicSender workers for one WebSocket connection. Unlike the workers it
/// owns, `Session`'s public methods take `&self`: the send queue and worker
/// handles live behind their own locks so a listener callback invoked from
/// inside a worker can call back into `send_text`/`disconnect` without
/// deadlocking on a lock that worker already holds.
pub struct Session {
    url: String,
    config: ClientConfig,
    listener: Arc<dyn WebSocketListener>,
    state: Arc<Mutex<SessionState>>,
    send_queue: Mutex<Option<SharedSendQueue>>,
    deflator: Mutex<Option<Deflator>>,
    negotiated_extensions: Mutex<Option<Extensions>>,
    flush_notify: Mutex<Option<Arc<Notify>>>,
    workers: Mutex<Option<Workers>>,
    close_context: Arc<Mutex<CloseContext>>,
}

impl Session {
    pub fn new(url: impl Into<String>, config: ClientConfig, listener: Arc<dyn WebSocketListener>) -> Self {
        Session {
            url: url.into(),
            config,
            listener,
            state: Arc::new(Mutex::new(SessionState::Created)),
            send_queue: Mutex::new(None),
            deflator: Mutex::new(None),
            negotiated_extensions: Mutex::new(None),
            flush_notify: Mutex::new(None),
            workers: Mutex::new(None),
            close_context: Arc::new(Mutex::new(CloseContext::default())),
        }
    }

    fn notify(&self, role: ThreadRole, f: impl FnOnce()) {
        listener::guard(&self.listener, role, f);
    }

    pub fn with_defaults(url: impl Into<String>) -> Self {
        Session::new(url, ClientConfig::default(), Arc::new(NoopListener))
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    pub async fn negotiated_extensions(&self) -> Option<Extensions> {
        self.negotiated_extensions.lock().await.clone()
    }

    /// Dials, completes the opening handshake, and spawns the background
    /// workers. Returns once the connection is `Open`. The caller observes
    /// failure directly through the returned `Result`, so `onConnectError`
    /// is not fired here — only [`Session::connect_asynchronously`], which
    /// has no caller left to hand an `Err` to, fires it.
    pub async fn connect(&self) -> Result<(), Error> {
        self.establish(self.config.connection_timeout_ms, false).await
    }

    /// Spawns [`Session::connect`] onto the runtime instead of awaiting it
    /// inline, for callers that want to keep driving other work while the
    /// handshake is in flight. This is the only path that fires
    /// `onConnectError` on failure, since the returned `JoinHandle` is
    /// commonly left unawaited.
    pub fn connect_asynchronously(self: Arc<Self>) -> JoinHandle<Result<(), Error>> {
        let timeout_ms = self.config.connection_timeout_ms;
        tokio::spawn(async move { self.establish(timeout_ms, true).await })
    }

    /// Resets a previously used `Session` back to `Created` and connects
    /// again, with its own connection timeout rather than the one fixed at
    /// construction time.
    pub async fn recreate(&self, timeout_ms: u64) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;
            if !matches!(*state, SessionState::Created | SessionState::Closed) {
                return Err(Error::AlreadyConnecting);
            }
            self.transition_state(&mut *state, SessionState::Created).await;
        }
        *self.send_queue.lock().await = None;
        *self.deflator.lock().await = None;
        *self.negotiated_extensions.lock().await = None;
        *self.flush_notify.lock().await = None;
        *self.workers.lock().await = None;
        *self.close_context.lock().await = CloseContext::default();
        self.establish(timeout_ms, false).await
    }

    async fn establish(&self, timeout_ms: u64, notify_on_error: bool) -> Result<(), Error> {
        {
            let mut state = self.state.lock().await;
            // connect() is single-shot: once a Session leaves Created it never
            // goes back on its own. recreate() is the only way back in.
            if *state != SessionState::Created {
                return Err(Error::AlreadyConnecting);
            }
            self.transition_state(&mut *state, SessionState::Connecting).await;
        }

        self.notify(ThreadRole::Connect, || self.listener.on_thread_created(ThreadRole::Connect));
        let target = match handshake::build_request(&self.url, self.config.web_socket_config.extensions.as_ref()) {
            Ok(target) => target,
            Err(e) => {
                if notify_on_error {
                    self.notify(ThreadRole::Connect, || self.listener.on_connect_error(&e));
                }
                let mut state = self.state.lock().await;
                self.transition_state(&mut *state, SessionState::Closed).await;
                return Err(e);
            }
        };

        let dial = self.dial_and_handshake(&target);
        let outcome = if timeout_ms == 0 {
            dial.await
        } else {
            match timeout(Duration::from_millis(timeout_ms), dial).await {
                Ok(result) => result,
                Err(elapsed) => Err(Error::from(elapsed)),
            }
        };

        let (stream, negotiated, headers) = match outcome {
            Ok(v) => v,
            Err(e) => {
                if notify_on_error {
                    self.notify(ThreadRole::Connect, || self.listener.on_connect_error(&e));
                }
                let mut state = self.state.lock().await;
                self.transition_state(&mut *state, SessionState::Closed).await;
                return Err(e);
            }
        };

        self.spawn_workers(stream, negotiated).await;

        {
            let mut state = self.state.lock().await;
            self.transition_state(&mut *state, SessionState::Open).await;
        }
        self.notify(ThreadRole::Connect, || self.listener.on_connected(&headers));
        Ok(())
    }

    async fn dial_and_handshake(
        &self,
        target: &handshake::RequestTarget,
    ) -> Result<(SocketFlowStream, Option<Extensions>, HandshakeHeaders), Error> {
        let mut stream = stream::connect(&target.host, target.port, target.use_tls, &self.config).await?;
        let (negotiated, headers) = handshake::perform_client_handshake(
            &mut stream,
            &target.request,
            &target.key,
            self.config.web_socket_config.extensions.as_ref(),
        )
        .await?;
        Ok((stream, negotiated, headers))
    }

    async fn spawn_workers(&self, stream: SocketFlowStream, negotiated: Option<Extensions>) {
        *self.negotiated_extensions.lock().await = negotiated.clone();

        let permessage_deflate = negotiated.as_ref().map(|e| e.permessage_deflate).unwrap_or(false);
        *self.deflator.lock().await = if permessage_deflate {
            let client_no_context_takeover = negotiated
                .as_ref()
                .and_then(|e| e.client_no_context_takeover)
                .unwrap_or(true);
            let window_bits = negotiated.as_ref().and_then(|e| e.client_max_window_bits);
            Some(Deflator::new(client_no_context_takeover, window_bits))
        } else {
            None
        };

        let mut ws_config = self.config.web_socket_config.clone();
        ws_config.extensions = negotiated;

        let (read_half, write_half) = io::split(stream);
        let send_queue: SharedSendQueue = Arc::new(SendQueue::new(ws_config.frame_queue_size));
        let flush_notify = Arc::new(Notify::new());

        let reader = Reader::new(
            read_half,
            ws_config.clone(),
            send_queue.clone(),
            self.listener.clone(),
            self.close_context.clone(),
        );
        let writer = Writer::new(
            write_half,
            send_queue.clone(),
            self.listener.clone(),
            ws_config.auto_flush,
            flush_notify.clone(),
        );

        self.notify(ThreadRole::Reading, || self.listener.on_thread_created(ThreadRole::Reading));
        self.notify(ThreadRole::Writing, || self.listener.on_thread_created(ThreadRole::Writing));

        let writer_listener = self.listener.clone();
        let writer_handle = tokio::spawn(async move {
            listener::guard(&writer_listener, ThreadRole::Writing, || {
                writer_listener.on_thread_started(ThreadRole::Writing)
            });
            let result = writer.run().await;
            listener::guard(&writer_listener, ThreadRole::Writing, || {
                writer_listener.on_thread_stopping(ThreadRole::Writing)
            });
            result
        });

        let reader_listener = self.listener.clone();
        let reader_handle = tokio::spawn(async move {
            listener::guard(&reader_listener, ThreadRole::Reading, || {
                reader_listener.on_thread_started(ThreadRole::Reading)
            });
            let outcome = reader.run().await;
            listener::guard(&reader_listener, ThreadRole::Reading, || {
                reader_listener.on_thread_stopping(ThreadRole::Reading)
            });
            outcome
        });

        let ping_handle = tokio::spawn(
            PeriodicSender::new(OpCode::Ping, ws_config.ping_interval_ms, send_queue.clone()).run(),
        );
        let pong_handle = tokio::spawn(
            PeriodicSender::new(OpCode::Pong, ws_config.pong_interval_ms, send_queue.clone()).run(),
        );

        let reader_abort = reader_handle.abort_handle();
        let writer_abort = writer_handle.abort_handle();

        let state_handle = self.state.clone();
        let finish_listener = self.listener.clone();
        let finish_queue = send_queue.clone();
        let finish_handle = tokio::spawn(async move {
            listener::guard(&finish_listener, ThreadRole::Finish, || {
                finish_listener.on_thread_started(ThreadRole::Finish)
            });
            let outcome = reader_handle.await;
            ping_handle.abort();
            pong_handle.abort();
            finish_queue.close().await;
            let _ = writer_handle.await;

            let (was_clean, code, reason) = match outcome {
                Ok(ReadOutcome::PeerClosed { code, reason }) => (true, code, reason),
                Ok(ReadOutcome::StreamClosed) => (true, None, String::new()),
                Ok(ReadOutcome::Errored(e)) => {
                    listener::guard(&finish_listener, ThreadRole::Finish, || finish_listener.on_error(&e));
                    (false, None, String::new())
                }
                Err(_join_error) => (false, None, String::new()),
            };

            {
                let mut state = state_handle.lock().await;
                let old = *state;
                *state = SessionState::Closed;
                listener::guard(&finish_listener, ThreadRole::Finish, || {
                    finish_listener.on_state_changed(old, SessionState::Closed)
                });
            }
            listener::guard(&finish_listener, ThreadRole::Finish, || {
                finish_listener.on_disconnected(was_clean, code, reason.as_str())
            });
            listener::guard(&finish_listener, ThreadRole::Finish, || {
                finish_listener.on_thread_stopping(ThreadRole::Finish)
            });
        });

        *self.send_queue.lock().await = Some(send_queue);
        *self.flush_notify.lock().await = Some(flush_notify);
        *self.workers.lock().await = Some(Workers {
            finish_handle,
            reader_abort,
            writer_abort,
        });
    }

    async fn transition_state(&self, state: &mut SessionState, new: SessionState) {
        let old = *state;
        *state = new;
        self.notify(ThreadRole::Connect, || self.listener.on_state_changed(old, new));
    }

    async fn require_queue(&self) -> Result<SharedSendQueue, Error> {
        self.send_queue.lock().await.clone().ok_or(Error::NotConnected)
    }

    /// Enqueues a pre-built frame, routing control opcodes to the
    /// priority lane. Application code normally reaches this only through
    /// `send_text`/`send_binary`/`send_ping`/`send_pong`.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), Error> {
        let queue = self.require_queue().await?;
        if frame.opcode.is_control() {
            queue.enqueue_control(frame).await
        } else {
            queue.enqueue_data(frame).await
        }
    }

    pub async fn send_text(&self, text: impl Into<String>, fin: bool) -> Result<(), Error> {
        self.send_message(Message::Text(text.into()), fin).await
    }

    pub async fn send_binary(&self, data: impl Into<Vec<u8>>, fin: bool) -> Result<(), Error> {
        self.send_message(Message::Binary(data.into()), fin).await
    }

    /// Sends a `Continue` frame following a `send_text`/`send_binary` call
    /// made with `fin=false`, completing or extending that fragmented
    /// message. `fin` marks whether this is the last fragment.
    pub async fn send_continuation(&self, data: impl Into<Vec<u8>>, fin: bool) -> Result<(), Error> {
        self.send_frame(Frame::new(fin, OpCode::Continue, data.into(), false)).await
    }

    pub async fn send_ping(&self, payload: Vec<u8>) -> Result<(), Error> {
        self.send_frame(Frame::ping(payload)?).await
    }

    pub async fn send_pong(&self, payload: Vec<u8>) -> Result<(), Error> {
        self.send_frame(Frame::pong(payload)?).await
    }

    /// Compresses (if permessage-deflate was negotiated and the payload
    /// doesn't exceed the negotiated client window) and splits `message`
    /// into frames bounded by `max_payload_size`, setting RSV1 (`compressed`)
    /// only on the first frame, per RFC 7692 §6, then enqueues them in
    /// order. `fin=false` leaves the last frame unfinished for a caller that
    /// will follow up with `send_continuation`.
    async fn send_message(&self, message: Message, fin: bool) -> Result<(), Error> {
        let queue = self.require_queue().await?;
        let max_payload = self.config.web_socket_config.effective_max_payload_size();
        let mut payload = message.as_binary();

        let negotiated = self.negotiated_extensions.lock().await.clone();
        let window_bits = negotiated.as_ref().and_then(|e| e.client_max_window_bits).unwrap_or(15);
        let skip_compression = window_bits < 15 && payload.len() > (1usize << window_bits as u32);

        let mut deflator_guard = self.deflator.lock().await;
        let use_compression = deflator_guard.is_some() && !skip_compression;
        if use_compression {
            if let Some(deflator) = deflator_guard.as_mut() {
                payload = deflator.compress(&payload)?;
            }
        }
        drop(deflator_guard);

        let mut frames = message.to_frames(max_payload, Some(payload), use_compression);
        if !fin {
            if let Some(last) = frames.last_mut() {
                last.final_fragment = false;
            }
        }

        for frame in frames {
            queue.enqueue_data(frame).await?;
        }
        Ok(())
    }

    /// Forces a flush of whatever the writer has buffered. A no-op when
    /// `auto_flush` is on, since every enqueued frame is already flushed as
    /// it's written.
    pub async fn flush(&self) -> Result<(), Error> {
        if self.config.web_socket_config.auto_flush {
            return Ok(());
        }
        let notify = self.flush_notify.lock().await.clone().ok_or(Error::NotConnected)?;
        notify.notify_one();
        Ok(())
    }

    /// Sends a CLOSE frame and waits up to `timeout_ms` (`0` waits forever)
    /// for the workers to drain and tear down. If the deadline passes first,
    /// the reader and writer tasks are aborted directly.
    pub async fn disconnect(&self, code: u16, reason: &str, timeout_ms: u64) -> Result<(), Error> {
        let workers = self.workers.lock().await.take();

        let Some(workers) = workers else {
            let mut state = self.state.lock().await;
            if *state != SessionState::Closed {
                self.transition_state(&mut *state, SessionState::Closed).await;
            }
            return Ok(());
        };

        {
            let mut state = self.state.lock().await;
            self.transition_state(&mut *state, SessionState::Closing).await;
        }

        {
            let mut ctx = self.close_context.lock().await;
            ctx.client_close_sent = true;
            ctx.close_code = Some(code);
            ctx.close_reason = reason.to_string();
        }

        if let Some(queue) = self.send_queue.lock().await.as_ref() {
            let _ = queue.enqueue_control(Frame::close(Some(code), reason)?).await;
            queue.close().await;
        }

        let Workers {
            finish_handle,
            reader_abort,
            writer_abort,
        } = workers;
        let completed = if timeout_ms == 0 {
            finish_handle.await.is_ok()
        } else {
            match timeout(Duration::from_millis(timeout_ms), finish_handle).await {
                Ok(join_result) => join_result.is_ok(),
                Err(_elapsed) => false,
            }
        };
        if !completed {
            reader_abort.abort();
            writer_abort.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::NoopListener;

    fn test_session() -> Session {
        Session::new("ws://example.com", ClientConfig::default(), Arc::new(NoopListener))
    }

    #[tokio::test]
    async fn initial_state_is_created() {
        let session = test_session();
        assert_eq!(session.state().await, SessionState::Created);
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let session = test_session();
        let err = session.send_text("hi", true).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_a_no_op() {
        let session = test_session();
        assert!(session.disconnect(1000, "bye", 100).await.is_ok());
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn flush_before_connect_is_not_connected_when_auto_flush_disabled() {
        let mut config = ClientConfig::default();
        config.web_socket_config.auto_flush = false;
        let session = Session::new("ws://example.com", config, Arc::new(NoopListener));
        let err = session.flush().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn flush_is_a_no_op_when_auto_flush_enabled_even_unconnected() {
        let session = test_session();
        assert!(session.flush().await.is_ok());
    }
}
