use crate::error::Error;
use crate::frame::Frame;
use crate::handshake::HandshakeHeaders;
use crate::session::SessionState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Identifies which of a [`crate::session::Session`]'s background workers a
/// thread-lifecycle callback refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    Reading,
    Writing,
    Connect,
    Finish,
}

/// Observer for a [`crate::session::Session`]'s lifecycle, modeled on
/// `nv-websocket-client`'s `WebSocketListener`: every method has a no-op
/// default, and callbacks fire synchronously, in-line, on whichever worker
/// observed the event. A listener is free to call back into the `Session`
/// (e.g. `send_text` from inside `on_text_message`) — the worker that
/// dispatches never holds a lock the call would need.
///
/// `on_error` may be invoked more than once for a single underlying
/// incident (for example once from the reader when a frame fails to decode,
/// and again from the writer when it subsequently fails to flush the
/// resulting close frame). Callers that drive reconnection should key off
/// [`WebSocketListener::on_disconnected`], not `on_error`.
pub trait WebSocketListener: Send + Sync {
    fn on_state_changed(&self, _old: SessionState, _new: SessionState) {}

    fn on_connected(&self, _headers: &HandshakeHeaders) {}

    fn on_connect_error(&self, _error: &Error) {}

    fn on_frame_received(&self, _frame: &Frame) {}

    fn on_text_message(&self, _text: &str) {}

    fn on_binary_message(&self, _data: &[u8]) {}

    fn on_text_message_error(&self, _error: &Error) {}

    fn on_message_decompression_error(&self, _error: &Error) {}

    fn on_ping_received(&self, _payload: &[u8]) {}

    fn on_pong_received(&self, _payload: &[u8]) {}

    fn on_close_frame_received(&self, _code: Option<u16>, _reason: &str) {}

    fn on_frame_sent(&self, _frame: &Frame) {}

    fn on_frame_unsent(&self, _frame: &Frame) {}

    fn on_send_error(&self, _error: &Error) {}

    fn on_frame_read_error(&self, _error: &Error) {}

    fn on_disconnected(&self, _was_clean: bool, _code: Option<u16>, _reason: &str) {}

    /// Fired for any error not covered by a more specific callback above.
    /// May fire multiple times for one incident; see the trait docs.
    fn on_error(&self, _error: &Error) {}

    fn on_unexpected_error(&self, _error: &Error) {}

    fn on_thread_created(&self, _role: ThreadRole) {}

    fn on_thread_started(&self, _role: ThreadRole) {}

    fn on_thread_stopping(&self, _role: ThreadRole) {}

    /// Invoked when one of this trait's own methods panics while being
    /// dispatched. The default logs and swallows the panic so a faulty
    /// listener cannot bring a worker down.
    fn handle_callback_error(&self, role: ThreadRole, error: &str) {
        log::error!("listener callback panicked during {role:?}: {error}");
    }
}

/// A listener that does nothing, useful as a default for a [`crate::session::Session`]
/// built without one.
pub struct NoopListener;

impl WebSocketListener for NoopListener {}

/// Runs `f` (a single listener-callback dispatch), catching a panic rather
/// than letting it unwind into the Reader/Writer/Finish worker that called
/// it. On panic, routes the message to `handle_callback_error`.
pub(crate) fn guard<F: FnOnce()>(listener: &Arc<dyn WebSocketListener>, role: ThreadRole, f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        listener.handle_callback_error(role, &panic_message(&payload));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked with a non-string payload".to_string()
    }
}
