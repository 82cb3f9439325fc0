use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracks which side of the closing handshake (RFC 6455 §7.1.1) has already
/// happened, shared between [`crate::session::Session`] and [`crate::read::Reader`]
/// so the reader knows whether a peer CLOSE still needs mirroring back.
#[derive(Debug, Default)]
pub(crate) struct CloseContext {
    pub client_close_sent: bool,
    pub server_close_received: bool,
    pub close_code: Option<u16>,
    pub close_reason: String,
}

pub(crate) type SharedCloseContext = Arc<Mutex<CloseContext>>;
