use httparse::Error as HttpParseError;
use pki_types::InvalidDnsNameError;
use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

/// Every failure mode a [`crate::session::Session`] can surface, either
/// through a returned `Result` or through [`crate::listener::WebSocketListener::on_error`].
#[derive(Error, Debug)]
pub enum Error {
    // --- I/O and general ---
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO Error happened: {source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("send queue is closed")]
    SendQueueClosed,

    #[error("a listener callback panicked: {0}")]
    CallbackError(String),

    // --- Connection setup ---
    #[error("{source}")]
    URLParseError {
        #[from]
        source: ParseError,
    },

    #[error("Invalid scheme in WebSocket URL, expected ws or wss")]
    InvalidSchemeURL,

    #[error("URL has no host")]
    URLNoHost,

    #[error("URL has no port")]
    URLNoPort,

    #[error("{source}")]
    DomainError {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("use_tls = `{0}` argument does not match the passed URL scheme: `{1}`")]
    SchemeAgainstTlsConfig(bool, String),

    #[error("failed to connect through HTTP proxy: {0}")]
    ProxyConnectFailed(String),

    #[error("connect() has already been called on this session")]
    AlreadyConnecting,

    #[error("session is not in a state that allows sending frames")]
    NotConnected,

    // --- Opening handshake ---
    #[error("Invalid handshake request method and version")]
    InvalidHTTPHandshake,

    #[error("Connection: Upgrade header missing in the response")]
    NoConnectionHeaderPresent,

    #[error("Upgrade: websocket header missing in the response")]
    NoUpgradeHeaderPresent,

    #[error("Host header missing in the request")]
    NoHostHeaderPresent,

    #[error("Couldn't find Sec-WebSocket-Key header in the request")]
    NoSecWebsocketKey,

    #[error("Server didn't upgrade the connection")]
    NoUpgrade,

    #[error("Server didn't send a valid Sec-WebSocket-Accept key")]
    InvalidAcceptKey,

    #[error("Server responded with unexpected HTTP status {0}")]
    UnexpectedStatusCode(u16),

    #[error("Server negotiated a subprotocol `{0}` that was never offered")]
    UnsolicitedSubProtocol(String),

    #[error("{source}")]
    HttpParseError {
        #[from]
        source: HttpParseError,
    },

    #[error("Incomplete HTTP request")]
    IncompleteHTTPRequest,

    #[error("handshake response exceeded the maximum header size before completing")]
    HandshakeTooLarge,

    // --- Framing / protocol ---
    #[error("RSV bit set without a negotiated extension to interpret it")]
    RSVNotZero,

    #[error("Control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("Control frame with invalid payload size, must not be greater than 125")]
    ControlFramePayloadSize,

    #[error("fragment_size: `{0}` can't be greater than max_frame_size: `{1}`")]
    CustomFragmentSizeExceeded(usize, usize),

    #[error("Max frame size reached")]
    MaxFrameSize,

    #[error("Max message size reached")]
    MaxMessageSize,

    #[error("Invalid frame while there is a fragmented message in progress")]
    InvalidFrameFragmentation,

    #[error("Incoming fragmented message but there is one already in progress")]
    FragmentedInProgress,

    #[error("Invalid continuation frame: no fragmented message to continue")]
    InvalidContinuationFrame,

    #[error("Invalid opcode: `{0}`")]
    InvalidOpcode(u8),

    #[error("Invalid close frame payload")]
    InvalidCloseFrame,

    #[error("server frame had the MASK bit set")]
    ServerFrameMasked,

    #[error("connection ended without a closing handshake")]
    MissingCloseFrame,

    // --- Extension negotiation / compression ---
    #[error("permessage-deflate parameter `{0}` is not supported")]
    ExtensionUnsupportedParameter(String),

    #[error("max_window_bits should be a value between 8 and 15")]
    InvalidMaxWindowBits,

    #[error("extension negotiation produced conflicting RSV usage")]
    ExtensionsConflict,

    #[error("DEFLATE compression failed: {0}")]
    DeflateError(String),

    #[error("DEFLATE decompression failed: {0}")]
    InflateError(String),
}
