use crate::extensions::Extensions;
use std::time::Duration;

/// Client-side connection configuration, analogous to `nv-websocket-client`'s
/// `WebSocketFactory`/`WebSocket` setters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
    /// Path to a PEM file of additional trust anchors to add to the default
    /// webpki root set, for talking to servers with a private CA.
    pub ca_file: Option<String>,
    /// Verify the TLS certificate's hostname against the connection URL.
    /// Disabling this is only meant for talking to test servers.
    pub verify_hostname: bool,
    /// Timeout for the TCP connect + opening handshake, in milliseconds.
    /// `0` disables the timeout.
    pub connection_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            web_socket_config: WebSocketConfig::default(),
            ca_file: None,
            verify_hostname: true,
            connection_timeout_ms: 90_000,
        }
    }
}

impl ClientConfig {
    pub fn connection_timeout(&self) -> Option<Duration> {
        if self.connection_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.connection_timeout_ms))
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: Option<usize>,
    pub max_message_size: Option<usize>,
    /// Maximum size of a single payload handed to the writer before it is
    /// split into multiple frames. `None` falls back to `max_frame_size`.
    pub max_payload_size: Option<usize>,
    /// Capacity of the outgoing [`crate::queue::SendQueue`].
    pub frame_queue_size: usize,
    /// Negotiated/offered permessage-deflate parameters. `None` disables the
    /// extension entirely.
    pub extensions: Option<Extensions>,
    /// Interval between automatically generated PING frames. `0` disables
    /// the periodic pinger.
    pub ping_interval_ms: u64,
    /// Interval between automatically generated unsolicited PONG frames.
    /// `0` disables the periodic ponger.
    pub pong_interval_ms: u64,
    /// Flush the writer after every enqueued frame rather than batching.
    pub auto_flush: bool,
    /// Relaxes frame decoding: skips the RSV-bits check and strict opcode
    /// validation instead of failing the connection on either.
    pub extended: bool,
    /// Whether the connection may be torn down by the peer without a
    /// closing handshake (bare TCP FIN/RST) without that being treated as
    /// a protocol error.
    pub missing_close_frame_allowed: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
            max_payload_size: None,
            frame_queue_size: 256,
            extensions: None,
            ping_interval_ms: 0,
            pong_interval_ms: 0,
            auto_flush: true,
            extended: false,
            missing_close_frame_allowed: true,
        }
    }
}

impl WebSocketConfig {
    pub fn effective_max_payload_size(&self) -> usize {
        self.max_payload_size
            .or(self.max_frame_size)
            .unwrap_or(16 << 20)
    }
}
