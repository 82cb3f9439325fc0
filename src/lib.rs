//! Async, client-only WebSocket implementation for the Tokio stack.
//!
//! [`Session`] dials a `ws://`/`wss://` URL, performs the RFC 6455 opening
//! handshake (optionally negotiating permessage-deflate per RFC 7692), and
//! drives a reader/writer worker pair over the resulting stream. Application
//! code observes frames and lifecycle events through a [`WebSocketListener`]
//! passed in at construction time, and sends through `Session::send_text`/
//! `send_binary`/`send_continuation`/`send_frame`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsconn::config::ClientConfig;
//! use wsconn::listener::NoopListener;
//! use wsconn::session::Session;
//!
//! # async fn run() -> Result<(), wsconn::error::Error> {
//! let session = Session::new("ws://echo.example.com", ClientConfig::default(), Arc::new(NoopListener));
//! session.connect().await?;
//! session.send_text("hello", true).await?;
//! session.disconnect(1000, "done", 5_000).await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod close;
pub mod compression;
pub mod config;
pub mod error;
pub mod extensions;
pub mod frame;
pub mod handshake;
pub mod listener;
pub mod message;
pub mod ping;
pub mod proxy;
pub mod queue;
pub mod read;
pub mod session;
pub mod stream;
pub mod utils;
pub mod write;

use std::sync::Arc;

pub use config::{ClientConfig, WebSocketConfig};
pub use error::Error;
pub use listener::{NoopListener, WebSocketListener};
pub use session::{Session, SessionState};

/// Connects to `url` with default configuration and no listener, returning
/// the `Session` once the opening handshake completes.
pub async fn connect(url: impl Into<String>) -> Result<Session, Error> {
    connect_with_config(url, ClientConfig::default(), Arc::new(NoopListener)).await
}

/// Connects to `url` with caller-supplied configuration and listener,
/// returning the `Session` once the opening handshake completes.
pub async fn connect_with_config(
    url: impl Into<String>,
    config: ClientConfig,
    listener: Arc<dyn WebSocketListener>,
) -> Result<Session, Error> {
    let session = Session::new(url, config, listener);
    session.connect().await?;
    Ok(session)
}
