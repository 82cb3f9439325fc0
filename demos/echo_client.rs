use log::{error, info};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{interval, Duration};
use wsconn::config::ClientConfig;
use wsconn::error::Error;
use wsconn::handshake::HandshakeHeaders;
use wsconn::listener::WebSocketListener;
use wsconn::session::Session;

struct EchoListener {
    received: AtomicUsize,
    done: Arc<Notify>,
}

impl WebSocketListener for EchoListener {
    fn on_connected(&self, _headers: &HandshakeHeaders) {
        info!("connected");
    }

    fn on_text_message(&self, text: &str) {
        info!("received message: {text}");
        if self.received.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
            self.done.notify_one();
        }
    }

    fn on_error(&self, error: &Error) {
        error!("stream error: {error}");
    }

    fn on_disconnected(&self, was_clean: bool, code: Option<u16>, reason: &str) {
        info!("disconnected (clean={was_clean}, code={code:?}, reason={reason})");
    }
}

async fn handle_connection(url: &str) {
    let done = Arc::new(Notify::new());
    let listener = Arc::new(EchoListener {
        received: AtomicUsize::new(0),
        done: done.clone(),
    });
    let session = Session::new(url, ClientConfig::default(), listener);

    if let Err(e) = session.connect().await {
        error!("handshake failed: {e}");
        return;
    }

    let mut ticker = interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = done.notified() => break,
            _ = ticker.tick() => {
                if let Err(e) = session.send_text(generate_random_string(), true).await {
                    error!("failed to send message: {e}");
                    break;
                }
            }
        }
    }

    if let Err(e) = session.disconnect(1000, "done", 5_000).await {
        error!("error occurred when closing connection: {e}");
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    handle_connection("ws://127.0.0.1:9002").await;
}

fn generate_random_string() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
