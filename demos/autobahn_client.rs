use log::{error, info};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use wsconn::config::{ClientConfig, WebSocketConfig};
use wsconn::error::Error;
use wsconn::extensions::Extensions;
use wsconn::listener::{NoopListener, WebSocketListener};
use wsconn::session::Session;

const AGENT: &str = "wsconn";

fn deflate_config() -> ClientConfig {
    let web_socket_config = WebSocketConfig {
        extensions: Some(Extensions {
            permessage_deflate: true,
            client_no_context_takeover: Some(true),
            server_no_context_takeover: Some(true),
            client_max_window_bits: None,
            server_max_window_bits: None,
        }),
        ..WebSocketConfig::default()
    };
    ClientConfig {
        web_socket_config,
        ..ClientConfig::default()
    }
}

/// Echoes every received message straight back to the test suite, calling
/// back into the session from inside the listener callback.
struct EchoBack {
    session: Mutex<Option<Arc<Session>>>,
    done: Arc<Notify>,
}

impl EchoBack {
    fn new(done: Arc<Notify>) -> Self {
        EchoBack {
            session: Mutex::new(None),
            done,
        }
    }

    fn bind(&self, session: Arc<Session>) {
        *self.session.lock().unwrap() = Some(session);
    }

    fn session(&self) -> Arc<Session> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .expect("listener used before session was bound")
    }
}

impl WebSocketListener for EchoBack {
    fn on_text_message(&self, text: &str) {
        let session = self.session();
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = session.send_text(text, true).await {
                error!("failed to echo text frame: {e}");
            }
        });
    }

    fn on_binary_message(&self, data: &[u8]) {
        let session = self.session();
        let data = data.to_vec();
        tokio::spawn(async move {
            if let Err(e) = session.send_binary(data, true).await {
                error!("failed to echo binary frame: {e}");
            }
        });
    }

    fn on_disconnected(&self, _was_clean: bool, _code: Option<u16>, _reason: &str) {
        self.done.notify_one();
    }
}

/// Captures the single text message a control endpoint sends (case count).
struct CaptureOne {
    message: Mutex<Option<String>>,
    done: Arc<Notify>,
}

impl WebSocketListener for CaptureOne {
    fn on_text_message(&self, text: &str) {
        *self.message.lock().unwrap() = Some(text.to_string());
        self.done.notify_one();
    }

    fn on_disconnected(&self, _was_clean: bool, _code: Option<u16>, _reason: &str) {
        self.done.notify_one();
    }
}

async fn run_test(case: u32) -> Result<(), Error> {
    info!("running test case {case}");

    let done = Arc::new(Notify::new());
    let listener = Arc::new(EchoBack::new(done.clone()));
    let session = Arc::new(Session::new(
        format!("ws://127.0.0.1:9001/runCase?case={case}&agent={AGENT}"),
        deflate_config(),
        listener.clone(),
    ));
    listener.bind(session.clone());

    session.connect().await?;
    done.notified().await;
    Ok(())
}

async fn update_reports() -> Result<(), Error> {
    info!("updating reports");
    let session = Session::new(
        format!("ws://127.0.0.1:9001/updateReports?agent={AGENT}"),
        deflate_config(),
        Arc::new(NoopListener),
    );
    session.connect().await?;
    session.disconnect(1000, "", 5_000).await
}

async fn get_case_count() -> u32 {
    let done = Arc::new(Notify::new());
    let listener = Arc::new(CaptureOne {
        message: Mutex::new(None),
        done: done.clone(),
    });
    let session = Session::new("ws://127.0.0.1:9001/getCaseCount", deflate_config(), listener.clone());

    session.connect().await.expect("failed to reach the autobahn server");
    done.notified().await;
    session
        .disconnect(1000, "", 5_000)
        .await
        .expect("error closing the getCaseCount connection");

    listener
        .message
        .lock()
        .unwrap()
        .clone()
        .expect("server closed without sending the case count")
        .parse()
        .expect("couldn't convert test case count to a number")
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let total = get_case_count().await;

    for case in 1..=total {
        if let Err(e) = run_test(case).await {
            error!("testcase {case} failed: {e}");
        }
    }

    update_reports().await.expect("error updating reports");
}
