use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use wsconn::config::ClientConfig;
use wsconn::listener::WebSocketListener;
use wsconn::session::Session;

struct CountingListener {
    received: AtomicUsize,
    target: usize,
    done: Arc<Notify>,
}

impl WebSocketListener for CountingListener {
    fn on_binary_message(&self, _data: &[u8]) {
        if self.received.fetch_add(1, Ordering::SeqCst) + 1 >= self.target {
            self.done.notify_one();
        }
    }
}

#[tokio::main]
async fn main() {
    let url = "ws://127.0.0.1:9002";
    let connection_count = 100; // Number of WebSocket clients
    let message_count = 1000; // Messages per client
    let message_size = 16384; // Size of each message in bytes

    let (tx, mut rx) = mpsc::unbounded_channel();

    for _ in 0..connection_count {
        let tx = tx.clone();
        tokio::spawn(async move {
            let done = Arc::new(Notify::new());
            let listener = Arc::new(CountingListener {
                received: AtomicUsize::new(0),
                target: message_count,
                done: done.clone(),
            });
            let session = Session::new(url, ClientConfig::default(), listener);
            session.connect().await.unwrap();

            let payload = vec![b'a'; message_size];
            let start = Instant::now();

            for _ in 0..message_count {
                session.send_binary(payload.clone(), true).await.unwrap();
            }
            done.notified().await;
            let duration = start.elapsed();

            session.disconnect(1000, "", 5_000).await.unwrap();
            tx.send(duration).unwrap();
        });
    }

    drop(tx); // Close the channel

    let mut total_duration = Duration::new(0, 0);
    let mut completed: u32 = 0;
    while let Some(duration) = rx.recv().await {
        total_duration += duration;
        completed += 1;
    }

    let avg_latency = total_duration / (completed * message_count as u32);
    println!("Average Latency: {:?}", avg_latency);
}
