use pico_sio_client::{ClientConfig, SioClient};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    let url = "ws://127.0.0.1:3000/socket.io/";
    let connection_count = 100; // Number of Socket.IO clients
    let message_count = 1000; // Echoed messages per client

    let (tx, mut rx) = mpsc::unbounded_channel();

    for _ in 0..connection_count {
        let tx = tx.clone();
        tokio::spawn(async move {
            let client = Arc::new(SioClient::new(url, ClientConfig::default()));
            let ns = client.socket("/").await;

            let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<()>();
            ns.on("echo", move |_body| {
                let _ = ack_tx.send(());
            })
            .await;

            let runner = client.clone();
            tokio::spawn(async move {
                let _ = runner.run().await;
            });

            while !ns.connected().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let start = Instant::now();
            for _ in 0..message_count {
                if ns.emit("echo", vec![json!("ping")]).await.is_err() {
                    break;
                }
                if ack_rx.recv().await.is_none() {
                    break;
                }
            }

            let _ = tx.send(start.elapsed());
        });
    }

    drop(tx); // Close the channel

    let mut total_duration = Duration::new(0, 0);
    let mut completed = 0u32;
    while let Some(duration) = rx.recv().await {
        total_duration += duration;
        completed += 1;
    }

    if completed > 0 {
        let avg_latency = total_duration / (completed * message_count as u32);
        println!("Average round-trip latency: {:?}", avg_latency);
    } else {
        println!("No client completed a full run");
    }
}
