use pico_sio_client::{ClientConfig, SioClient};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval, Duration};

#[tokio::main]
async fn main() {
    env_logger::init();

    let client = Arc::new(SioClient::new(
        "ws://127.0.0.1:3000/socket.io/",
        ClientConfig::default(),
    ));

    let chat = client.socket("/chat").await;
    chat.on("message", |body| {
        println!("received message: {body}");
    })
    .await;
    chat.on("connect", |_| {
        println!("chat namespace connected");
    })
    .await;
    chat.on("disconnect", |reason| {
        println!("chat namespace disconnected: {reason}");
    })
    .await;

    let emitter = client.clone();
    tokio::spawn(async move {
        let chat = emitter.socket("/chat").await;
        let mut ticker = interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            if chat.connected().await {
                let _ = chat.emit("message", vec![json!("hello from pico-sio-client")]).await;
            }
        }
    });

    if let Err(err) = client.run().await {
        eprintln!("socket.io client exited: {err}");
    }
}
