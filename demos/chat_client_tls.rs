use pico_sio_client::{ClientConfig, SioClient};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval, Duration};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = ClientConfig {
        tls_config: Some(pico_sio_client::stream::SocketStream::default_tls_config()),
        ..ClientConfig::default()
    };

    let client = Arc::new(SioClient::new(
        "wss://example.com/socket.io/",
        config,
    ));

    let root = client.socket("/").await;
    root.on("connect", |_| {
        println!("connected over TLS");
    })
    .await;

    let emitter = client.clone();
    tokio::spawn(async move {
        let root = emitter.socket("/").await;
        let mut ticker = interval(Duration::from_secs(5));
        loop {
            ticker.tick().await;
            if root.connected().await {
                let _ = root.emit("ping", vec![json!({"from": "pico-sio-client"})]).await;
            }
        }
    });

    if let Err(err) = client.run().await {
        eprintln!("socket.io client exited: {err}");
    }
}
