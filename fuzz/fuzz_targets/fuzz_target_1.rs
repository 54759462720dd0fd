#![no_main]

use libfuzzer_sys::fuzz_target;
use pico_sio_client::packet;
use pico_sio_client::ws::WsReader;
use tokio::io::{duplex, AsyncWriteExt};
use tokio::runtime::Runtime;

// This client only ever parses bytes a server sent it; a malicious or
// corrupt server is the realistic attack surface, not a client it accepts
// connections from. So the two things worth fuzzing are: the WebSocket
// frame reader fed arbitrary wire bytes, and the Socket.IO packet decoder
// fed arbitrary Engine.IO message bodies. Neither should ever panic.
fuzz_target!(|data: &[u8]| {
    let _ = packet::parse(data);

    let runtime = Runtime::new().unwrap();
    let data = data.to_vec();
    runtime.block_on(async move {
        let (mut client_side, server_side) = duplex(data.len() + 16);
        let mut reader = WsReader::new(server_side);

        let _ = client_side.write_all(&data).await;
        drop(client_side);

        let _ = reader.read_frame().await;
    });
});
