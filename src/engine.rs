//! Engine.IO v4 session layer (spec.md §4.2), grounded on
//! `original_source/src/eio_client.cpp`'s `eio_client` state machine,
//! rebuilt around a `tokio::select!` loop in place of the original's
//! callback closures.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::error::{CloseReason, Error};
use crate::frame::OpCode;
use crate::watchdog::Watchdog;
use crate::ws::{self, WsReader, WsWriter};

const PING_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnginePacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl EnginePacketType {
    fn from_char(c: u8) -> Option<Self> {
        match c {
            b'0' => Some(Self::Open),
            b'1' => Some(Self::Close),
            b'2' => Some(Self::Ping),
            b'3' => Some(Self::Pong),
            b'4' => Some(Self::Message),
            b'5' => Some(Self::Upgrade),
            b'6' => Some(Self::Noop),
            _ => None,
        }
    }

    fn as_char(self) -> u8 {
        match self {
            Self::Open => b'0',
            Self::Close => b'1',
            Self::Ping => b'2',
            Self::Pong => b'3',
            Self::Message => b'4',
            Self::Upgrade => b'5',
            Self::Noop => b'6',
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenPacket {
    sid: String,
    #[serde(rename = "pingInterval")]
    ping_interval: u64,
    #[serde(rename = "pingTimeout")]
    ping_timeout: u64,
}

/// An event surfaced from the Engine.IO session up to the Socket.IO layer.
#[derive(Debug)]
pub enum EngineEvent {
    /// Raw bytes of a `message` packet, still namespace-prefixed — decoding
    /// into a Socket.IO packet is the caller's job (spec.md §4.3).
    Message(Vec<u8>),
    /// The transport closed, either because the peer sent a `close` packet
    /// or because the ping-timeout watchdog fired.
    Closed(CloseReason),
}

/// A cheaply cloneable handle to a live session's outbound side: the shared
/// writer, nothing else. Lets callers that only need to send (the Socket.IO
/// client's `connect`/`emit` paths) reach the writer without contending with
/// [`EngineSession::next_event`]'s receive loop for a lock over the whole
/// session, mirroring the teacher's `Arc<Mutex<WSWriter>>` split in
/// `split.rs`.
#[derive(Clone)]
pub struct EngineHandle<S> {
    writer: Arc<Mutex<WsWriter<WriteHalf<S>>>>,
}

impl<S> EngineHandle<S>
where
    S: AsyncWrite + Unpin,
{
    /// Send an Engine.IO `message` packet carrying `payload` (already
    /// namespace-prefixed Socket.IO bytes).
    pub async fn send_message(&self, payload: &[u8]) -> Result<(), Error> {
        send_packet(&self.writer, EnginePacketType::Message, payload).await
    }

    pub(crate) fn writer(&self) -> Arc<Mutex<WsWriter<WriteHalf<S>>>> {
        self.writer.clone()
    }
}

/// A live Engine.IO session layered over an upgraded WebSocket.
pub struct EngineSession<S> {
    reader: WsReader<ReadHalf<S>>,
    handle: EngineHandle<S>,
    sid: String,
    ping_interval: Duration,
    ping_timeout: Duration,
    watchdog: Arc<dyn Watchdog>,
    since_last_ping: Duration,
    refresh_watchdog: bool,
    /// Created once per session so `tokio::time::interval`'s immediate first
    /// tick fires at most once for the session's whole lifetime, not once
    /// per [`EngineSession::next_event`] call (spec.md §4.2: ticks must
    /// track real elapsed seconds, not how often events are drained).
    ticker: Interval,
}

impl<S> EngineSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the initial `open` packet off a freshly upgraded stream
    /// (`eio_client::read_initial_packet`), establishing `sid` and the ping
    /// schedule the server expects us to honor.
    pub async fn open(stream: S, config: &ClientConfig) -> Result<Self, Error> {
        let (mut reader, writer) =
            ws::split_with_max_payload_size(stream, config.ws_config.max_frame_size);

        let frame = reader.read_frame().await?;
        if frame.opcode != OpCode::Text {
            return Err(Error::InvalidEngineOpenPacket("expected a text frame".into()));
        }
        let (packet_type, body) = split_packet(&frame.payload)?;
        if packet_type != EnginePacketType::Open {
            return Err(Error::InvalidEngineOpenPacket(
                "expected the open packet to be first".into(),
            ));
        }

        let open: OpenPacket = serde_json::from_slice(body)?;

        // `interval_at` with a first deadline one tick out avoids
        // `tokio::time::interval`'s "first tick fires immediately" behavior,
        // which would otherwise front-load `since_last_ping` by one tick the
        // moment the session opens.
        let mut ticker = interval_at(Instant::now() + PING_TICK, PING_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            reader,
            handle: EngineHandle {
                writer: Arc::new(Mutex::new(writer)),
            },
            sid: open.sid,
            ping_interval: Duration::from_millis(open.ping_interval),
            ping_timeout: Duration::from_millis(open.ping_timeout),
            watchdog: config.watchdog.clone(),
            since_last_ping: Duration::ZERO,
            refresh_watchdog: false,
            ticker,
        })
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// From now on, kick the configured watchdog on every poll tick
    /// regardless of traffic (spec.md §4.2 `set_refresh_watchdog`), rather
    /// than relying on the ping/pong exchange alone to prove liveness.
    pub fn set_refresh_watchdog(&mut self) {
        self.refresh_watchdog = true;
    }

    /// A cloneable, reader-free handle other layers can hold onto to send
    /// messages without contending for the session's own lock.
    pub fn handle(&self) -> EngineHandle<S> {
        self.handle.clone()
    }

    /// A cloneable handle to just the shared writer, for callers that only
    /// need to send (e.g. installing it on a [`crate::namespace::Namespace`]).
    pub fn writer(&self) -> Arc<Mutex<WsWriter<WriteHalf<S>>>> {
        self.handle.writer()
    }

    /// Send an Engine.IO `message` packet carrying `payload` (already
    /// namespace-prefixed Socket.IO bytes).
    pub async fn send_message(&self, payload: &[u8]) -> Result<(), Error> {
        self.handle.send_message(payload).await
    }

    /// Block until the next Engine.IO-level event: an application message,
    /// or the session closing (peer `close` packet or ping-timeout).
    /// Translates `eio_client::ws_recv_callback`/`ws_poll_callback` into a
    /// single `select!` loop (spec.md §4.2 "ping-timeout watchdog").
    pub async fn next_event(&mut self) -> Result<EngineEvent, Error> {
        let deadline = self.ping_interval + self.ping_timeout;

        loop {
            tokio::select! {
                frame = self.reader.read_frame() => {
                    let frame = frame?;
                    if frame.opcode != OpCode::Text && frame.opcode != OpCode::Binary {
                        continue;
                    }
                    let (packet_type, body) = split_packet(&frame.payload)?;
                    match packet_type {
                        EnginePacketType::Ping => {
                            self.since_last_ping = Duration::ZERO;
                            send_packet(&self.handle.writer, EnginePacketType::Pong, &[]).await?;
                        }
                        EnginePacketType::Message => {
                            return Ok(EngineEvent::Message(body.to_vec()));
                        }
                        EnginePacketType::Close => {
                            return Ok(EngineEvent::Closed(CloseReason::Closed));
                        }
                        EnginePacketType::Noop
                        | EnginePacketType::Upgrade
                        | EnginePacketType::Open
                        | EnginePacketType::Pong => continue,
                    }
                }
                _ = self.ticker.tick() => {
                    if self.refresh_watchdog {
                        self.watchdog.kick();
                    }
                    self.since_last_ping += PING_TICK;
                    if self.since_last_ping > deadline {
                        return Ok(EngineEvent::Closed(CloseReason::Timeout));
                    }
                }
            }
        }
    }

    /// Send a WebSocket close frame and an Engine.IO `close` packet,
    /// mirroring `eio_client`'s teardown path.
    pub async fn close(&self) -> Result<(), Error> {
        send_packet(&self.handle.writer, EnginePacketType::Close, &[]).await?;
        let mut writer = self.handle.writer.lock().await;
        writer.close(Vec::new()).await
    }
}

fn split_packet(payload: &[u8]) -> Result<(EnginePacketType, &[u8]), Error> {
    let (&first, rest) = payload
        .split_first()
        .ok_or_else(|| Error::InvalidEngineOpenPacket("empty packet".into()))?;
    let packet_type = EnginePacketType::from_char(first)
        .ok_or_else(|| Error::InvalidEngineOpenPacket(format!("unknown packet type byte {first}")))?;
    Ok((packet_type, rest))
}

async fn send_packet<W>(
    writer: &Arc<Mutex<WsWriter<W>>>,
    packet_type: EnginePacketType,
    body: &[u8],
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = Vec::with_capacity(1 + body.len());
    payload.push(packet_type.as_char());
    payload.extend_from_slice(body);

    let mut writer = writer.lock().await;
    writer.write_frame(crate::frame::Frame::text(payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::io::AsyncWriteExt;

    fn encode_open(sid: &str, ping_interval: u64, ping_timeout: u64) -> Vec<u8> {
        let body = format!(
            r#"{{"sid":"{sid}","upgrades":[],"pingInterval":{ping_interval},"pingTimeout":{ping_timeout}}}"#
        );
        let mut payload = vec![b'0'];
        payload.extend_from_slice(body.as_bytes());
        payload
    }

    async fn write_text_frame<W: AsyncWrite + Unpin>(writer: &mut ws::WsWriter<W>, payload: Vec<u8>) {
        writer
            .write_frame(crate::frame::Frame::text(payload))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn open_parses_sid_and_ping_schedule() {
        let (client, server) = duplex(4096);
        let (_server_read, mut server_write) = ws::split(server);

        let server_task = tokio::spawn(async move {
            write_text_frame(&mut server_write, encode_open("abc123", 25000, 20000)).await;
            server_write
        });

        let config = ClientConfig::default();
        let session = EngineSession::open(client, &config).await.unwrap();
        assert_eq!(session.sid(), "abc123");
        assert_eq!(session.ping_interval, Duration::from_millis(25000));
        assert_eq!(session.ping_timeout, Duration::from_millis(20000));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn ping_packet_triggers_a_pong_reply() {
        let (client, server) = duplex(4096);
        let (mut server_read, mut server_write) = ws::split(server);

        write_text_frame(&mut server_write, encode_open("abc123", 25000, 20000)).await;
        let config = ClientConfig::default();
        let mut session = EngineSession::open(client, &config).await.unwrap();

        // next_event loops internally (a ping doesn't end it), so one call
        // drives both the ping->pong exchange and the eventual close.
        let driver = tokio::spawn(async move { session.next_event().await });

        write_text_frame(&mut server_write, vec![b'2']).await;

        let pong = server_read.read_frame().await.unwrap();
        assert_eq!(pong.payload, vec![b'3']);

        write_text_frame(&mut server_write, vec![b'1']).await;
        let event = driver.await.unwrap().unwrap();
        assert!(matches!(event, EngineEvent::Closed(CloseReason::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn closes_with_timeout_after_ping_interval_plus_timeout_elapses() {
        let (client, server) = duplex(4096);
        let (_server_read, mut server_write) = ws::split(server);
        // pingInterval=25000, pingTimeout=20000 -> closes after > 45 ticks of silence.
        write_text_frame(&mut server_write, encode_open("abc123", 25000, 20000)).await;

        let config = ClientConfig::default();
        let mut session = EngineSession::open(client, &config).await.unwrap();

        let driver = tokio::spawn(async move { session.next_event().await });

        // At exactly 45 ticks (since_last_ping == deadline) the session must
        // still be open: the close condition is a strict `>`.
        tokio::time::sleep(Duration::from_secs(45)).await;
        tokio::task::yield_now().await;
        assert!(!driver.is_finished(), "must not close at exactly the boundary");

        let event = tokio::time::timeout(Duration::from_secs(2), driver)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(event, EngineEvent::Closed(CloseReason::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_watchdog_kicks_on_every_poll_tick() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingWatchdog(AtomicUsize);
        impl Watchdog for CountingWatchdog {
            fn kick(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (client, server) = duplex(4096);
        let (_server_read, mut server_write) = ws::split(server);
        write_text_frame(&mut server_write, encode_open("abc123", 25000, 20000)).await;

        let watchdog = Arc::new(CountingWatchdog(AtomicUsize::new(0)));
        let config = ClientConfig {
            watchdog: watchdog.clone(),
            ..ClientConfig::default()
        };
        let mut session = EngineSession::open(client, &config).await.unwrap();
        session.set_refresh_watchdog();

        let driver = tokio::spawn(async move { session.next_event().await });
        tokio::time::sleep(Duration::from_millis(2200)).await;
        driver.abort();

        assert!(watchdog.0.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn packet_type_roundtrips() {
        assert_eq!(EnginePacketType::from_char(b'0'), Some(EnginePacketType::Open));
        assert_eq!(EnginePacketType::Message.as_char(), b'4');
        assert_eq!(EnginePacketType::from_char(b'9'), None);
    }
}
