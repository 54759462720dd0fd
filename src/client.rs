//! The Socket.IO client (spec.md §4.3), grounded on
//! `original_source/src/sio_client.cpp`. The original's callback-driven
//! `http_response_callback`/`engine_recv_callback`/`engine_closed_callback`
//! triad becomes one `run` loop built from `tokio::select!` plus an
//! explicit reconnect state, since there is no single-threaded event loop
//! to hang callbacks off of here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::engine::{EngineEvent, EngineHandle, EngineSession};
use crate::error::{CloseReason, Error};
use crate::namespace::Namespace;
use crate::packet::{self, SioPacketType};
use crate::stream::SocketStream;
use crate::upgrade;

/// How long the client waits after a disconnect before attempting to
/// reconnect (spec.md §4.3 "Reconnect"). The original always schedules the
/// next attempt exactly one second out; this client keeps that fixed
/// backoff rather than growing it, since it targets a fixed small set of
/// known-reachable servers rather than the open internet.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Interval between watchdog kicks while a connection is being established
/// (spec.md §4.3 / §9: "~7.33s alarm fired up to 3 times" —
/// `original_source/src/sio_client.cpp`'s `alarm_callback`, which gives the
/// device about 22-30 seconds to finish connecting before a real hardware
/// watchdog would reset it).
const WATCHDOG_EXTEND_INTERVAL: Duration = Duration::from_micros(7_333_333);
const WATCHDOG_EXTEND_ROUNDS: u32 = 3;

/// Kicks the configured watchdog on a fixed interval for as long as it's
/// alive, so [`SioClient::open`] doesn't let a slow connect/upgrade starve a
/// real hardware watchdog. Dropping it (scope exit, `?` early return, or
/// just reaching the end of `open`) cancels the remaining kicks — the Rust
/// equivalent of the original's explicit `cancel_alarm` call once the
/// engine reports itself open.
struct WatchdogExtender(tokio::task::JoinHandle<()>);

impl WatchdogExtender {
    fn start(watchdog: Arc<dyn crate::watchdog::Watchdog>) -> Self {
        let handle = tokio::spawn(async move {
            for _ in 0..WATCHDOG_EXTEND_ROUNDS {
                sleep(WATCHDOG_EXTEND_INTERVAL).await;
                watchdog.kick();
            }
        });
        WatchdogExtender(handle)
    }
}

impl Drop for WatchdogExtender {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Namespace lookup that also remembers registration order, so reconnect can
/// replay `connect` packets in the order the user first asked for each
/// namespace (spec.md §4.3 "Reconnect" / §8 scenario 6) — a plain `HashMap`
/// would iterate in an arbitrary, run-to-run-varying order.
struct NamespaceRegistry<S> {
    order: Vec<String>,
    by_name: HashMap<String, Arc<Namespace<S>>>,
}

impl<S> NamespaceRegistry<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new() -> Self {
        Self {
            order: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    fn get_or_create(&mut self, ns: &str) -> Arc<Namespace<S>> {
        if let Some(existing) = self.by_name.get(ns) {
            return existing.clone();
        }
        let namespace = Arc::new(Namespace::new(ns));
        self.order.push(ns.to_string());
        self.by_name.insert(ns.to_string(), namespace.clone());
        namespace
    }

    fn get(&self, ns: &str) -> Option<Arc<Namespace<S>>> {
        self.by_name.get(ns).cloned()
    }

    fn remove(&mut self, ns: &str) -> Option<Arc<Namespace<S>>> {
        self.order.retain(|name| name != ns);
        self.by_name.remove(ns)
    }

    /// Iterate in registration order.
    fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Namespace<S>>)> {
        self.order
            .iter()
            .map(move |name| (name.as_str(), &self.by_name[name]))
    }
}

/// A Socket.IO v4 client connecting over a raw WebSocket transport.
pub struct SioClient {
    url: String,
    config: ClientConfig,
    namespaces: Mutex<NamespaceRegistry<SocketStream>>,
    engine: Mutex<Option<EngineHandle<SocketStream>>>,
    on_open: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    refresh_watchdog: AtomicBool,
}

impl SioClient {
    pub fn new(url: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            url: url.into(),
            config,
            namespaces: Mutex::new(NamespaceRegistry::new()),
            engine: Mutex::new(None),
            on_open: Mutex::new(None),
            refresh_watchdog: AtomicBool::new(false),
        }
    }

    /// Register a callback invoked once per successful (re)connect, right
    /// after the Engine.IO `open` packet has been received and every
    /// previously-known namespace has been re-`connect`ed (spec.md §4.3
    /// "on_open"). Replaces any previously registered callback.
    pub async fn on_open(&self, cb: impl Fn() + Send + Sync + 'static) {
        *self.on_open.lock().await = Some(Arc::new(cb));
    }

    /// Forward watchdog-refresh-on-every-tick to the engine session, once
    /// one exists (spec.md §4.3 "set_refresh_watchdog").
    pub fn set_refresh_watchdog(&self) {
        self.refresh_watchdog.store(true, Ordering::SeqCst);
    }

    /// Get or create the namespace handle for `ns` (defaults to `"/"`),
    /// mirroring `sio_client::socket`.
    pub async fn socket(&self, ns: &str) -> Arc<Namespace<SocketStream>> {
        self.namespaces.lock().await.get_or_create(ns)
    }

    /// Register `ns` and, if the engine is already open, connect it
    /// immediately (spec.md §4.3 "connect(ns=\"/\")"). Namespaces requested
    /// before the first [`SioClient::open`]/[`SioClient::run`] are connected
    /// automatically once the engine comes up, so this is mainly for adding
    /// a namespace to an already-running client.
    pub async fn connect(&self, ns: &str) -> Result<(), Error> {
        let namespace = self.socket(ns).await;
        let handle = self.engine.lock().await.clone();
        if let Some(handle) = handle {
            namespace.update_engine(Some(handle.writer())).await;
            handle.send_message(&packet::encode_connect(ns)).await?;
        }
        Ok(())
    }

    /// Dial the transport, perform the WebSocket upgrade and the Engine.IO
    /// handshake, and send a `connect` packet for every namespace already
    /// requested via [`SioClient::socket`] (spec.md §4.3 "Connect").
    pub async fn open(&self) -> Result<(), Error> {
        self.open_session().await?;
        Ok(())
    }

    /// Does the actual dial/upgrade/handshake work of [`SioClient::open`] and
    /// hands the caller back the live, reader-owning session alongside
    /// installing its writer-only [`EngineHandle`] on `self.engine` and every
    /// namespace. Split out of `open` so [`SioClient::run`] can hold the
    /// session locally and drive [`SioClient::run_until_closed`] without ever
    /// locking `self.engine` across the long-lived `next_event` await —
    /// `self.engine` only ever holds the cheaply cloneable handle, which
    /// `connect`/`emit` can grab and release without blocking on it.
    async fn open_session(&self) -> Result<EngineSession<SocketStream>, Error> {
        let _watchdog_extender = WatchdogExtender::start(self.config.watchdog.clone());

        let target = upgrade::resolve_target(&self.url)?;

        let mut query = self.config.query.clone();
        query.insert("EIO".to_string(), "4".to_string());
        query.insert("transport".to_string(), "websocket".to_string());

        let mut stream = if target.use_tls {
            let tls_config = self
                .config
                .tls_config
                .clone()
                .unwrap_or_else(SocketStream::default_tls_config);
            SocketStream::connect_tls(&target.host, target.port, tls_config).await?
        } else {
            SocketStream::connect_plain(&target.host, target.port).await?
        };

        upgrade::upgrade(&mut stream, &target, &query, self.config.upgrade_timeout_ms).await?;

        let mut session = EngineSession::open(stream, &self.config).await?;
        info!("engine.io session open, sid={}", session.sid());
        if self.refresh_watchdog.load(Ordering::SeqCst) {
            session.set_refresh_watchdog();
        }

        let namespaces = self.namespaces.lock().await;
        for (_, namespace) in namespaces.iter() {
            namespace.update_engine(Some(session.writer())).await;
        }
        for (ns, _) in namespaces.iter() {
            session.send_message(&packet::encode_connect(ns)).await?;
        }
        drop(namespaces);

        *self.engine.lock().await = Some(session.handle());

        if let Some(cb) = self.on_open.lock().await.clone() {
            cb();
        }
        Ok(session)
    }

    /// Disconnect a single namespace (spec.md §4.3 "Disconnect"). Sending the
    /// wire-level disconnect packet is best-effort: if the engine is already
    /// gone this still succeeds, matching spec.md §5 ("ignored if the engine
    /// is already gone").
    pub async fn disconnect(&self, ns: &str) -> Result<(), Error> {
        let mut namespaces = self.namespaces.lock().await;
        if let Some(namespace) = namespaces.remove(ns) {
            namespace.dispatch_disconnect("io client disconnect").await;
            let _ = namespace.send_raw_packet(packet::encode_disconnect(ns)).await;
        }
        Ok(())
    }

    /// Run the client forever: open the connection, process events until
    /// the transport closes, then reconnect after [`RECONNECT_DELAY`]
    /// (spec.md §4.3 "Reconnect"), re-sending `connect` for every namespace
    /// that was open before the drop.
    pub async fn run(&self) -> Result<(), Error> {
        loop {
            let mut session = match self.open_session().await {
                Ok(session) => session,
                Err(err) => {
                    warn!("socket.io open failed: {err}");
                    sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            let reason = self.run_until_closed(&mut session).await;
            debug!("socket.io session closed: {:?}", reason);

            let namespaces = self.namespaces.lock().await;
            for (_, namespace) in namespaces.iter() {
                namespace.update_engine(None).await;
                namespace
                    .dispatch_disconnect(reason.as_disconnect_reason())
                    .await;
            }
            drop(namespaces);
            *self.engine.lock().await = None;

            sleep(RECONNECT_DELAY).await;
        }
    }

    /// Process Engine.IO events until the session closes, dispatching
    /// Socket.IO packets into namespace handlers
    /// (`sio_client::engine_recv_callback`). Returns the classified close
    /// reason. Takes the session by reference rather than through
    /// `self.engine`, so the only lock this ever needs (`self.namespaces`,
    /// per message) is never held across the `next_event` await itself.
    async fn run_until_closed(&self, session: &mut EngineSession<SocketStream>) -> CloseReason {
        loop {
            match session.next_event().await {
                Ok(EngineEvent::Message(bytes)) => {
                    if let Err(err) = self.handle_message(&bytes).await {
                        warn!("dropping malformed socket.io packet: {err}");
                    }
                }
                Ok(EngineEvent::Closed(reason)) => return reason,
                Err(err) => return err.as_close_reason(),
            }
        }
    }

    async fn handle_message(&self, bytes: &[u8]) -> Result<(), Error> {
        let parsed = packet::parse(bytes)?;
        let namespace = {
            let namespaces = self.namespaces.lock().await;
            match namespaces.get(&parsed.namespace) {
                Some(ns) => ns.clone(),
                None => return Ok(()),
            }
        };

        match parsed.packet_type {
            SioPacketType::Connect => namespace.dispatch_connect(parsed.payload).await,
            SioPacketType::Disconnect => namespace.dispatch_disconnect("io server disconnect").await,
            SioPacketType::Event => {
                if let Some(serde_json::Value::Array(array)) = parsed.payload {
                    namespace.dispatch_event(array).await;
                }
            }
            SioPacketType::ConnectError
            | SioPacketType::Ack
            | SioPacketType::BinaryEvent
            | SioPacketType::BinaryAck => {
                // Acks and binary variants are recognized on the wire but
                // have no dispatch target in this client (spec.md Non-goals
                // exclude ack-based request/response and binary payloads).
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn socket_returns_the_same_namespace_handle_on_repeat_calls() {
        let client = SioClient::new("ws://example.com/socket.io/", ClientConfig::default());
        let a = client.socket("/chat").await;
        let b = client.socket("/chat").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn connect_before_any_open_just_registers_the_namespace() {
        let client = SioClient::new("ws://example.com/socket.io/", ClientConfig::default());
        client.connect("/chat").await.unwrap();
        let ns = client.socket("/chat").await;
        assert!(!ns.connected().await);
    }

    #[tokio::test]
    async fn emit_before_open_returns_not_connected() {
        let client = SioClient::new("ws://example.com/socket.io/", ClientConfig::default());
        let ns = client.socket("/").await;
        let err = ns.emit("ping", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
