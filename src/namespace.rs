//! A single Socket.IO namespace connection (spec.md §4.3), grounded on
//! `original_source/src/sio_socket.cpp`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::packet;

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};

type EventHandler = Box<dyn Fn(&Value) + Send + Sync>;

/// One Socket.IO namespace. Event handlers registered with [`Namespace::on`]
/// fire from the client's event loop whenever a matching `event` packet
/// arrives for this namespace.
pub struct Namespace<S> {
    name: String,
    sid: Mutex<Option<String>>,
    handlers: Mutex<HashMap<String, EventHandler>>,
    once_handlers: Mutex<HashMap<String, EventHandler>>,
    engine: Mutex<Option<Arc<Mutex<crate::ws::WsWriter<WriteHalf<S>>>>>>,
}

impl<S> Namespace<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sid: Mutex::new(None),
            handlers: Mutex::new(HashMap::new()),
            once_handlers: Mutex::new(HashMap::new()),
            engine: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a persistent handler for `event`. Replaces any existing
    /// handler for the same event name, matching the original's
    /// single-handler-per-event map.
    pub async fn on(&self, event: impl Into<String>, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.handlers.lock().await.insert(event.into(), Box::new(handler));
    }

    /// Register a handler that fires at most once, then is removed.
    pub async fn once(&self, event: impl Into<String>, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.once_handlers.lock().await.insert(event.into(), Box::new(handler));
    }

    pub async fn connected(&self) -> bool {
        self.sid.lock().await.is_some()
    }

    pub(crate) async fn update_engine(
        &self,
        writer: Option<Arc<Mutex<crate::ws::WsWriter<WriteHalf<S>>>>>,
    ) {
        *self.engine.lock().await = writer;
    }

    /// Emit an event to the peer, namespace-prefixed (spec.md §4.3 "Emit").
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), Error> {
        let payload = packet::encode_event(&self.name, event, args)?;
        self.send_raw_packet(payload).await
    }

    /// Send a raw Socket.IO packet (already namespace-prefixed) wrapped in
    /// an Engine.IO `message` packet.
    pub(crate) async fn send_raw_packet(&self, payload: Vec<u8>) -> Result<(), Error> {
        let writer = self.engine.lock().await.clone().ok_or(Error::NotConnected)?;
        let mut writer = writer.lock().await;
        writer
            .write_frame(crate::frame::Frame::text(prefix_engine_message(payload)))
            .await
    }

    pub(crate) async fn set_sid(&self, sid: Option<String>) {
        *self.sid.lock().await = sid;
    }

    pub(crate) async fn dispatch_connect(&self, body: Option<Value>) {
        if let Some(Value::Object(obj)) = &body {
            if let Some(Value::String(sid)) = obj.get("sid") {
                self.set_sid(Some(sid.clone())).await;
            }
        }
        self.fire("connect", &body.unwrap_or(Value::Array(vec![]))).await;
    }

    pub(crate) async fn dispatch_disconnect(&self, reason: &str) {
        self.set_sid(None).await;
        self.fire("disconnect", &Value::Array(vec![Value::String(reason.to_string())]))
            .await;
    }

    pub(crate) async fn dispatch_event(&self, mut array: Vec<Value>) {
        if array.is_empty() {
            return;
        }
        let event = match array.remove(0) {
            Value::String(s) => s,
            other => other.to_string(),
        };
        self.fire(&event, &Value::Array(array)).await;
    }

    async fn fire(&self, event: &str, body: &Value) {
        if let Some(handler) = self.once_handlers.lock().await.remove(event) {
            handler(body);
            return;
        }
        if let Some(handler) = self.handlers.lock().await.get(event) {
            handler(body);
        }
    }
}

/// Engine.IO wraps a Socket.IO packet in a `message` packet, i.e. prefixes
/// it with `'4'` (spec.md §4.2/§4.3 layering).
fn prefix_engine_message(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(b'4');
    out.extend(payload);
    out
}
