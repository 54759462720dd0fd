//! Client configuration (spec.md §4.3/§5), grounded in the teacher's
//! `ClientConfig`/`WebSocketConfig` split.

use std::collections::HashMap;
use std::sync::Arc;

use rustls::ClientConfig as RustlsClientConfig;

use crate::watchdog::{NullWatchdog, Watchdog};

/// Frame-level limits enforced by the WebSocket codec. There's no
/// `max_message_size` alongside this: spec.md's Non-goals exclude
/// fragmented/continuation frames, so a message is always exactly one frame
/// and `max_frame_size` already bounds it.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig { max_frame_size: 16 << 20 }
    }
}

/// Everything needed to open and maintain a Socket.IO session.
#[derive(Clone)]
pub struct ClientConfig {
    pub ws_config: WebSocketConfig,
    /// TLS config used for `wss://`/`https://` URLs. `None` means "build the
    /// default Mozilla-root trust store on first connect" (spec.md §5).
    pub tls_config: Option<Arc<RustlsClientConfig>>,
    /// Extra query-string parameters appended to the Engine.IO handshake
    /// URL, alongside the mandatory `EIO=4&transport=websocket`.
    pub query: HashMap<String, String>,
    /// Upper bound on the HTTP/1.1 upgrade exchange, in milliseconds.
    /// `None` disables the timeout.
    pub upgrade_timeout_ms: Option<u64>,
    /// Fed whenever the connection is proven alive. Defaults to
    /// [`NullWatchdog`] for callers with no hardware watchdog to kick.
    pub watchdog: Arc<dyn Watchdog>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            ws_config: WebSocketConfig::default(),
            tls_config: None,
            query: HashMap::new(),
            upgrade_timeout_ms: Some(10_000),
            watchdog: Arc::new(NullWatchdog),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("ws_config", &self.ws_config)
            .field("tls_config", &self.tls_config.is_some())
            .field("query", &self.query)
            .field("upgrade_timeout_ms", &self.upgrade_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_upgrade_timeout_shorter_than_ping_timeout() {
        let config = ClientConfig::default();
        assert!(config.upgrade_timeout_ms.unwrap() > 0);
        assert!(config.tls_config.is_none());
        assert!(config.query.is_empty());
    }
}
