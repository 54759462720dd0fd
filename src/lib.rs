//! A Socket.IO v4 client over Engine.IO v4 over a raw WebSocket (RFC 6455),
//! built for constrained networked devices.
//!
//! The stack is layered exactly as the wire protocols are: an HTTP/1.1
//! upgrade handshake establishes the WebSocket ([`upgrade`]), the WebSocket
//! carries framed bytes ([`ws`]/[`frame`]), Engine.IO multiplexes a ping
//! heartbeat over that ([`engine`]), and Socket.IO multiplexes namespaces
//! and events over Engine.IO ([`packet`]/[`namespace`]/[`client`]). None of
//! it spawns OS threads; callers drive [`client::SioClient::run`] from
//! their own async runtime.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod namespace;
pub mod packet;
pub mod stream;
pub mod upgrade;
pub mod watchdog;
pub mod ws;

pub use client::SioClient;
pub use config::{ClientConfig, WebSocketConfig};
pub use error::{CloseReason, Error};
pub use namespace::Namespace;
pub use watchdog::{NullWatchdog, Watchdog};
