use pki_types::InvalidDnsNameError;
use std::io;
use thiserror::Error;
use tokio::time::error::Elapsed;
use url::ParseError;

/// The failure-code taxonomy surfaced to users (spec.md §6/§7). A runtime
/// that already has its own native error type maps onto this instead of the
/// other way around; this client maps every internal failure onto one of
/// these before it reaches a `disconnect` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a WebSocket close frame, or the Engine.IO session received
    /// a `close` packet.
    Closed,
    /// The Engine.IO ping-timeout watchdog fired.
    Timeout,
    Reset,
    Refused,
    InProgress,
    Invalid,
    NoMemory,
    /// Catch-all transport error.
    Other,
}

impl CloseReason {
    /// The SIO `disconnect` reason array element for this closure, per
    /// spec.md §4.3's reconnect rule.
    pub fn as_disconnect_reason(&self) -> &'static str {
        match self {
            CloseReason::Closed => "transport close",
            CloseReason::Timeout => "ping timeout",
            _ => "transport error",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{source}")]
    Timeout {
        #[from]
        source: Elapsed,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    // HTTP upgrade errors (spec.md §4.4 / §7)
    #[error("server did not respond with 101 Switching Protocols (got {0})")]
    UpgradeRejected(u16),

    #[error("HTTP upgrade timed out")]
    UpgradeTimeout,

    #[error("malformed HTTP response during upgrade")]
    MalformedHttpResponse,

    #[error("{source}")]
    HttpParse {
        #[from]
        source: httparse::Error,
    },

    // WebSocket framing errors (spec.md §4.1)
    #[error("reserved bits must be zero")]
    RsvNotZero,

    #[error("control frames must not be fragmented")]
    ControlFramesFragmented,

    #[error("control frame payload may not exceed 125 bytes")]
    ControlFramePayloadSize,

    #[error("payload size exceeds the configured maximum")]
    PayloadTooLarge,

    #[error("server-sent frame must not be masked")]
    UnexpectedMask,

    #[error("multi-frame continuation is not supported")]
    ContinuationUnsupported,

    #[error("invalid opcode")]
    InvalidOpcode,

    // Engine.IO errors (spec.md §4.2)
    #[error("malformed Engine.IO open packet: {0}")]
    InvalidEngineOpenPacket(String),

    // Socket.IO errors (spec.md §4.3)
    #[error("malformed Socket.IO packet")]
    InvalidSioPacket,

    #[error("Socket.IO client is not connected")]
    NotConnected,

    // URL errors
    #[error("{source}")]
    UrlParse {
        #[from]
        source: ParseError,
    },

    #[error("unsupported scheme in URL, expected ws/wss/http/https")]
    InvalidSchemeUrl,

    #[error("URL has no host")]
    UrlNoHost,

    #[error("{source}")]
    DomainError {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("{source}")]
    Tls {
        #[from]
        source: rustls::Error,
    },
}

impl Error {
    /// Classify this error for the reconnect-reason dispatch of spec.md
    /// §4.3. Errors that already carry their own close semantics (timeout,
    /// IO EOF/reset) map onto the matching `CloseReason`; everything else is
    /// `Other` ("transport error").
    pub fn as_close_reason(&self) -> CloseReason {
        match self {
            Error::Timeout { .. } | Error::UpgradeTimeout => CloseReason::Timeout,
            Error::Io { source } => match source.kind() {
                io::ErrorKind::ConnectionReset => CloseReason::Reset,
                io::ErrorKind::ConnectionRefused => CloseReason::Refused,
                io::ErrorKind::TimedOut => CloseReason::Timeout,
                _ => CloseReason::Other,
            },
            _ => CloseReason::Other,
        }
    }
}
