//! The abstract byte transport (spec.md §1/§6.1, "Transport"). DNS
//! resolution and the TCP/TLS handshake itself stay thin wrappers around the
//! tokio runtime and `rustls` — this module exists only to let the rest of
//! the stack talk to a plain or TLS socket through one type.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pki_types::ServerName;
use rustls::ClientConfig as RustlsClientConfig;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::error::Error;

/// Either half of a raw TCP connection or one wrapped in TLS. Everything
/// above this module (the WebSocket codec) is generic over
/// `AsyncRead + AsyncWrite + Unpin + Send` and never needs to know which.
pub enum SocketStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl SocketStream {
    /// Open a plain TCP connection to `host:port`. DNS resolution is
    /// delegated entirely to the tokio runtime's resolver.
    pub async fn connect_plain(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        Ok(SocketStream::Plain(stream))
    }

    /// Open a TCP connection and perform the TLS handshake against it.
    /// `tls_config` is supplied by the caller (spec.md §5: "the TLS
    /// configuration is a process-wide singleton initialized on first use
    /// with the optional certificate bundle" — modeled here as an `Arc`
    /// handed in by the caller rather than a real global, so tests can use
    /// independent configs).
    pub async fn connect_tls(
        host: &str,
        port: u16,
        tls_config: Arc<RustlsClientConfig>,
    ) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        let connector = TlsConnector::from(tls_config);
        let server_name = ServerName::try_from(host.to_string())?;
        let tls_stream = connector.connect(server_name, stream).await?;
        Ok(SocketStream::Tls(Box::new(tls_stream)))
    }

    /// Build a default client TLS config trusting the Mozilla root store
    /// bundled via `webpki-roots`, the way most of this crate's users will
    /// want it for talking to a public Socket.IO server.
    pub fn default_tls_config() -> Arc<RustlsClientConfig> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
            RustlsClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    }

    /// Build a client TLS config trusting only the CA certificates in
    /// `pem_bundle` (spec.md §5: "the TLS configuration is a process-wide
    /// singleton initialized on first use with the optional certificate
    /// bundle"), for servers behind a private or self-signed CA that the
    /// Mozilla root store in [`default_tls_config`] wouldn't trust.
    pub fn tls_config_from_ca_bundle(pem_bundle: &[u8]) -> Result<Arc<RustlsClientConfig>, Error> {
        let mut reader = io::BufReader::new(pem_bundle);
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut reader) {
            roots.add(cert?)?;
        }
        Ok(Arc::new(
            RustlsClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        ))
    }
}

impl AsyncRead for SocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SocketStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SocketStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tls_config_builds_without_error() {
        let _config = SocketStream::default_tls_config();
    }

    #[test]
    fn ca_bundle_with_no_pem_markers_builds_an_empty_but_valid_config() {
        // rustls_pemfile silently skips content with no "-----BEGIN"
        // markers rather than erroring, so this yields a config trusting
        // nothing rather than a parse failure.
        let config = SocketStream::tls_config_from_ca_bundle(b"not a certificate").unwrap();
        assert!(config.alpn_protocols.is_empty());
    }
}
