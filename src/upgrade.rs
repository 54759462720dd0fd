//! The one-shot HTTP/1.1 upgrade handshake (spec.md §4.4/§6). Builds the
//! exact GET request the spec calls for, sends it over an already-connected
//! transport, and parses the response line/headers with `httparse`. A
//! connection that isn't upgraded to `101 Switching Protocols` is reported
//! back to the caller verbatim (spec.md §7: `UpgradeRejected(status)`).

use base64::prelude::*;
use rand::Rng;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use url::Url;

use crate::error::Error;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_RESPONSE_HEADER_BYTES: usize = 8 * 1024;

/// Connection parameters extracted from a `ws://`/`wss://`/`http://`/`https://`
/// URL, enough to open a TCP socket and build the GET request.
pub struct Target {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub use_tls: bool,
}

/// Parse `url` into everything needed to dial the transport and send the
/// upgrade request (spec.md §4.4 "Resolve"), mirroring the teacher's
/// `construct_http_request` URL handling but for a client connecting out
/// rather than a server formatting its own accept response.
pub fn resolve_target(url: &str) -> Result<Target, Error> {
    let parsed = Url::parse(url)?;

    let default_port = match parsed.scheme() {
        "ws" | "http" => 80,
        "wss" | "https" => 443,
        _ => return Err(Error::InvalidSchemeUrl),
    };
    let use_tls = matches!(parsed.scheme(), "wss" | "https");

    let host = parsed.host_str().ok_or(Error::UrlNoHost)?.to_string();
    let port = parsed.port().unwrap_or(default_port);

    let path = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    Ok(Target { host, port, path, use_tls })
}

/// Generate a fresh, random `Sec-WebSocket-Key` nonce (RFC 6455 §4.1: 16
/// random bytes, base64-encoded).
pub fn generate_websocket_key() -> String {
    let mut rng = rand::thread_rng();
    let nonce: [u8; 16] = rng.gen();
    BASE64_STANDARD.encode(nonce)
}

fn expected_accept_value(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Perform the client-side upgrade handshake over an already-connected
/// stream: send the GET request, then read and validate the response.
/// `timeout_ms` bounds the whole exchange (spec.md §5: "HTTP upgrade:
/// optional millisecond timeout; expiry closes the transport with TIMEOUT").
pub async fn upgrade<S>(
    stream: &mut S,
    target: &Target,
    extra_query: &HashMap<String, String>,
    timeout_ms: Option<u64>,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_websocket_key();
    let request = build_request(target, &key, extra_query);

    let body = async {
        stream.write_all(request.as_bytes()).await?;
        let response = read_response_headers(stream).await?;
        validate_response(&response, &key)
    };

    match timeout_ms {
        Some(ms) => timeout(Duration::from_millis(ms), body)
            .await
            .map_err(|_| Error::UpgradeTimeout)?,
        None => body.await,
    }
}

fn build_request(target: &Target, key: &str, extra_query: &HashMap<String, String>) -> String {
    let path = if extra_query.is_empty() {
        target.path.clone()
    } else {
        let separator = if target.path.contains('?') { '&' } else { '?' };
        let query = extra_query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}{}{}", target.path, separator, query)
    };

    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         User-Agent: pico\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        path = path,
        host = target.host,
        key = key,
    )
}

async fn read_response_headers<S>(stream: &mut S) -> Result<Vec<u8>, Error>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];

    loop {
        if buf.len() > MAX_RESPONSE_HEADER_BYTES {
            return Err(Error::MalformedHttpResponse);
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::MalformedHttpResponse);
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") {
            return Ok(buf);
        }
    }
}

fn validate_response(raw: &[u8], key: &str) -> Result<(), Error> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    response.parse(raw)?;

    let status = response.code.ok_or(Error::MalformedHttpResponse)?;
    if status != 101 {
        return Err(Error::UpgradeRejected(status));
    }

    let accept = response
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("Sec-WebSocket-Accept"))
        .map(|h| String::from_utf8_lossy(h.value).to_string())
        .ok_or(Error::MalformedHttpResponse)?;

    if accept != expected_accept_value(key) {
        return Err(Error::MalformedHttpResponse);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn resolve_target_defaults_port_by_scheme() {
        let t = resolve_target("ws://example.com/socket.io/").unwrap();
        assert_eq!(t.port, 80);
        assert!(!t.use_tls);
        assert_eq!(t.path, "/socket.io/");

        let t = resolve_target("wss://example.com:9000/socket.io/").unwrap();
        assert_eq!(t.port, 9000);
        assert!(t.use_tls);
    }

    #[test]
    fn build_request_matches_the_bit_exact_wire_format() {
        let target = Target {
            host: "example.com".into(),
            port: 80,
            path: "/socket.io/?EIO=4&transport=websocket".into(),
            use_tls: false,
        };
        let request = build_request(&target, "dGhlIHNhbXBsZSBub25jZQ==", &HashMap::new());
        assert_eq!(
            request,
            "GET /socket.io/?EIO=4&transport=websocket HTTP/1.1\r\n\
             Host: example.com\r\n\
             User-Agent: pico\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        );
    }

    #[test]
    fn resolve_target_rejects_unknown_scheme() {
        assert!(matches!(
            resolve_target("ftp://example.com/"),
            Err(Error::InvalidSchemeUrl)
        ));
    }

    #[test]
    fn accept_value_matches_rfc6455_worked_example() {
        // The canonical example from RFC 6455 §1.3.
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        assert_eq!(
            expected_accept_value(key),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[tokio::test]
    async fn upgrade_succeeds_against_a_valid_101_response() {
        let (mut client, mut server) = duplex(4096);
        let target = Target {
            host: "example.com".into(),
            port: 80,
            path: "/socket.io/".into(),
            use_tls: false,
        };

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let n = server.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let key_line = request
                .lines()
                .find(|l| l.starts_with("Sec-WebSocket-Key:"))
                .unwrap();
            let key = key_line.split(':').nth(1).unwrap().trim();
            let accept = expected_accept_value(key);
            let response = format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Connection: Upgrade\r\n\
                 Upgrade: websocket\r\n\
                 Sec-WebSocket-Accept: {accept}\r\n\
                 \r\n"
            );
            server.write_all(response.as_bytes()).await.unwrap();
        });

        upgrade(&mut client, &target, &HashMap::new(), Some(1000))
            .await
            .unwrap();
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn upgrade_surfaces_non_101_status() {
        let (mut client, mut server) = duplex(4096);
        let target = Target {
            host: "example.com".into(),
            port: 80,
            path: "/socket.io/".into(),
            use_tls: false,
        };

        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            let _ = server.read(&mut buf).await.unwrap();
            server
                .write_all(b"HTTP/1.1 404 Not Found\r\n\r\n")
                .await
                .unwrap();
        });

        let err = upgrade(&mut client, &target, &HashMap::new(), Some(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpgradeRejected(404)));
        server_task.await.unwrap();
    }
}
