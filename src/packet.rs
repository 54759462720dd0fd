//! Socket.IO v4 packet codec (spec.md §4.3), grounded on
//! `original_source/src/sio_client.cpp`'s `engine_recv_callback` (parsing)
//! and `sio_socket.cpp`'s `emit` (encoding).

use serde_json::Value;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SioPacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SioPacketType {
    fn from_char(c: u8) -> Option<Self> {
        match c {
            b'0' => Some(Self::Connect),
            b'1' => Some(Self::Disconnect),
            b'2' => Some(Self::Event),
            b'3' => Some(Self::Ack),
            b'4' => Some(Self::ConnectError),
            b'5' => Some(Self::BinaryEvent),
            b'6' => Some(Self::BinaryAck),
            _ => None,
        }
    }

    fn as_char(self) -> u8 {
        match self {
            Self::Connect => b'0',
            Self::Disconnect => b'1',
            Self::Event => b'2',
            Self::Ack => b'3',
            Self::ConnectError => b'4',
            Self::BinaryEvent => b'5',
            Self::BinaryAck => b'6',
        }
    }
}

/// A decoded Socket.IO packet: its type, the namespace it targets (defaults
/// to `"/"` when the wire form omits the prefix), and whatever JSON payload
/// followed.
#[derive(Debug)]
pub struct ParsedPacket {
    pub packet_type: SioPacketType,
    pub namespace: String,
    pub payload: Option<Value>,
}

/// Decode one Engine.IO `message` payload into a Socket.IO packet. Follows
/// the original's namespace-sniffing rule exactly: a namespace prefix is
/// only recognized when a `/` appears before a `,` which in turn appears
/// before the JSON body's opening bracket.
pub fn parse(data: &[u8]) -> Result<ParsedPacket, Error> {
    let text = std::str::from_utf8(data).map_err(|_| Error::InvalidSioPacket)?;
    let (&first_byte, _) = data.split_first().ok_or(Error::InvalidSioPacket)?;
    let packet_type = SioPacketType::from_char(first_byte).ok_or(Error::InvalidSioPacket)?;

    let namespace = sniff_namespace(text);

    let payload = match packet_type {
        SioPacketType::Connect => find_bracketed(text, '{', '}'),
        SioPacketType::Event | SioPacketType::BinaryEvent => find_bracketed(text, '[', ']'),
        SioPacketType::Disconnect | SioPacketType::Ack | SioPacketType::ConnectError | SioPacketType::BinaryAck => {
            find_bracketed(text, '{', '}').or_else(|| find_bracketed(text, '[', ']'))
        }
    };

    let payload = payload
        .map(|raw| serde_json::from_str(raw))
        .transpose()?;

    Ok(ParsedPacket { packet_type, namespace, payload })
}

fn sniff_namespace(text: &str) -> String {
    if text.len() <= 1 {
        return "/".to_string();
    }
    let comma = text.find(',');
    let slash = text.find('/');
    let bracket = text.find('[');

    if let (Some(comma), Some(slash)) = (comma, slash) {
        let before_bracket = bracket.map(|b| comma < b).unwrap_or(true);
        if before_bracket && slash < comma {
            return format!("/{}", &text[slash + 1..comma]);
        }
    }
    "/".to_string()
}

fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == "/" {
        String::new()
    } else {
        format!("{namespace},")
    }
}

/// Encode a `connect` packet for `namespace` (spec.md §4.3 "Connect").
pub fn encode_connect(namespace: &str) -> Vec<u8> {
    let mut out = vec![SioPacketType::Connect.as_char()];
    out.extend(namespace_prefix(namespace).into_bytes());
    out
}

/// Encode a `disconnect` packet for `namespace`.
pub fn encode_disconnect(namespace: &str) -> Vec<u8> {
    let mut out = vec![SioPacketType::Disconnect.as_char()];
    out.extend(namespace_prefix(namespace).into_bytes());
    out
}

/// Encode an `event` packet: `event_name` prepended to `args` as a JSON
/// array, namespace-prefixed.
pub fn encode_event(namespace: &str, event_name: &str, args: Vec<Value>) -> Result<Vec<u8>, Error> {
    let mut array = Vec::with_capacity(args.len() + 1);
    array.push(Value::String(event_name.to_string()));
    array.extend(args);

    let mut out = vec![SioPacketType::Event.as_char()];
    out.extend(namespace_prefix(namespace).into_bytes());
    out.extend(serde_json::to_vec(&Value::Array(array))?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_default_namespace_connect() {
        let packet = parse(b"0").unwrap();
        assert_eq!(packet.packet_type, SioPacketType::Connect);
        assert_eq!(packet.namespace, "/");
        assert!(packet.payload.is_none());
    }

    #[test]
    fn parses_connect_with_sid_payload() {
        let packet = parse(br#"0{"sid":"abc123"}"#).unwrap();
        assert_eq!(packet.packet_type, SioPacketType::Connect);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.payload.unwrap()["sid"], "abc123");
    }

    #[test]
    fn parses_non_default_namespace_event() {
        let packet = parse(br#"2/chat,["message","hi"]"#).unwrap();
        assert_eq!(packet.packet_type, SioPacketType::Event);
        assert_eq!(packet.namespace, "/chat");
        let payload = packet.payload.unwrap();
        assert_eq!(payload[0], "message");
        assert_eq!(payload[1], "hi");
    }

    #[test]
    fn encode_event_prepends_event_name() {
        let bytes = encode_event("/", "message", vec![json!("hi")]).unwrap();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.packet_type, SioPacketType::Event);
        assert_eq!(parsed.namespace, "/");
        let payload = parsed.payload.unwrap();
        assert_eq!(payload[0], "message");
        assert_eq!(payload[1], "hi");
    }

    #[test]
    fn encode_event_prefixes_non_default_namespace() {
        let bytes = encode_event("/chat", "message", vec![json!("hi")]).unwrap();
        assert!(bytes.starts_with(b"2/chat,"));
    }

    #[test]
    fn encode_disconnect_round_trips() {
        let bytes = encode_disconnect("/chat");
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.packet_type, SioPacketType::Disconnect);
        assert_eq!(parsed.namespace, "/chat");
    }
}
