//! RFC 6455 client framing (spec.md §4.1). Client frames are always masked;
//! server frames are rejected if they carry a mask bit. This codec never
//! reassembles continuation frames — the upper (Engine.IO) layer is built
//! entirely on single-frame text messages, so any continuation frame from a
//! server is a protocol violation for this client (Non-goal).

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;
use crate::frame::{Frame, OpCode, MAX_PAYLOAD_SIZE};

/// Reads and decodes inbound WebSocket frames.
pub struct WsReader<R> {
    buf_reader: BufReader<R>,
    max_payload_size: usize,
}

impl<R: AsyncRead + Unpin> WsReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_payload_size(inner, MAX_PAYLOAD_SIZE)
    }

    /// Same as [`WsReader::new`], but rejecting any frame whose payload
    /// exceeds `max_payload_size` instead of the crate-wide default
    /// (spec.md §4.1 "implementations should still reject values that would
    /// exceed available memory"; `config::WebSocketConfig::max_frame_size`
    /// is the caller-facing knob for this).
    pub fn with_max_payload_size(inner: R, max_payload_size: usize) -> Self {
        Self {
            buf_reader: BufReader::new(inner),
            max_payload_size,
        }
    }

    /// Parse exactly one frame off the wire (spec.md §4.1 "Inbound").
    pub async fn read_frame(&mut self) -> Result<Frame, Error> {
        let mut header = [0u8; 2];
        self.buf_reader.read_exact(&mut header).await?;

        let fin = (header[0] & 0b1000_0000) != 0;
        let rsv = header[0] & 0b0111_0000;
        let opcode = OpCode::from_byte(header[0] & 0b0000_1111)?;

        if rsv != 0 {
            return Err(Error::RsvNotZero);
        }
        if !fin && opcode.is_control() {
            return Err(Error::ControlFramesFragmented);
        }
        if !fin || opcode == OpCode::Continuation {
            return Err(Error::ContinuationUnsupported);
        }

        let masked = (header[1] & 0b1000_0000) != 0;
        if masked {
            // Per RFC 6455, frames from server to client must never be
            // masked (spec.md §3 invariant).
            return Err(Error::UnexpectedMask);
        }

        let mut length = (header[1] & 0b0111_1111) as u64;
        if length > 125 && opcode.is_control() {
            return Err(Error::ControlFramePayloadSize);
        }

        if length == 126 {
            let mut ext = [0u8; 2];
            self.buf_reader.read_exact(&mut ext).await?;
            length = u16::from_be_bytes(ext) as u64;
        } else if length == 127 {
            let mut ext = [0u8; 8];
            self.buf_reader.read_exact(&mut ext).await?;
            length = u64::from_be_bytes(ext);
        }

        if length as usize > self.max_payload_size {
            return Err(Error::PayloadTooLarge);
        }

        let mut payload = vec![0u8; length as usize];
        self.buf_reader.read_exact(&mut payload).await?;

        Ok(Frame::new(fin, opcode, payload))
    }
}

/// Encodes and writes outbound (always-masked) WebSocket frames.
pub struct WsWriter<W> {
    write: W,
}

impl<W: AsyncWrite + Unpin> WsWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { write: inner }
    }

    /// Encode `frame` as a single final, masked client frame and send it in
    /// one write (spec.md §9 Design Note: prefer a gather write over the
    /// reserved-padding convention — the wire output is identical).
    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let mut rng = rand::thread_rng();
        let mask: [u8; 4] = rng.gen();

        let payload_len = frame.payload.len();
        let mut header = Vec::with_capacity(14);
        header.push((frame.fin as u8) << 7 | frame.opcode.as_u8());

        if payload_len <= 125 {
            header.push(0x80 | payload_len as u8);
        } else if payload_len <= 0xFFFF {
            header.push(0x80 | 126);
            header.extend_from_slice(&(payload_len as u16).to_be_bytes());
        } else {
            header.push(0x80 | 127);
            header.extend_from_slice(&(payload_len as u64).to_be_bytes());
        }
        header.extend_from_slice(&mask);

        let mut masked_payload = Vec::with_capacity(payload_len);
        masked_payload.extend(
            frame
                .payload
                .iter()
                .enumerate()
                .map(|(i, byte)| byte ^ mask[i % 4]),
        );

        header.extend_from_slice(&masked_payload);
        self.write.write_all(&header).await?;
        Ok(())
    }

    pub async fn close(&mut self, payload: Vec<u8>) -> Result<(), Error> {
        self.write_frame(Frame::close(payload)).await
    }
}

/// Split a connected stream into an independent reader and writer, mirroring
/// how the Engine.IO layer needs to read frames in its own loop while
/// sharing the writer (behind an `Arc<Mutex<_>>`) with whatever sends pongs
/// and outbound messages.
pub fn split<S>(stream: S) -> (WsReader<ReadHalf<S>>, WsWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    split_with_max_payload_size(stream, MAX_PAYLOAD_SIZE)
}

/// Same as [`split`], but enforcing `max_payload_size` on the reader half
/// instead of the crate-wide default.
pub fn split_with_max_payload_size<S>(
    stream: S,
    max_payload_size: usize,
) -> (WsReader<ReadHalf<S>>, WsWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (
        WsReader::with_max_payload_size(read_half, max_payload_size),
        WsWriter::new(write_half),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn write_then_read_roundtrips_payload_and_opcode() {
        let (client, server) = duplex(4096);
        let (mut server_read, _server_write) = split(server);
        let (_client_read, mut client_write) = split(client);

        client_write
            .write_frame(Frame::text(b"hello".to_vec()))
            .await
            .unwrap();

        let frame = server_read.read_frame().await.unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"hello".to_vec());
        assert!(frame.fin);
    }

    #[tokio::test]
    async fn every_written_frame_is_masked() {
        let (client, server) = duplex(4096);
        let (mut server_read, _server_write) = split(server);
        let (_client_read, mut client_write) = split(client);

        client_write
            .write_frame(Frame::text(b"mask me".to_vec()))
            .await
            .unwrap();

        // Read the header directly to check the mask bit rather than going
        // through read_frame (which rejects server-direction masked frames).
        let mut header = [0u8; 2];
        use tokio::io::AsyncReadExt;
        server_read.buf_reader.read_exact(&mut header).await.unwrap();
        assert_ne!(header[1] & 0b1000_0000, 0, "MASK bit must be set on client frames");
    }

    #[tokio::test]
    async fn boundary_payload_lengths_select_expected_header_width() {
        for len in [0usize, 125, 126, 127, 65535, 65536] {
            let (client, server) = duplex(200_000);
            let (mut server_read, _sw) = split(server);
            let (_cr, mut client_write) = split(client);
            client_write
                .write_frame(Frame::text(vec![0u8; len]))
                .await
                .unwrap();
            let frame = server_read.read_frame().await.unwrap();
            assert_eq!(frame.payload.len(), len);
        }
    }

    #[tokio::test]
    async fn rejects_payloads_above_the_configured_max() {
        let (client, server) = duplex(4096);
        let (mut server_read, _sw) = split_with_max_payload_size(server, 10);
        let (_cr, mut client_write) = split(client);
        client_write
            .write_frame(Frame::text(vec![0u8; 11]))
            .await
            .unwrap();
        let err = server_read.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge));
    }

    #[tokio::test]
    async fn rejects_reserved_bits_set() {
        let (client, server) = duplex(64);
        let (mut server_read, _sw) = split(server);
        let (_cr, mut client_write) = split(client);
        use tokio::io::AsyncWriteExt;
        // fin=1, rsv1=1, opcode=text, no mask, length 0
        client_write.write.write_all(&[0b1100_0001, 0x00]).await.unwrap();
        let err = server_read.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::RsvNotZero));
    }
}
