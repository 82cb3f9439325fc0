use crate::error::Error;
use bytes::BytesMut;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// RFC 6455 §5.2 opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// A single WebSocket frame. `compressed` records whether the payload was
/// (or should be) DEFLATE-compressed; it drives RSV1 on the wire but is not
/// itself part of the wire format.
#[derive(Debug, Clone)]
pub struct Frame {
    pub final_fragment: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
    pub compressed: bool,
}

impl Frame {
    pub fn new(final_fragment: bool, opcode: OpCode, payload: Vec<u8>, compressed: bool) -> Self {
        Self {
            final_fragment,
            opcode,
            payload,
            compressed,
        }
    }

    pub fn text(payload: String, final_fragment: bool) -> Self {
        Frame::new(final_fragment, OpCode::Text, payload.into_bytes(), false)
    }

    pub fn binary(payload: Vec<u8>, final_fragment: bool) -> Self {
        Frame::new(final_fragment, OpCode::Binary, payload, false)
    }

    pub fn continuation(payload: Vec<u8>, final_fragment: bool) -> Self {
        Frame::new(final_fragment, OpCode::Continue, payload, false)
    }

    pub fn ping(payload: Vec<u8>) -> Result<Self, Error> {
        if payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(Frame::new(true, OpCode::Ping, payload, false))
    }

    pub fn pong(payload: Vec<u8>) -> Result<Self, Error> {
        if payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(Frame::new(true, OpCode::Pong, payload, false))
    }

    /// Builds a CLOSE frame. A `code` of `None` produces a payload-less
    /// close, per RFC 6455 §5.5.1 (the body is optional).
    pub fn close(code: Option<u16>, reason: &str) -> Result<Self, Error> {
        let mut payload = Vec::new();
        if let Some(code) = code {
            payload.extend_from_slice(&code.to_be_bytes());
            payload.extend_from_slice(reason.as_bytes());
        } else if !reason.is_empty() {
            return Err(Error::InvalidCloseFrame);
        }
        if payload.len() > 125 {
            return Err(Error::ControlFramePayloadSize);
        }
        Ok(Frame::new(true, OpCode::Close, payload, false))
    }

    /// Parses the close code/reason out of a received CLOSE frame's payload.
    /// Empty is valid (no code given); exactly one byte is invalid; two or
    /// more bytes begin with a big-endian 16-bit code.
    pub fn parse_close_payload(payload: &[u8]) -> Result<(Option<u16>, String), Error> {
        if payload.is_empty() {
            return Ok((None, String::new()));
        }
        if payload.len() == 1 {
            return Err(Error::InvalidCloseFrame);
        }
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8(payload[2..].to_vec())?;
        Ok((Some(code), reason))
    }
}

/// Reads and decodes one frame off `reader`. `permessage_deflate_enabled`
/// governs whether RSV1 is accepted. When `extended` is set, the RSV-bits
/// check and strict opcode validation are both skipped (unrecognized
/// opcodes fall back to `OpCode::Binary`) rather than failing the
/// connection. Returns the frame plus its RSV1 bit (the caller owns
/// decompression since it needs per-connection DEFLATE state that this free
/// function doesn't have access to).
pub async fn decode_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: Option<usize>,
    permessage_deflate_enabled: bool,
    extended: bool,
) -> Result<(Frame, bool), Error> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    let final_fragment = header[0] & 0b1000_0000 != 0;
    let rsv1 = header[0] & 0b0100_0000 != 0;
    let rsv2 = header[0] & 0b0010_0000 != 0;
    let rsv3 = header[0] & 0b0001_0000 != 0;
    let opcode = if extended {
        OpCode::from(header[0] & 0b0000_1111).unwrap_or(OpCode::Binary)
    } else {
        OpCode::from(header[0] & 0b0000_1111)?
    };

    if !extended && (rsv2 || rsv3 || (rsv1 && !permessage_deflate_enabled)) {
        return Err(Error::RSVNotZero);
    }
    if opcode.is_control() && !final_fragment {
        return Err(Error::ControlFramesFragmented);
    }

    let masked = header[1] & 0b1000_0000 != 0;
    if masked {
        return Err(Error::ServerFrameMasked);
    }
    let mut length = (header[1] & 0b0111_1111) as u64;

    if length == 126 {
        let mut ext = [0u8; 2];
        reader.read_exact(&mut ext).await?;
        length = u16::from_be_bytes(ext) as u64;
    } else if length == 127 {
        let mut ext = [0u8; 8];
        reader.read_exact(&mut ext).await?;
        length = u64::from_be_bytes(ext);
    }

    if opcode.is_control() && length > 125 {
        return Err(Error::ControlFramePayloadSize);
    }
    if let Some(max) = max_frame_size {
        if length as usize > max {
            return Err(Error::MaxFrameSize);
        }
    }

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;

    Ok((Frame::new(final_fragment, opcode, payload, rsv1), rsv1))
}

/// Encodes and writes `frame` onto `writer`, masking with a fresh random key
/// per RFC 6455 §5.3 (clients MUST mask every frame they send). `set_rsv1`
/// is controlled by the caller so that only the first frame of a compressed,
/// possibly fragmented, message carries the bit (RFC 7692 §6).
pub async fn encode_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
    set_rsv1: bool,
) -> Result<(), Error> {
    let mut header = BytesMut::new();

    let mut first_byte = if frame.final_fragment {
        0b1000_0000
    } else {
        0
    };
    if set_rsv1 {
        first_byte |= 0b0100_0000;
    }
    first_byte |= frame.opcode.as_u8();
    header.extend_from_slice(&[first_byte]);

    let len = frame.payload.len();
    if len <= 125 {
        header.extend_from_slice(&[0b1000_0000 | len as u8]);
    } else if len <= u16::MAX as usize {
        header.extend_from_slice(&[0b1000_0000 | 126]);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.extend_from_slice(&[0b1000_0000 | 127]);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let mut mask_key = [0u8; 4];
    rand::rng().fill_bytes(&mut mask_key);
    header.extend_from_slice(&mask_key);

    writer.write_all(&header).await?;

    let mut masked_payload = frame.payload.clone();
    for (i, byte) in masked_payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
    writer.write_all(&masked_payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes a frame the way a server would: unmasked. `encode_frame`
    /// always sets MASK (clients MUST mask), so decode-path tests build
    /// wire bytes with this instead.
    async fn encode_unmasked<W: AsyncWrite + Unpin>(
        writer: &mut W,
        frame: &Frame,
        set_rsv1: bool,
    ) -> Result<(), Error> {
        let mut header = BytesMut::new();
        let mut first_byte = if frame.final_fragment { 0b1000_0000 } else { 0 };
        if set_rsv1 {
            first_byte |= 0b0100_0000;
        }
        first_byte |= frame.opcode.as_u8();
        header.extend_from_slice(&[first_byte]);

        let len = frame.payload.len();
        if len <= 125 {
            header.extend_from_slice(&[len as u8]);
        } else if len <= u16::MAX as usize {
            header.extend_from_slice(&[126]);
            header.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            header.extend_from_slice(&[127]);
            header.extend_from_slice(&(len as u64).to_be_bytes());
        }

        writer.write_all(&header).await?;
        writer.write_all(&frame.payload).await?;
        Ok(())
    }

    #[test]
    fn opcode_roundtrip() {
        for byte in [0x0, 0x1, 0x2, 0x8, 0x9, 0xA] {
            let op = OpCode::from(byte).unwrap();
            assert_eq!(op.as_u8(), byte);
        }
        assert!(OpCode::from(0x3).is_err());
    }

    #[test]
    fn control_opcodes_are_control() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Binary.is_control());
        assert!(!OpCode::Continue.is_control());
    }

    #[test]
    fn ping_rejects_oversize_payload() {
        assert!(Frame::ping(vec![0u8; 126]).is_err());
    }

    #[test]
    fn close_payload_roundtrip() {
        let frame = Frame::close(Some(1000), "bye").unwrap();
        let (code, reason) = Frame::parse_close_payload(&frame.payload).unwrap();
        assert_eq!(code, Some(1000));
        assert_eq!(reason, "bye");
    }

    #[test]
    fn close_payload_single_byte_is_invalid() {
        assert!(Frame::parse_close_payload(&[0x03]).is_err());
    }

    #[test]
    fn close_payload_empty_is_valid() {
        let (code, reason) = Frame::parse_close_payload(&[]).unwrap();
        assert_eq!(code, None);
        assert_eq!(reason, "");
    }

    #[tokio::test]
    async fn encode_then_decode_text_frame() {
        let frame = Frame::text("hello".to_string(), true);
        let mut buf = Vec::new();
        encode_unmasked(&mut buf, &frame, false).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let (decoded, rsv1) = decode_frame(&mut cursor, None, false, false).await.unwrap();
        assert!(!rsv1);
        assert_eq!(decoded.opcode, OpCode::Text);
        assert_eq!(decoded.payload, b"hello");
        assert!(decoded.final_fragment);
    }

    #[tokio::test]
    async fn decode_rejects_rsv1_without_extension() {
        let frame = Frame::binary(vec![1, 2, 3], true);
        let mut buf = Vec::new();
        encode_unmasked(&mut buf, &frame, true).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let err = decode_frame(&mut cursor, None, false, false).await.unwrap_err();
        assert!(matches!(err, Error::RSVNotZero));
    }

    #[tokio::test]
    async fn decode_rejects_oversize_frame() {
        let frame = Frame::binary(vec![0u8; 64], true);
        let mut buf = Vec::new();
        encode_unmasked(&mut buf, &frame, false).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let err = decode_frame(&mut cursor, Some(10), false, false).await.unwrap_err();
        assert!(matches!(err, Error::MaxFrameSize));
    }

    #[tokio::test]
    async fn extended_mode_skips_rsv_check() {
        let frame = Frame::binary(vec![1, 2, 3], true);
        let mut buf = Vec::new();
        encode_unmasked(&mut buf, &frame, true).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let (decoded, rsv1) = decode_frame(&mut cursor, None, false, true).await.unwrap();
        assert!(rsv1);
        assert_eq!(decoded.payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn decode_rejects_masked_server_frame() {
        let frame = Frame::binary(vec![1, 2, 3], true);
        let mut buf = Vec::new();
        encode_frame(&mut buf, &frame, false).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let err = decode_frame(&mut cursor, None, false, false).await.unwrap_err();
        assert!(matches!(err, Error::ServerFrameMasked));
    }
}
