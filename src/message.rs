use crate::error::Error;
use crate::frame::{Frame, OpCode};

/// A reassembled application message, as handed to `Session::send_message`
/// or produced internally from a completed frame sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn from_frame(frame: Frame) -> Result<Self, Error> {
        match frame.opcode {
            OpCode::Text => Ok(Message::Text(String::from_utf8(frame.payload)?)),
            OpCode::Binary => Ok(Message::Binary(frame.payload)),
            other => Err(Error::InvalidOpcode(other.as_u8())),
        }
    }

    pub fn as_binary(&self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(data) => data.clone(),
        }
    }

    pub fn as_text(&self) -> Result<String, Error> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Binary(data) => Ok(String::from_utf8(data.clone())?),
        }
    }

    fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        }
    }

    /// Splits into frames no larger than `max_frame_size`, with `Continue`
    /// opcodes on every chunk after the first and `compressed` (RSV1) set
    /// only on the first. `payload_override` replaces the message's own
    /// bytes when given, so a caller can DEFLATE-compress the payload first
    /// while still deriving the opcode from `self`.
    pub fn to_frames(
        &self,
        max_frame_size: usize,
        payload_override: Option<Vec<u8>>,
        compressed: bool,
    ) -> Vec<Frame> {
        let opcode = self.opcode();
        let payload = payload_override.unwrap_or_else(|| self.as_binary());

        if payload.is_empty() {
            return vec![Frame::new(true, opcode, payload, compressed)];
        }

        let mut frames = Vec::new();
        for chunk in payload.chunks(max_frame_size.max(1)) {
            let chunk_opcode = if frames.is_empty() {
                opcode
            } else {
                OpCode::Continue
            };
            frames.push(Frame::new(false, chunk_opcode, chunk.to_vec(), false));
        }
        if let Some(first) = frames.first_mut() {
            first.compressed = compressed;
        }
        if let Some(last) = frames.last_mut() {
            last.final_fragment = true;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_frames_single_chunk_when_small() {
        let frames = Message::Text("hi".to_string()).to_frames(1024, None, false);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].final_fragment);
        assert_eq!(frames[0].opcode, OpCode::Text);
    }

    #[test]
    fn to_frames_splits_large_payload() {
        let frames = Message::Binary(vec![0u8; 10]).to_frames(4, None, false);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, OpCode::Binary);
        assert_eq!(frames[1].opcode, OpCode::Continue);
        assert_eq!(frames[2].opcode, OpCode::Continue);
        assert!(!frames[0].final_fragment);
        assert!(frames[2].final_fragment);
    }

    #[test]
    fn empty_payload_produces_single_final_frame() {
        let frames = Message::Binary(vec![]).to_frames(16, None, false);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].final_fragment);
    }

    #[test]
    fn payload_override_is_used_with_original_opcode() {
        let frames = Message::Text("hello".to_string()).to_frames(1024, Some(vec![1, 2, 3]), true);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert_eq!(frames[0].payload, vec![1, 2, 3]);
        assert!(frames[0].compressed);
    }
}
