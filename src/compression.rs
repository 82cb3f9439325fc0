use crate::error::Error;
use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::cmp;

/// Trailer a DEFLATE compressor appends on SYNC_FLUSH, and which RFC 7692
/// §7.2.1 has the sender strip before putting the payload on the wire.
const DEFLATE_TRAILER: [u8; 4] = [0, 0, 255, 255];

fn calculate_buffer_size(payload_size: usize) -> usize {
    if payload_size <= 4096 {
        4096
    } else if payload_size <= 65536 {
        16384
    } else {
        65536
    }
}

/// Per-direction permessage-deflate compressor. One instance per connection;
/// `reset_context` mirrors the negotiated `*_no_context_takeover` parameter
/// for this direction (the client side of this crate always resets, since
/// client-side context takeover across messages is a declared non-goal).
pub(crate) struct Deflator {
    compressor: Compress,
    reset_context: bool,
}

impl Deflator {
    pub fn new(reset_context: bool, window_bits: Option<u8>) -> Self {
        let bits = window_bits.unwrap_or(15);
        let compressor = Compress::new_with_window_bits(Compression::default(), false, bits);
        Self {
            compressor,
            reset_context,
        }
    }

    /// Compresses `payload`, returning the wire-ready bytes with the
    /// trailing `00 00 FF FF` already stripped.
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if self.reset_context {
            self.compressor.reset();
        }

        let buffer_size = calculate_buffer_size(payload.len());
        let mut compressed_data = BytesMut::with_capacity(payload.len());
        let mut buffer = vec![0u8; buffer_size];

        let before_in = self.compressor.total_in();
        let mut consumed = 0usize;

        loop {
            let input = &payload[consumed..];
            let flush = if input.is_empty() {
                FlushCompress::Sync
            } else {
                FlushCompress::None
            };
            let before_out = self.compressor.total_out();
            let status = self
                .compressor
                .compress(input, &mut buffer, flush)
                .map_err(|e| Error::DeflateError(e.to_string()))?;
            let written = (self.compressor.total_out() - before_out) as usize;
            compressed_data.extend_from_slice(&buffer[..written]);
            consumed = (self.compressor.total_in() - before_in) as usize;

            if consumed >= payload.len() && (status == Status::Ok || status == Status::BufError) {
                // one more pass with Sync flush to force the trailer out
                if flush == FlushCompress::Sync {
                    break;
                }
                continue;
            }
            if status == Status::StreamEnd {
                break;
            }
            if written == 0 && consumed >= payload.len() {
                break;
            }
            if buffer.len() < 65536 {
                let new_size = cmp::min(buffer.len() * 2, 65536);
                buffer.resize(new_size, 0);
            }
        }

        if compressed_data.ends_with(&DEFLATE_TRAILER) {
            let new_len = compressed_data.len() - DEFLATE_TRAILER.len();
            compressed_data.truncate(new_len);
        }

        Ok(compressed_data.to_vec())
    }
}

/// Per-direction permessage-deflate decompressor, mirroring [`Deflator`].
pub(crate) struct Inflator {
    decompressor: Decompress,
    reset_context: bool,
}

impl Inflator {
    pub fn new(reset_context: bool, window_bits: Option<u8>) -> Self {
        let decompressor = if let Some(bits) = window_bits {
            Decompress::new_with_window_bits(false, bits)
        } else {
            Decompress::new(false)
        };
        Self {
            decompressor,
            reset_context,
        }
    }

    /// Decompresses a received frame payload, appending the `00 00 FF FF`
    /// trailer the sender is required to have stripped (RFC 7692 §7.2.2).
    pub fn decompress(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        if self.reset_context {
            self.decompressor.reset(false);
        }

        let mut input = Vec::with_capacity(payload.len() + DEFLATE_TRAILER.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&DEFLATE_TRAILER);

        let buffer_size = calculate_buffer_size(input.len());
        let mut decompressed_data = BytesMut::with_capacity(buffer_size);
        let mut buffer = Vec::with_capacity(buffer_size);

        let before_in = self.decompressor.total_in();
        while self.decompressor.total_in() - before_in < input.len() as u64 {
            let offset = (self.decompressor.total_in() - before_in) as usize;
            let chunk = &input[offset..];
            match self
                .decompressor
                .decompress_vec(chunk, &mut buffer, FlushDecompress::Sync)
                .map_err(|e| Error::InflateError(e.to_string()))?
            {
                Status::Ok => {
                    decompressed_data.extend_from_slice(&buffer);
                    buffer.clear();
                }
                Status::StreamEnd => break,
                Status::BufError => break,
            }
        }

        Ok(decompressed_data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress_roundtrip() {
        let mut deflator = Deflator::new(true, None);
        let mut inflator = Inflator::new(true, None);

        let message = b"the quick brown fox jumps over the lazy dog, many times over";
        let compressed = deflator.compress(message).unwrap();
        let decompressed = inflator.decompress(&compressed).unwrap();
        assert_eq!(decompressed, message);
    }

    #[test]
    fn reset_context_allows_repeated_messages() {
        let mut deflator = Deflator::new(true, None);
        let mut inflator = Inflator::new(true, None);

        for msg in ["first message", "second message", "third message"] {
            let compressed = deflator.compress(msg.as_bytes()).unwrap();
            let decompressed = inflator.decompress(&compressed).unwrap();
            assert_eq!(decompressed, msg.as_bytes());
        }
    }

    #[test]
    fn empty_payload_roundtrips() {
        let mut deflator = Deflator::new(true, None);
        let mut inflator = Inflator::new(true, None);
        let compressed = deflator.compress(b"").unwrap();
        let decompressed = inflator.decompress(&compressed).unwrap();
        assert_eq!(decompressed, b"");
    }
}
