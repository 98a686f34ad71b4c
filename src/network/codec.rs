// src/network/codec.rs
//! Newline-delimited JSON framing for the node connection
//!
//! Each message is one JSON object terminated by `\n`. The decoder buffers
//! partial reads, skips blank lines and rejects lines longer than
//! [`MAX_LINE_LENGTH`].

use crate::network::messages::{self, Envelope, NodeMessage};
use crate::utils::error::MinerError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest line accepted from the node
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec for the node protocol
///
/// Decodes [`NodeMessage`]s and encodes [`Envelope`]s.
#[derive(Debug)]
pub struct NodeCodec {
    /// Bytes already scanned for a newline
    next_index: usize,
    max_length: usize,
}

impl NodeCodec {
    /// Creates a codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    /// Creates a codec rejecting lines longer than `max_length`
    pub fn with_max_length(max_length: usize) -> Self {
        NodeCodec {
            next_index: 0,
            max_length,
        }
    }

    fn too_long(&self, len: usize) -> MinerError {
        MinerError::ProtocolError(format!(
            "Line of {} bytes exceeds the {} byte limit",
            len, self.max_length
        ))
    }
}

impl Default for NodeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NodeCodec {
    type Item = NodeMessage;
    type Error = MinerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..].iter().position(|b| *b == b'\n');
            let Some(offset) = newline else {
                if src.len() > self.max_length {
                    return Err(self.too_long(src.len()));
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let frame = src.split_to(end + 1);
            let line = frame[..end].trim_ascii();

            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_length {
                return Err(self.too_long(line.len()));
            }

            log::trace!("Received: {}", String::from_utf8_lossy(line));
            return messages::from_json(line).map(Some);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(msg) = self.decode(src)? {
            return Ok(Some(msg));
        }

        // the connection closed after an unterminated line
        self.next_index = 0;
        let rest = src.split_to(src.len());
        let line = rest.trim_ascii();
        if line.is_empty() {
            Ok(None)
        } else {
            messages::from_json(line).map(Some)
        }
    }
}

impl Encoder<Envelope> for NodeCodec {
    type Error = MinerError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = messages::to_json(&item)?;
        log::trace!("Sending: {}", String::from_utf8_lossy(&json));
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
