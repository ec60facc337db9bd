//! Line-delimited JSON framing.
//!
//! The endpoint writes one JSON object per `\r\n`-terminated line and sends
//! bare `\r\n` keep-alives in between. Chunk boundaries are arbitrary, so a
//! frame may arrive in several pieces.

use bytes::BytesMut;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Default)]
pub struct LineFrameParser {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no delimiter.
    scanned: usize,
}

impl LineFrameParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
        }
    }

    /// Append a chunk and decode every line it completes.
    ///
    /// Blank lines and lines that fail to decode are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let newline_pos = self.scanned + offset;
            self.scanned = 0;
            let mut line = self.buffer.split_to(newline_pos + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<Value>(&line) {
                Ok(value) => decoded.push(value),
                Err(e) => debug!(error = %e, len = line.len(), "dropping undecodable frame"),
            }
        }
        self.scanned = self.buffer.len();
        decoded
    }

    /// Bytes held back waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
