//! Line framing for the relay's event stream.
//!
//! Chunks arrive split at arbitrary byte offsets, including inside a UTF-8
//! sequence or a JSON payload. Only newline-terminated lines leave the
//! decoder; `\n` never occurs inside a multi-byte UTF-8 sequence, so text is
//! decoded per complete line and split characters are never mangled.

use crate::constants::MAX_FRAME_LENGTH;
use bytes::BytesMut;
use std::io;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone)]
pub struct FrameDecoder {
    /// Offset already scanned for a newline in the pending buffer.
    next_index: usize,
    max_length: usize,
    discarded_bytes: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            discarded_bytes: 0,
        }
    }

    /// Bytes of an unterminated trailing fragment dropped at end of stream.
    pub fn discarded_bytes(&self) -> usize {
        self.discarded_bytes
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

impl Decoder for FrameDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let start = self.next_index.min(buf.len());
        match buf[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let newline = start + offset;
                self.next_index = 0;
                let mut line = buf.split_to(newline + 1);
                line.truncate(newline);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                Ok(Some(decode_line(&line)))
            }
            None => {
                if buf.len() > self.max_length {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("frame exceeds {} bytes without a newline", self.max_length),
                    ));
                }
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if !buf.is_empty() {
            tracing::debug!(
                "[FRAME] Discarding {} trailing bytes without a newline",
                buf.len()
            );
            self.discarded_bytes += buf.len();
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}
