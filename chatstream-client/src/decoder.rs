//! Incremental UTF-8 decoding for chunked response bodies.

use std::char::REPLACEMENT_CHARACTER;

/// Stateful UTF-8 decoder for a byte stream delivered in arbitrary chunks.
///
/// A character whose bytes straddle two chunks is held back until the rest
/// arrives instead of being replaced. Bytes that can never form a valid
/// sequence decode to U+FFFD and decoding carries on, matching a non-fatal
/// text decoder.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Creates a decoder with no buffered bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`, prefixed by any incomplete sequence left from the
    /// previous call. A trailing incomplete sequence is retained.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    if let Some(invalid_len) = err.error_len() {
                        out.push(REPLACEMENT_CHARACTER);
                        rest = &after[invalid_len..];
                    } else {
                        self.pending = after.to_vec();
                        break;
                    }
                }
            }
        }
        out
    }

    /// Flushes the decoder at end of input. An incomplete trailing sequence
    /// becomes a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Number of bytes held back waiting for the rest of a character.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
