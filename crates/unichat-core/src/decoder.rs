/// Incremental UTF-8 decoder for response body chunks.
///
/// A multi-byte character split across two chunks is held back until the
/// rest of it arrives. Malformed sequences decode to U+FFFD.
#[derive(Debug, Default, Clone)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut decoded = String::with_capacity(bytes.len());
        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    break;
                }
                Err(error) => {
                    let (valid, rest) = input.split_at(error.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        decoded.push_str(valid);
                    }
                    match error.error_len() {
                        Some(invalid_len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[invalid_len..];
                        }
                        None => {
                            // Truncated sequence at the end of the chunk.
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        decoded
    }

    /// Flushes a truncated trailing sequence at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
