//! Incremental UTF-8 decoding for chunked process output
//!
//! Reads from a pipe may split a multi-byte character across chunks.
//! [`Utf8Chunker`] holds back an incomplete trailing sequence until the
//! next chunk completes it.

/// Stateful byte → text decoder
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + bytes` as possible
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // valid_up_to is always a char boundary
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is left, replacing an incomplete tail
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_multibyte_character() {
        let bytes = "héllo ✓".as_bytes();
        let mut chunker = Utf8Chunker::new();
        let mut out = String::new();
        for byte in bytes {
            out.push_str(&chunker.push(std::slice::from_ref(byte)));
        }
        out.push_str(&chunker.finish());
        assert_eq!(out, "héllo ✓");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut chunker = Utf8Chunker::new();
        assert_eq!(chunker.push(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(chunker.push(b"\xe2\x9c"), "");
        assert_eq!(chunker.finish(), "\u{fffd}");
    }
}
