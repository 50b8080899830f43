/// Stateful UTF-8 decoder for transport chunks.
///
/// A multi-byte character split across two chunks is held back until the
/// rest arrives. Invalid sequences decode to U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk, retaining an incomplete trailing sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Flushes whatever is still pending at end of stream.
    pub fn finish(&mut self) -> String {
        self.drain(true)
    }

    fn drain(&mut self, is_final: bool) -> String {
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None if is_final => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &[];
                            break;
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let keep = rest.len();
        let start = self.pending.len() - keep;
        self.pending.drain(..start);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_back_split_multibyte_character() {
        let bytes = "héllo".as_bytes();
        let mut decoder = ChunkDecoder::new();
        // 'é' is two bytes; split between them.
        let first = decoder.decode(&bytes[..2]);
        assert_eq!(first, "h");
        let second = decoder.decode(&bytes[2..]);
        assert_eq!(second, "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn four_byte_character_split_byte_by_byte() {
        let bytes = "a🦀b".as_bytes();
        let mut decoder = ChunkDecoder::new();
        let mut out = String::new();
        for byte in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, "a🦀b");
    }

    #[test]
    fn invalid_bytes_degrade_to_replacement_characters() {
        let mut decoder = ChunkDecoder::new();
        let out = decoder.decode(&[b'o', 0xFF, b'k']);
        assert_eq!(out, "o\u{FFFD}k");
    }

    #[test]
    fn truncated_sequence_at_end_is_flushed_as_replacement() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }
}
