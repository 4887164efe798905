//! Text decoding with an ordered encoding fallback.

/// A text encoding tried when reading files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1. Every byte maps to the code point of the same value, so
    /// decoding never fails.
    Latin1,
}

/// Encodings tried in order; the first successful decode wins.
pub const FALLBACK_ORDER: [Encoding; 2] = [Encoding::Utf8, Encoding::Latin1];

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            Encoding::Latin1 => Some(bytes.iter().copied().map(char::from).collect()),
        }
    }
}

/// Decode `bytes` with the first encoding in [`FALLBACK_ORDER`] that accepts
/// them.
pub fn decode_text(bytes: &[u8]) -> Option<(String, Encoding)> {
    FALLBACK_ORDER
        .iter()
        .find_map(|&encoding| encoding.decode(bytes).map(|text| (text, encoding)))
}
