//! Broadcast text fields.
//!
//! DVB and ARIB strings use their own character tables. Records keep the raw
//! bytes so that re-encoding is exact; [`EncodedText::to_string_lossy`] gives
//! a display approximation.

use std::fmt;

/// Raw bytes of a text field, as carried on the wire.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct EncodedText(Vec<u8>);

impl EncodedText {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        EncodedText(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the bytes are plain printable UTF-8 without a character
    /// table selector, so the text form is lossless.
    pub fn is_plain(&self) -> bool {
        match std::str::from_utf8(&self.0) {
            Ok(s) => !s.chars().any(char::is_control),
            Err(_) => false,
        }
    }

    /// Best-effort decoding for display.
    pub fn to_string_lossy(&self) -> String {
        let data = self.0.as_slice();
        if data.is_empty() {
            return String::new();
        }

        // Leading byte below 0x20 selects a character table.
        let slice = if data[0] < 0x20 { &data[1..] } else { data };

        if let Ok(s) = std::str::from_utf8(slice) {
            return s.chars().filter(|c| !c.is_control() || *c == '\n').collect();
        }

        slice
            .iter()
            .filter(|&&b| b >= 0x20 || b == 0x0A || b == 0x0D)
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect()
    }
}

impl From<&str> for EncodedText {
    fn from(s: &str) -> Self {
        EncodedText(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for EncodedText {
    fn from(bytes: Vec<u8>) -> Self {
        EncodedText(bytes)
    }
}

impl fmt::Display for EncodedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for EncodedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_plain() {
            write!(f, "{:?}", self.to_string_lossy())
        } else {
            write!(f, "0x{}", hex::encode_upper(&self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let text = EncodedText::from("NHK");
        assert!(text.is_plain());
        assert_eq!(text.to_string(), "NHK");
    }

    #[test]
    fn test_charset_selector_stripped() {
        let text = EncodedText::new(vec![0x15, b'T', b'V']);
        assert!(!text.is_plain());
        assert_eq!(text.to_string_lossy(), "TV");
    }

    #[test]
    fn test_non_utf8_replaced() {
        let text = EncodedText::new(vec![b'A', 0xC9, 0xFF, b'B']);
        assert!(!text.is_plain());
        assert_eq!(text.to_string_lossy(), "A??B");
        assert_eq!(format!("{:?}", text), "0x41C9FF42");
    }
}
