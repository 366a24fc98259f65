//! Text-vs-binary body storage.
//!
//! Bodies are persisted inline as text. Valid UTF-8 payloads are stored
//! verbatim; anything else is base64-encoded behind a fixed marker prefix
//! so the stored form is never ambiguous.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Prefix marking a base64-encoded binary body.
pub const BINARY_MARKER: &str = "base64:";

/// Encode a raw payload for storage. Empty payloads store as `None`.
pub fn encode_body(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    match std::str::from_utf8(raw) {
        Ok(text) => Some(text.to_string()),
        Err(_) => Some(format!("{BINARY_MARKER}{}", BASE64.encode(raw))),
    }
}

/// Decode a stored body back to raw bytes.
pub fn decode_body(stored: &str) -> Vec<u8> {
    match stored.strip_prefix(BINARY_MARKER) {
        Some(encoded) => BASE64.decode(encoded).unwrap_or_else(|_| stored.as_bytes().to_vec()),
        None => stored.as_bytes().to_vec(),
    }
}

/// Whether a stored body is the binary (base64-marked) form.
pub fn is_binary(stored: &str) -> bool {
    stored.starts_with(BINARY_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_body_round_trips_verbatim() {
        let payload = br#"{"v":1}"#;
        let stored = encode_body(payload).unwrap();
        assert_eq!(stored, r#"{"v":1}"#);
        assert!(!is_binary(&stored));
        assert_eq!(decode_body(&stored), payload);
    }

    #[test]
    fn test_binary_body_is_marked_and_round_trips() {
        let payload = [0xff, 0xfe, 0x00, 0x9c];
        let stored = encode_body(&payload).unwrap();
        assert!(is_binary(&stored));
        assert_eq!(decode_body(&stored), payload);
    }

    #[test]
    fn test_empty_body_stores_as_none() {
        assert_eq!(encode_body(b""), None);
    }

    #[test]
    fn test_text_that_looks_like_base64_is_not_decoded() {
        // A plain-text body without the marker must come back byte-identical.
        let stored = encode_body(b"aGVsbG8=").unwrap();
        assert_eq!(decode_body(&stored), b"aGVsbG8=");
    }
}
