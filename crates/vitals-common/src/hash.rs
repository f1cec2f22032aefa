//! HMAC-SHA256 body signing shared by the agent and the server.

use ring::hmac;
use std::fmt::Write;

/// Computes the hex HMAC-SHA256 of `data` under `key`.
///
/// An empty key disables signing and yields an empty string.
pub fn compute_hash(data: &[u8], key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    let tag = hmac::sign(&key, data);
    let mut out = String::with_capacity(tag.as_ref().len() * 2);
    for b in tag.as_ref() {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Verifies a received hex HMAC-SHA256 tag against `data`.
///
/// An empty key disables validation (always true); an empty or undecodable
/// tag fails. The comparison itself is constant-time.
pub fn validate_hash(data: &[u8], key: &str, received: &str) -> bool {
    if key.is_empty() {
        return true;
    }
    if received.is_empty() {
        return false;
    }
    let Ok(tag) = hex::decode(received) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    hmac::verify(&key, data, &tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_and_validate_round_trip() {
        let body = br#"{"id":"cpu","type":"gauge","value":75.5}"#;
        let tag = compute_hash(body, "secret");
        assert_eq!(tag.len(), 64);
        assert!(validate_hash(body, "secret", &tag));
    }

    #[test]
    fn tampered_body_fails() {
        let tag = compute_hash(b"original", "secret");
        assert!(!validate_hash(b"tampered", "secret", &tag));
    }

    #[test]
    fn wrong_key_fails() {
        let tag = compute_hash(b"body", "key-a");
        assert!(!validate_hash(b"body", "key-b", &tag));
    }

    #[test]
    fn empty_key_disables_signing_and_validation() {
        assert_eq!(compute_hash(b"body", ""), "");
        assert!(validate_hash(b"body", "", "anything"));
    }

    #[test]
    fn empty_or_garbage_tag_fails() {
        assert!(!validate_hash(b"body", "secret", ""));
        assert!(!validate_hash(b"body", "secret", "not hex"));
    }
}
