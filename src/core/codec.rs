//! Wire codec for the `KEY=VALUE` text protocol carried in notification
//! payloads. Pure functions, no state; numeric interpretation happens in the
//! telemetry aggregator, keyed by the message key.

/// A decoded key/value pair from one notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub key: String,
    pub value: String,
}

impl WireMessage {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Decodes a raw payload. Returns `None` unless the payload is valid UTF-8
/// and splits on `=` into exactly two non-empty trimmed parts. Malformed
/// payloads are dropped, not errors.
pub fn decode(payload: &[u8]) -> Option<WireMessage> {
    let text = std::str::from_utf8(payload).ok()?;
    decode_str(text)
}

/// Decodes an already-textual payload. See [`decode`].
pub fn decode_str(text: &str) -> Option<WireMessage> {
    let mut parts = text.split('=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();
    if parts.next().is_some() || key.is_empty() || value.is_empty() {
        return None;
    }
    Some(WireMessage::new(key, value))
}

/// Exact inverse of [`decode_str`] for well-formed keys and values.
pub fn encode(key: &str, value: &str) -> String {
    format!("{}={}", key, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cases = [("CUMULATED_POWER", "0.5"), ("MODE", "S+"), ("PING", "1")];
        for (key, value) in cases {
            let decoded = decode_str(&encode(key, value)).unwrap();
            assert_eq!(decoded, WireMessage::new(key, value));
        }
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        assert_eq!(decode_str("nokeyvalue"), None);
        assert_eq!(decode_str("a=b=c"), None);
        assert_eq!(decode_str(""), None);
        assert_eq!(decode_str("="), None);
        assert_eq!(decode_str("KEY="), None);
        assert_eq!(decode_str("=VALUE"), None);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let decoded = decode_str(" MODE = D ").unwrap();
        assert_eq!(decoded, WireMessage::new("MODE", "D"));
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        assert_eq!(decode(&[0xff, 0x3d, 0x41]), None);
    }

    #[test]
    fn bytes_decode_matches_str_decode() {
        assert_eq!(
            decode(b"LEFT_MOTOR=127.5"),
            Some(WireMessage::new("LEFT_MOTOR", "127.5"))
        );
    }
}
