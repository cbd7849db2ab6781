use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};

use common::time_util::{format_since_column, parse_flexible_timestamp};

/// Encodes a since-column or server-clock continuation: standard
/// base64 of the RFC3339/since-column timestamp string.
pub fn encode_timestamp(dt: &DateTime<Utc>) -> String {
    STANDARD.encode(dt.to_rfc3339())
}

/// Encodes a since-column continuation using the
/// `yyyy-MM-ddTHH:mm:ss.SSSZ` wire format specifically (matches what a
/// decoded since-column token round-trips to).
pub fn encode_since_column(dt: &DateTime<Utc>) -> String {
    STANDARD.encode(format_since_column(dt))
}

/// Decodes a since-column or server-clock continuation token back to an
/// instant. Returns `None` on any malformed input; callers decide their
/// own fallback (C3 falls back to the epoch or min-LSN).
pub fn decode_timestamp(token: &str) -> Option<DateTime<Utc>> {
    let raw = STANDARD.decode(token).ok()?;
    let text = String::from_utf8(raw).ok()?;
    parse_flexible_timestamp(&text)
}

/// Encodes a 10-byte CDC log sequence number as `0x<20-hex-digits>`
/// ASCII, URL-safe base64, unpadded.
pub fn encode_cdc_lsn(lsn: &[u8]) -> String {
    let ascii = format!("0x{}", hex_encode(lsn));
    URL_SAFE_NO_PAD.encode(ascii.as_bytes())
}

/// Decodes a CDC LSN continuation token. Returns `None` unless the
/// decoded ASCII is exactly 22 bytes and begins with `0x` (the "22
/// bytes beginning with 0x" invariant from the token round-trip test).
pub fn decode_cdc_lsn(token: &str) -> Option<Vec<u8>> {
    let raw = URL_SAFE_NO_PAD.decode(token).ok()?;
    let text = String::from_utf8(raw).ok()?;
    if text.len() != 22 || !text.starts_with("0x") {
        return None;
    }
    hex_decode(&text[2..])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn since_column_round_trips() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let token = encode_since_column(&dt);
        let decoded = decode_timestamp(&token).unwrap();
        assert_eq!(decoded, dt);
    }

    #[test]
    fn cdc_lsn_round_trips_and_has_fixed_shape() {
        let lsn = [0u8, 0, 0, 0, 0, 0, 0, 0, 1, 0];
        let token = encode_cdc_lsn(&lsn);
        let decoded = decode_cdc_lsn(&token).unwrap();
        assert_eq!(decoded, lsn.to_vec());

        let raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let ascii = String::from_utf8(raw).unwrap();
        assert_eq!(ascii.len(), 22);
        assert!(ascii.starts_with("0x"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_cdc_lsn("not-base64!!").is_none());
        assert!(decode_timestamp("not-base64!!").is_none());
    }
}
