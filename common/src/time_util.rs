use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Current UTC instant, formatted RFC3339. Used as the `GETDATE()`
/// stand-in when minting a server-clock continuation token.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Formats an instant as `yyyy-MM-ddTHH:mm:ss.SSSZ`, the since-column
/// continuation token's wire format.
pub fn format_since_column(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses either RFC3339 or the `yyyy-MM-ddTHH:mm:ss.SSSZ` since-column
/// format, so a previously-issued continuation token decodes regardless
/// of which of the two shapes minted it.
pub fn parse_flexible_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.3fZ") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}
