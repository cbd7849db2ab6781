use chrono::{DateTime, Utc};

/// A typed, possibly-null query parameter. Distinct from
/// [`crate::value::SqlValue`]: this is what gets *sent* to the driver, not
/// what gets decoded back from a result set — in particular it carries an
/// explicit per-type null so the driver can bind the correct nullable
/// parameter kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    NullBit,
    NullInt,
    NullFloat,
    NullDateTime,
    NullString,
    Bit(bool),
    Int(i64),
    Float(f64),
    /// Timestamps are sent pre-formatted (`2006-01-02T15:04:05` for
    /// `DATETIME`/`DATETIME2`, RFC3339 for `DATETIMEOFFSET`), so the wire
    /// value is carried as a string rather than a `DateTime` to avoid
    /// re-deriving driver-specific formatting in two places.
    DateTime(String),
    DateTimeOffset(DateTime<Utc>),
    Str(String),
}

impl Param {
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Param::NullBit | Param::NullInt | Param::NullFloat | Param::NullDateTime | Param::NullString
        )
    }
}
