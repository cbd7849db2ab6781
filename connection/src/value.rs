/// A single decoded cell, normalized into a sum type before any
/// table-specific mapping is applied. Decode once into this sum, then
/// re-dispatch per target column; the write side mirrors the same shape
/// in `datalayer::writeback::coerce`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw bytes for types the driver doesn't natively decode further
    /// (`UNIQUEIDENTIFIER`, `BIGINT` arriving as ASCII digits, and any
    /// unrecognized database type).
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

/// Column-type classes the row mapper dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTypeClass {
    IntFamily,
    StringFamily,
    TimeFamily,
    FloatFamily,
    Bit,
    BigInt,
    UniqueIdentifier,
    /// Anything not in one of the named families; the row mapper records
    /// a warning and skips it.
    Raw,
}

impl ColumnTypeClass {
    /// Classifies a driver-reported database type name into the family
    /// the row mapper needs to decode it.
    pub fn classify(database_type_name: &str) -> Self {
        match database_type_name {
            "INT" | "SMALLINT" | "TINYINT" => ColumnTypeClass::IntFamily,
            "BIGINT" => ColumnTypeClass::BigInt,
            "VARCHAR" | "NVARCHAR" | "TEXT" | "NTEXT" | "CHAR" => ColumnTypeClass::StringFamily,
            "DATETIME" | "DATE" | "DATETIME2" => ColumnTypeClass::TimeFamily,
            "MONEY" | "DECIMAL" | "FLOAT" => ColumnTypeClass::FloatFamily,
            "BIT" => ColumnTypeClass::Bit,
            "UNIQUEIDENTIFIER" => ColumnTypeClass::UniqueIdentifier,
            _ => ColumnTypeClass::Raw,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_known_families() {
        assert_eq!(ColumnTypeClass::classify("INT"), ColumnTypeClass::IntFamily);
        assert_eq!(ColumnTypeClass::classify("TINYINT"), ColumnTypeClass::IntFamily);
        assert_eq!(ColumnTypeClass::classify("BIGINT"), ColumnTypeClass::BigInt);
        assert_eq!(ColumnTypeClass::classify("NVARCHAR"), ColumnTypeClass::StringFamily);
        assert_eq!(ColumnTypeClass::classify("DATETIME2"), ColumnTypeClass::TimeFamily);
        assert_eq!(ColumnTypeClass::classify("MONEY"), ColumnTypeClass::FloatFamily);
        assert_eq!(ColumnTypeClass::classify("BIT"), ColumnTypeClass::Bit);
        assert_eq!(
            ColumnTypeClass::classify("UNIQUEIDENTIFIER"),
            ColumnTypeClass::UniqueIdentifier
        );
        assert_eq!(ColumnTypeClass::classify("XML"), ColumnTypeClass::Raw);
    }
}
