use chrono::{DateTime, TimeZone as _, Utc};
use chrono_tz::Tz;
use connection::Param;

use common::err::{CResult, DatalayerError};
use common::time_util::parse_flexible_timestamp;

use crate::config::FieldMapping;
use crate::entity::PropValue;
use crate::fmt_util::strip_precision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataTypeClass {
    Bit,
    IntFamily,
    BigInt,
    FloatFamily,
    DateTime,
    DateTimeOffset,
    StringFamily,
}

fn classify(data_type: &str) -> DataTypeClass {
    match strip_precision(data_type) {
        "BIT" => DataTypeClass::Bit,
        "INT" | "SMALLINT" | "TINYINT" | "INTEGER" => DataTypeClass::IntFamily,
        "BIGINT" => DataTypeClass::BigInt,
        "FLOAT" | "DECIMAL" | "NUMERIC" => DataTypeClass::FloatFamily,
        "DATETIME" | "DATETIME2" => DataTypeClass::DateTime,
        "DATETIMEOFFSET" => DataTypeClass::DateTimeOffset,
        _ => DataTypeClass::StringFamily,
    }
}

/// Coerces one posted property value into a driver [`Param`] for
/// `field`. Returns `Ok(None)` when the value is null and
/// `null_empty_column_values` is false, meaning the column must be
/// omitted from the statement entirely rather than bound as a typed
/// null (the caller's parameterized query is responsible for tolerating
/// the resulting variable arity).
pub fn coerce_field(
    field: &FieldMapping,
    value: Option<&PropValue>,
    null_empty_column_values: bool,
    time_zone: Option<&str>,
) -> CResult<Option<Param>> {
    let class = classify(&field.data_type);
    let is_null = value.map(PropValue::is_null).unwrap_or(true);

    if is_null {
        if !null_empty_column_values {
            return Ok(None);
        }
        return Ok(Some(match class {
            DataTypeClass::Bit => Param::NullBit,
            DataTypeClass::IntFamily | DataTypeClass::BigInt => Param::NullInt,
            // historically this returned a nullable bool for FLOAT/DECIMAL/NUMERIC;
            // that was a bug, corrected here to a nullable float.
            DataTypeClass::FloatFamily => Param::NullFloat,
            DataTypeClass::DateTime | DataTypeClass::DateTimeOffset => Param::NullDateTime,
            DataTypeClass::StringFamily => Param::NullString,
        }));
    }

    let value = value.unwrap();
    Ok(Some(match class {
        DataTypeClass::Bit => Param::Bit(truthy(value)),
        DataTypeClass::IntFamily | DataTypeClass::BigInt => Param::Int(as_i64_floor(value)?),
        DataTypeClass::FloatFamily => Param::Float(as_f64(value)?),
        DataTypeClass::DateTime => Param::DateTime(as_local_datetime(value, time_zone)?),
        DataTypeClass::DateTimeOffset => Param::DateTimeOffset(as_utc_datetime(value)?),
        DataTypeClass::StringFamily => Param::Str(as_string(value)),
    }))
}

fn truthy(v: &PropValue) -> bool {
    match v {
        PropValue::Bool(b) => *b,
        PropValue::Int(i) => *i != 0,
        PropValue::Float(f) => *f != 0.0,
        PropValue::Str(s) => s == "true" || s == "1",
        PropValue::Null => false,
    }
}

fn as_i64_floor(v: &PropValue) -> CResult<i64> {
    match v {
        PropValue::Int(i) => Ok(*i),
        PropValue::Float(f) => Ok(f.floor() as i64),
        PropValue::Str(s) => s
            .parse::<f64>()
            .map(|f| f.floor() as i64)
            .map_err(|_| DatalayerError::WriteFailed(format!("cannot coerce {s:?} to an integer"))),
        PropValue::Bool(b) => Ok(*b as i64),
        PropValue::Null => Ok(0),
    }
}

fn as_f64(v: &PropValue) -> CResult<f64> {
    match v {
        PropValue::Float(f) => Ok(*f),
        PropValue::Int(i) => Ok(*i as f64),
        PropValue::Str(s) => s
            .parse::<f64>()
            .map_err(|_| DatalayerError::WriteFailed(format!("cannot coerce {s:?} to a float"))),
        PropValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        PropValue::Null => Ok(0.0),
    }
}

fn as_string(v: &PropValue) -> String {
    match v {
        PropValue::Str(s) => s.clone(),
        PropValue::Int(i) => i.to_string(),
        PropValue::Float(f) => f.to_string(),
        PropValue::Bool(b) => b.to_string(),
        PropValue::Null => String::new(),
    }
}

fn as_utc_datetime(v: &PropValue) -> CResult<DateTime<Utc>> {
    let s = v
        .as_str()
        .ok_or_else(|| DatalayerError::WriteFailed("expected a timestamp string".into()))?;
    parse_flexible_timestamp(s).ok_or_else(|| DatalayerError::WriteFailed(format!("unparseable timestamp: {s}")))
}

/// Formats as `2006-01-02T15:04:05` in `time_zone` (else UTC), the wire
/// shape `DATETIME`/`DATETIME2` parameters are sent as.
fn as_local_datetime(v: &PropValue, time_zone: Option<&str>) -> CResult<String> {
    let instant = as_utc_datetime(v)?;
    let tz: Tz = match time_zone {
        None | Some("") => Tz::UTC,
        Some(n) => n
            .parse()
            .map_err(|_| DatalayerError::InvalidConfig(format!("unknown time zone: {n}")))?,
    };
    let zoned = tz.from_utc_datetime(&instant.naive_utc());
    Ok(zoned.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Resolves `field.resolve_namespace` values: a posted `"ns0:Name"`
/// property expands to `<namespace-context["ns0"]>Name`. Non-string
/// values and aliases absent from the context pass through unchanged.
pub fn resolve_namespace(value: PropValue, namespaces: &std::collections::HashMap<String, String>) -> PropValue {
    match value {
        PropValue::Str(s) => match s.split_once(':') {
            Some((alias, rest)) if namespaces.contains_key(alias) => {
                PropValue::Str(format!("{}{}", namespaces[alias], rest))
            }
            _ => PropValue::Str(s),
        },
        other => other,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn field(data_type: &str) -> FieldMapping {
        FieldMapping {
            field_name: "f".into(),
            sort_order: 0,
            resolve_namespace: false,
            data_type: data_type.into(),
        }
    }

    #[test]
    fn null_skips_column_when_not_forced() {
        let f = field("INT");
        assert_eq!(coerce_field(&f, None, false, None).unwrap(), None);
    }

    #[test]
    fn null_becomes_typed_null_when_forced() {
        let f = field("INT");
        assert_eq!(coerce_field(&f, None, true, None).unwrap(), Some(Param::NullInt));
    }

    #[test]
    fn float_null_is_nullable_float_not_nullable_bool() {
        let f = field("FLOAT");
        assert_eq!(coerce_field(&f, None, true, None).unwrap(), Some(Param::NullFloat));
    }

    #[test]
    fn int_floors_a_float_value() {
        let f = field("INT");
        let v = PropValue::Float(3.9);
        assert_eq!(coerce_field(&f, Some(&v), false, None).unwrap(), Some(Param::Int(3)));
    }

    #[test]
    fn strips_precision_before_dispatch() {
        let f = field("VARCHAR(255)");
        let v = PropValue::Str("hi".into());
        assert_eq!(coerce_field(&f, Some(&v), false, None).unwrap(), Some(Param::Str("hi".into())));
    }

    #[test]
    fn resolves_namespace_alias() {
        let mut ns = HashMap::new();
        ns.insert("ns0".to_string(), "http://data.test.io/test/".to_string());
        let resolved = resolve_namespace(PropValue::Str("ns0:Name".into()), &ns);
        assert_eq!(resolved, PropValue::Str("http://data.test.io/test/Name".into()));
    }
}
