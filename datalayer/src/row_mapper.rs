use chrono::{DateTime, TimeZone as _, Utc};
use chrono_tz::Tz;

use common::err::{CResult, DatalayerError};
use common::time_util::parse_flexible_timestamp;
use connection::{ColumnTypeClass, Row, SqlValue};

use crate::config::TableMapping;
use crate::entity::{Entity, PropValue, RefValue};
use crate::fmt_util::format_one;

const OPERATION_COLUMN: &str = "__$operation";
const OPERATION_DELETE: i64 = 1;

/// Maps one driver row to an [`Entity`] per `table`'s column rules.
/// `base_uri` and `default_time_zone` come from the owning
/// [`crate::config::Datalayer`].
pub fn map_row(
    row: &Row,
    table: &TableMapping,
    base_uri: &str,
    default_time_zone: Option<&str>,
) -> CResult<Entity> {
    let mut entity = Entity::default();
    let tz = resolve_time_zone(table.time_zone.as_deref().or(default_time_zone))?;

    for (col, value) in row.iter() {
        if col.name == OPERATION_COLUMN {
            if let Some(op) = value.as_i64() {
                if op == OPERATION_DELETE {
                    entity.is_deleted = true;
                }
            }
        }

        let mapping = table.columns.get(&col.name);
        if let Some(m) = mapping {
            if m.ignore_column {
                continue;
            }
        } else if table.cdc_enabled && col.name.starts_with("__$") {
            continue;
        }

        let property_name = mapping
            .map(|m| m.effective_property_name())
            .unwrap_or_else(|| format!("ns0:{}", col.name));

        let class = ColumnTypeClass::classify(&col.database_type_name);
        let (prop_value, str_form) = decode_cell(value, class, tz)?;
        entity.set_property(property_name.clone(), prop_value);

        if let Some(m) = mapping {
            if let Some(s) = str_form.as_deref().filter(|s| !s.is_empty()) {
                if m.is_id_column {
                    entity.id = format!("{}{}", base_uri, format_one(&table.entity_id_constructor, s));
                }
                if m.is_reference {
                    let tmpl = m.reference_template.as_deref().unwrap_or("");
                    entity
                        .references
                        .insert(property_name, RefValue::One(format_one(tmpl, s)));
                }
            }
        }
    }

    if entity.id.is_empty() {
        return Err(DatalayerError::EmptyId);
    }

    match table.types.len() {
        0 => {}
        1 => {
            entity
                .references
                .insert("rdf:type".to_string(), RefValue::One(table.types[0].clone()));
        }
        _ => {
            entity
                .references
                .insert("rdf:type".to_string(), RefValue::Many(table.types.clone()));
        }
    }

    Ok(entity)
}

fn resolve_time_zone(name: Option<&str>) -> CResult<Tz> {
    match name {
        None | Some("") => Ok(Tz::UTC),
        Some(n) => n
            .parse::<Tz>()
            .map_err(|_| DatalayerError::InvalidConfig(format!("unknown time zone: {n}"))),
    }
}

/// Decodes one cell into a property value plus, where the value has a
/// natural string form, that string (used for id/reference templating).
fn decode_cell(value: &SqlValue, class: ColumnTypeClass, tz: Tz) -> CResult<(PropValue, Option<String>)> {
    Ok(match class {
        ColumnTypeClass::StringFamily => match value.as_str() {
            Some(s) => (PropValue::Str(s.to_string()), Some(s.to_string())),
            None => (PropValue::Null, None),
        },
        ColumnTypeClass::UniqueIdentifier => match value.as_bytes() {
            Some(bytes) if bytes.len() == 16 => {
                let canonical = format_guid(bytes);
                (PropValue::Str(canonical.clone()), Some(canonical))
            }
            _ => (PropValue::Null, None),
        },
        ColumnTypeClass::TimeFamily => match value.as_str() {
            Some(s) if !s.is_empty() => {
                let instant = parse_flexible_timestamp(s)
                    .ok_or_else(|| DatalayerError::RowIterError(format!("unparseable timestamp: {s}")))?;
                let zoned = zoned_rfc3339(instant, tz);
                (PropValue::Str(zoned.clone()), Some(zoned))
            }
            _ => (PropValue::Null, None),
        },
        ColumnTypeClass::IntFamily => match value.as_i64() {
            Some(i) => (PropValue::Int(i), Some(i.to_string())),
            None => (PropValue::Null, None),
        },
        ColumnTypeClass::BigInt => match value.as_bytes() {
            Some(bytes) => {
                let ascii = std::str::from_utf8(bytes)
                    .map_err(|_| DatalayerError::RowIterError("BIGINT bytes are not ASCII".into()))?;
                let i: i64 = ascii
                    .parse()
                    .map_err(|_| DatalayerError::RowIterError(format!("unparseable BIGINT: {ascii}")))?;
                (PropValue::Int(i), Some(i.to_string()))
            }
            None => (PropValue::Null, None),
        },
        ColumnTypeClass::FloatFamily => match value.as_f64() {
            Some(f) => (PropValue::Float(f), None),
            None => (PropValue::Null, None),
        },
        ColumnTypeClass::Bit => match value.as_bool() {
            Some(b) => (PropValue::Bool(b), None),
            None => (PropValue::Bool(false), None),
        },
        ColumnTypeClass::Raw => {
            tracing::warn!("unrecognized column type, leaving property null");
            (PropValue::Null, None)
        }
    })
}

fn zoned_rfc3339(instant: DateTime<Utc>, tz: Tz) -> String {
    tz.from_utc_datetime(&instant.naive_utc()).to_rfc3339()
}

/// Formats a 16-byte `UNIQUEIDENTIFIER` payload as canonical
/// `8-4-4-4-12` hex, matching `uuid.FromBytes` on the big-endian byte
/// order the driver reports.
fn format_guid(bytes: &[u8]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}
