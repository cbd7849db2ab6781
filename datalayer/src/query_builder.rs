use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::config::TableMapping;
use crate::token::decode_timestamp;

const SINCE_TEMPLATE: &str = "{{ since }}";

/// One dataset read request: which table, the caller's continuation
/// token (empty for a first read), and an optional row cap.
#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub dataset_name: String,
    pub since: String,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Full,
    CustomSince,
    Cdc,
}

/// Chooses a query strategy: `CustomSince` iff the table's custom query
/// contains the literal `{{ since }}` template; else `Cdc` iff CDC is
/// enabled and the caller supplied a non-empty `since`; else `Full`.
pub fn dispatch(table: &TableMapping, since: &str) -> QueryKind {
    let has_since_template = table
        .custom_query
        .as_deref()
        .map(|q| q.contains(SINCE_TEMPLATE))
        .unwrap_or(false);
    if has_since_template {
        QueryKind::CustomSince
    } else if table.cdc_enabled && !since.is_empty() {
        QueryKind::Cdc
    } else {
        QueryKind::Full
    }
}

/// Builds the statement text for `request` against `table`, whose
/// effective schema (table override or layer default) is `schema`. CDC
/// queries ignore `schema` and resolve their own (table override or
/// `dbo`) via [`cdc_schema`], since a CDC capture instance's schema is
/// independent of where the layer otherwise reads the table from.
pub fn build(table: &TableMapping, schema: &str, request: &DatasetRequest) -> String {
    match dispatch(table, &request.since) {
        QueryKind::Full => build_full(table, schema, request.limit),
        QueryKind::CustomSince => build_custom_since(table, &request.since),
        QueryKind::Cdc => build_cdc(table, &request.since),
    }
}

fn build_full(table: &TableMapping, schema: &str, limit: i64) -> String {
    match table.custom_query.as_deref() {
        Some(cq) if !cq.is_empty() => {
            let top = if limit > 0 { format!(" TOP {limit} ") } else { String::new() };
            cq.replacen("%s", &top, 1)
        }
        _ => {
            let top = if limit > 0 { format!("TOP {limit}") } else { String::new() };
            format!("SELECT {top} * FROM [{}].[{}]", schema, table.table_name)
        }
    }
}

fn build_custom_since(table: &TableMapping, since: &str) -> String {
    let instant = if since.is_empty() {
        None
    } else {
        decode_timestamp(since)
    };
    let instant = instant.unwrap_or_else(epoch);
    let literal = datetime_from_parts(&instant);
    let cq = table.custom_query.as_deref().unwrap_or("");
    cq.replacen(SINCE_TEMPLATE, &literal, 1)
}

/// CDC function/object names are schema-qualified using the table's own
/// connection override, never the layer-wide default schema: a layer
/// default of e.g. `sales` must not leak into `cdc.fn_cdc_get_all_changes_*`
/// for a table whose CDC capture instance was created under `dbo`.
fn cdc_schema(table: &TableMapping) -> &str {
    table
        .connection
        .as_ref()
        .and_then(|c| c.schema.as_deref())
        .unwrap_or("dbo")
}

fn build_cdc(table: &TableMapping, since: &str) -> String {
    let schema = cdc_schema(table);
    let lsn_literal = cdc_lsn_literal(since, schema, &table.table_name);
    format!(
        "DECLARE @from_lsn binary(10), @to_lsn binary(10), @last_lsn binary(10);\n\
         SET @last_lsn = {lsn_literal};\n\
         SET @from_lsn = sys.fn_cdc_increment_lsn(@last_lsn);\n\
         SET @to_lsn   = sys.fn_cdc_get_max_lsn();\n\
         SELECT * FROM cdc.fn_cdc_get_all_changes_{schema}_{table}(@from_lsn, @to_lsn, 'all');",
        table = table.table_name,
    )
}

fn cdc_lsn_literal(since: &str, schema: &str, table: &str) -> String {
    if let Some(ascii) = decode_cdc_ascii(since) {
        format!("CONVERT(binary(10), {ascii})")
    } else {
        format!("sys.fn_cdc_get_min_lsn('{schema}_{table}')")
    }
}

fn decode_cdc_ascii(since: &str) -> Option<String> {
    let raw = URL_SAFE_NO_PAD.decode(since).ok()?;
    let text = String::from_utf8(raw).ok()?;
    if text.len() == 22 && text.starts_with("0x") {
        Some(text)
    } else {
        None
    }
}

fn epoch() -> DateTime<Utc> {
    chrono::Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
}

fn datetime_from_parts(dt: &DateTime<Utc>) -> String {
    format!(
        "DATETIMEFROMPARTS( {}, {}, {}, {}, {}, {}, {})",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.timestamp_subsec_millis()
    )
}
