//! JSON Response Decoder
//!
//! Decodes the row-oriented JSON body:
//!
//! ```text
//! { "columns": ["time", "host", "value"],
//!   "data":    [["2026-02-18T10:00:00Z", "a", 1.5], ...] }
//! ```
//!
//! Column types are inferred from the first non-null cell of each column.
//! Every later cell is coerced to that type; a cell that cannot be coerced
//! becomes null.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value as Json;

use super::error::{DecodeError, DecodeResult};
use crate::frame::{Column, ColumnData, ColumnType, Frame};

/// Column names always treated as timestamps when they hold strings
const TIME_COLUMN_NAMES: &[&str] = &["time", "timestamp", "_time"];

/// Numeric timestamps above this are milliseconds, otherwise seconds
const MILLISECOND_THRESHOLD: f64 = 1e12;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a string timestamp to Unix milliseconds.
///
/// Accepts RFC 3339 and zone-less ISO-like forms, which are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    NAIVE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(s, format)
            .ok()
            .map(|naive| naive.and_utc().timestamp_millis())
    })
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn numeric_timestamp(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(if i as f64 > MILLISECOND_THRESHOLD {
            i
        } else {
            i.saturating_mul(1_000)
        });
    }
    let f = n.as_f64()?;
    let ms = if f > MILLISECOND_THRESHOLD { f } else { f * 1_000.0 };
    Some(ms as i64)
}

fn infer_type(name: &str, first: Option<&Json>) -> ColumnType {
    match first {
        Some(Json::Number(_)) => ColumnType::Float64,
        Some(Json::Bool(_)) => ColumnType::Bool,
        Some(Json::String(s)) => {
            if TIME_COLUMN_NAMES.contains(&name) || parse_timestamp(s).is_some() {
                ColumnType::Timestamp
            } else {
                ColumnType::String
            }
        }
        // Nested values and all-null columns are shown as text
        _ => ColumnType::String,
    }
}

fn push_cell(data: &mut ColumnData, name: &str, cell: &Json) {
    match (data, cell) {
        (data, Json::Null) => data.push_null(),
        (ColumnData::Float64(v), Json::Number(n)) => v.push(n.as_f64()),
        (ColumnData::Float64(v), Json::String(s)) => v.push(s.trim().parse::<f64>().ok()),
        (ColumnData::Bool(v), Json::Bool(b)) => v.push(Some(*b)),
        (ColumnData::Timestamp(v), Json::String(s)) => {
            let parsed = parse_timestamp(s);
            if parsed.is_none() {
                tracing::warn!(column = %name, value = %s, "Unparseable timestamp, using null");
            }
            v.push(parsed);
        }
        (ColumnData::Timestamp(v), Json::Number(n)) => v.push(numeric_timestamp(n)),
        (ColumnData::String(v), Json::String(s)) => v.push(Some(s.clone())),
        (ColumnData::String(v), other) => v.push(Some(other.to_string())),
        (data, other) => {
            tracing::debug!(
                column = %name,
                column_type = %data.column_type(),
                found = json_kind(other),
                "Cell does not match column type, using null"
            );
            data.push_null();
        }
    }
}

/// Decode a JSON response body into a frame
pub fn decode_json(body: &[u8]) -> DecodeResult<Frame> {
    let doc: Json = serde_json::from_slice(body)?;
    decode_json_value(&doc)
}

/// Decode an already-parsed JSON response into a frame
pub fn decode_json_value(doc: &Json) -> DecodeResult<Frame> {
    let columns = doc.get("columns").ok_or(DecodeError::MissingField("columns"))?;
    let columns = columns.as_array().ok_or_else(|| DecodeError::InvalidShape {
        field: "columns".to_string(),
        expected: "array of strings".to_string(),
        found: json_kind(columns).to_string(),
    })?;

    let names = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            c.as_str().map(str::to_string).ok_or_else(|| DecodeError::InvalidShape {
                field: format!("columns[{}]", i),
                expected: "string".to_string(),
                found: json_kind(c).to_string(),
            })
        })
        .collect::<DecodeResult<Vec<String>>>()?;

    let data = doc.get("data").ok_or(DecodeError::MissingField("data"))?;
    let data = data.as_array().ok_or_else(|| DecodeError::InvalidShape {
        field: "data".to_string(),
        expected: "array of rows".to_string(),
        found: json_kind(data).to_string(),
    })?;

    tracing::debug!(columns = names.len(), rows = data.len(), "Decoding JSON response");

    if data.is_empty() {
        return Ok(Frame::new(""));
    }

    let rows = data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let cells = row.as_array().ok_or_else(|| DecodeError::InvalidShape {
                field: format!("data[{}]", i),
                expected: "array".to_string(),
                found: json_kind(row).to_string(),
            })?;
            if cells.len() != names.len() {
                return Err(DecodeError::InvalidShape {
                    field: format!("data[{}]", i),
                    expected: format!("{} cells", names.len()),
                    found: format!("{} cells", cells.len()),
                });
            }
            Ok(cells.as_slice())
        })
        .collect::<DecodeResult<Vec<&[Json]>>>()?;

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let first = rows.iter().map(|r| &r[index]).find(|v| !v.is_null());
            let column_type = infer_type(&name, first);
            let mut data = ColumnData::with_capacity(column_type, rows.len());
            for row in &rows {
                push_cell(&mut data, &name, &row[index]);
            }
            Column::from_data(name, data)
        })
        .collect();

    Ok(Frame::with_columns("", columns))
}
