//! Core data types for query results
//!
//! This module defines the tabular shape every backend response is decoded into:
//! - `TimeRange`: the `[from, to)` interval a query (or one chunk of it) covers
//! - `Frame`: an ordered list of typed columns plus execution metadata
//! - `Column` / `ColumnData`: one named column over a closed set of value types
//! - `Value`: a single cell, used for display and row inspection

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::{FrameError, FrameResult};

/// Time range for queries (half-open interval: [from, to))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    /// Start instant (inclusive)
    pub from: DateTime<Utc>,
    /// End instant (exclusive)
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Create a new time range
    ///
    /// # Panics
    /// Panics if from > to
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        assert!(from <= to, "TimeRange: from must not be after to");
        Self { from, to }
    }

    /// Create a time range, returning None if invalid
    pub fn try_new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        if from <= to {
            Some(Self { from, to })
        } else {
            None
        }
    }

    /// Create a time range from Unix millisecond timestamps
    pub fn from_millis(from_ms: i64, to_ms: i64) -> Option<Self> {
        let from = Utc.timestamp_millis_opt(from_ms).single()?;
        let to = Utc.timestamp_millis_opt(to_ms).single()?;
        Self::try_new(from, to)
    }

    /// Length of the range
    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    /// RFC 3339 literal for the start, as embedded into SQL
    pub fn from_literal(&self) -> String {
        self.from.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// RFC 3339 literal for the end, as embedded into SQL
    pub fn to_literal(&self) -> String {
        self.to.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format("%Y-%m-%d %H:%M"),
            self.to.format("%Y-%m-%d %H:%M")
        )
    }
}

/// The closed set of column types a frame can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    /// Millisecond-resolution instant
    Timestamp,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Int8 => "int8",
            ColumnType::Int16 => "int16",
            ColumnType::Int32 => "int32",
            ColumnType::Int64 => "int64",
            ColumnType::UInt8 => "uint8",
            ColumnType::UInt16 => "uint16",
            ColumnType::UInt32 => "uint32",
            ColumnType::UInt64 => "uint64",
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::String => "string",
            ColumnType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

/// Column storage, one variant per supported type.
///
/// Every variant stores `Option<T>` per row: a null cell is `None`, never a
/// zero value. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Bool(Vec<Option<bool>>),
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    #[serde(rename = "uint8")]
    UInt8(Vec<Option<u8>>),
    #[serde(rename = "uint16")]
    UInt16(Vec<Option<u16>>),
    #[serde(rename = "uint32")]
    UInt32(Vec<Option<u32>>),
    #[serde(rename = "uint64")]
    UInt64(Vec<Option<u64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Timestamp(Vec<Option<i64>>),
}

/// Runs `$body` against the inner vector of any variant.
macro_rules! visit_column {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($v) => $body,
            ColumnData::Int8($v) => $body,
            ColumnData::Int16($v) => $body,
            ColumnData::Int32($v) => $body,
            ColumnData::Int64($v) => $body,
            ColumnData::UInt8($v) => $body,
            ColumnData::UInt16($v) => $body,
            ColumnData::UInt32($v) => $body,
            ColumnData::UInt64($v) => $body,
            ColumnData::Float32($v) => $body,
            ColumnData::Float64($v) => $body,
            ColumnData::String($v) => $body,
            ColumnData::Timestamp($v) => $body,
        }
    };
}

/// Builds a column of the same variant from the inner vector of `$data`.
macro_rules! map_column {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($v) => ColumnData::Bool($body),
            ColumnData::Int8($v) => ColumnData::Int8($body),
            ColumnData::Int16($v) => ColumnData::Int16($body),
            ColumnData::Int32($v) => ColumnData::Int32($body),
            ColumnData::Int64($v) => ColumnData::Int64($body),
            ColumnData::UInt8($v) => ColumnData::UInt8($body),
            ColumnData::UInt16($v) => ColumnData::UInt16($body),
            ColumnData::UInt32($v) => ColumnData::UInt32($body),
            ColumnData::UInt64($v) => ColumnData::UInt64($body),
            ColumnData::Float32($v) => ColumnData::Float32($body),
            ColumnData::Float64($v) => ColumnData::Float64($body),
            ColumnData::String($v) => ColumnData::String($body),
            ColumnData::Timestamp($v) => ColumnData::Timestamp($body),
        }
    };
}

/// Runs `$body` when both columns hold the same variant, `$other` otherwise.
macro_rules! zip_column {
    ($a:expr, $b:expr, ($x:ident, $y:ident) => $body:expr, else $other:expr) => {
        match ($a, $b) {
            (ColumnData::Bool($x), ColumnData::Bool($y)) => $body,
            (ColumnData::Int8($x), ColumnData::Int8($y)) => $body,
            (ColumnData::Int16($x), ColumnData::Int16($y)) => $body,
            (ColumnData::Int32($x), ColumnData::Int32($y)) => $body,
            (ColumnData::Int64($x), ColumnData::Int64($y)) => $body,
            (ColumnData::UInt8($x), ColumnData::UInt8($y)) => $body,
            (ColumnData::UInt16($x), ColumnData::UInt16($y)) => $body,
            (ColumnData::UInt32($x), ColumnData::UInt32($y)) => $body,
            (ColumnData::UInt64($x), ColumnData::UInt64($y)) => $body,
            (ColumnData::Float32($x), ColumnData::Float32($y)) => $body,
            (ColumnData::Float64($x), ColumnData::Float64($y)) => $body,
            (ColumnData::String($x), ColumnData::String($y)) => $body,
            (ColumnData::Timestamp($x), ColumnData::Timestamp($y)) => $body,
            _ => $other,
        }
    };
}

fn take_rows<T: Clone>(values: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
    indices
        .iter()
        .map(|&i| values.get(i).cloned().flatten())
        .collect()
}

fn gather_rows<T: Clone>(values: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
    indices
        .iter()
        .map(|slot| slot.and_then(|i| values.get(i).cloned().flatten()))
        .collect()
}

impl ColumnData {
    /// Create an empty column of the given type
    pub fn new(column_type: ColumnType) -> Self {
        Self::with_capacity(column_type, 0)
    }

    /// Create an empty column with room for `capacity` rows
    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Bool => ColumnData::Bool(Vec::with_capacity(capacity)),
            ColumnType::Int8 => ColumnData::Int8(Vec::with_capacity(capacity)),
            ColumnType::Int16 => ColumnData::Int16(Vec::with_capacity(capacity)),
            ColumnType::Int32 => ColumnData::Int32(Vec::with_capacity(capacity)),
            ColumnType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            ColumnType::UInt8 => ColumnData::UInt8(Vec::with_capacity(capacity)),
            ColumnType::UInt16 => ColumnData::UInt16(Vec::with_capacity(capacity)),
            ColumnType::UInt32 => ColumnData::UInt32(Vec::with_capacity(capacity)),
            ColumnType::UInt64 => ColumnData::UInt64(Vec::with_capacity(capacity)),
            ColumnType::Float32 => ColumnData::Float32(Vec::with_capacity(capacity)),
            ColumnType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            ColumnType::String => ColumnData::String(Vec::with_capacity(capacity)),
            ColumnType::Timestamp => ColumnData::Timestamp(Vec::with_capacity(capacity)),
        }
    }

    /// Type tag of this column
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Bool(_) => ColumnType::Bool,
            ColumnData::Int8(_) => ColumnType::Int8,
            ColumnData::Int16(_) => ColumnType::Int16,
            ColumnData::Int32(_) => ColumnType::Int32,
            ColumnData::Int64(_) => ColumnType::Int64,
            ColumnData::UInt8(_) => ColumnType::UInt8,
            ColumnData::UInt16(_) => ColumnType::UInt16,
            ColumnData::UInt32(_) => ColumnType::UInt32,
            ColumnData::UInt64(_) => ColumnType::UInt64,
            ColumnData::Float32(_) => ColumnType::Float32,
            ColumnData::Float64(_) => ColumnType::Float64,
            ColumnData::String(_) => ColumnType::String,
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        visit_column!(self, v => v.len())
    }

    /// Check if the column has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve room for `additional` rows
    pub fn reserve(&mut self, additional: usize) {
        visit_column!(self, v => v.reserve(additional))
    }

    /// Append a null cell
    pub fn push_null(&mut self) {
        visit_column!(self, v => v.push(None))
    }

    /// Check whether the cell at `row` is null (out of range counts as null)
    pub fn is_null(&self, row: usize) -> bool {
        visit_column!(self, v => v.get(row).map(|c| c.is_none()).unwrap_or(true))
    }

    /// Move all rows of `other` onto the end of this column.
    ///
    /// Fails without modifying either column when the types differ.
    pub fn append(&mut self, other: ColumnData) -> FrameResult<()> {
        let expected = self.column_type();
        let found = other.column_type();
        zip_column!(self, other, (dst, src) => {
            let mut src = src;
            dst.append(&mut src);
            Ok(())
        }, else Err(FrameError::TypeMismatch { expected, found }))
    }

    /// New column holding the rows at `indices`, in that order
    pub fn take(&self, indices: &[usize]) -> ColumnData {
        map_column!(self, v => take_rows(v, indices))
    }

    /// New column where each slot either copies a source row or is null
    pub fn gather(&self, indices: &[Option<usize>]) -> ColumnData {
        map_column!(self, v => gather_rows(v, indices))
    }

    /// Timestamp values, if this is a timestamp column
    pub fn timestamps(&self) -> Option<&[Option<i64>]> {
        match self {
            ColumnData::Timestamp(v) => Some(v),
            _ => None,
        }
    }

    /// String values, if this is a string column
    pub fn strings(&self) -> Option<&[Option<String>]> {
        match self {
            ColumnData::String(v) => Some(v),
            _ => None,
        }
    }

    /// Cell at `row` as a loosely typed value
    pub fn value(&self, row: usize) -> Value {
        match self {
            ColumnData::Bool(v) => cell(v, row, Value::Bool),
            ColumnData::Int8(v) => cell(v, row, |x| Value::Int(x as i64)),
            ColumnData::Int16(v) => cell(v, row, |x| Value::Int(x as i64)),
            ColumnData::Int32(v) => cell(v, row, |x| Value::Int(x as i64)),
            ColumnData::Int64(v) => cell(v, row, Value::Int),
            ColumnData::UInt8(v) => cell(v, row, |x| Value::UInt(x as u64)),
            ColumnData::UInt16(v) => cell(v, row, |x| Value::UInt(x as u64)),
            ColumnData::UInt32(v) => cell(v, row, |x| Value::UInt(x as u64)),
            ColumnData::UInt64(v) => cell(v, row, Value::UInt),
            ColumnData::Float32(v) => cell(v, row, |x| Value::Float(x as f64)),
            ColumnData::Float64(v) => cell(v, row, Value::Float),
            ColumnData::String(v) => match v.get(row) {
                Some(Some(s)) => Value::String(s.clone()),
                _ => Value::Null,
            },
            ColumnData::Timestamp(v) => cell(v, row, Value::Timestamp),
        }
    }
}

fn cell<T: Copy>(values: &[Option<T>], row: usize, f: impl FnOnce(T) -> Value) -> Value {
    match values.get(row) {
        Some(Some(x)) => f(*x),
        _ => Value::Null,
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Unix milliseconds
    Timestamp(i64),
}

impl Value {
    /// Check for a null cell
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}", u),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(ms) => match Utc.timestamp_millis_opt(*ms).single() {
                Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
                None => write!(f, "{}", ms),
            },
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    /// Column name as returned by the backend
    pub name: String,
    /// Series labels (set by the long-to-wide pivot)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Whether the backend declared the column nullable
    pub nullable: bool,
    #[serde(flatten)]
    pub data: ColumnData,
}

impl Column {
    /// Create an empty column
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            nullable,
            data: ColumnData::new(column_type),
        }
    }

    /// Create a nullable column from existing data
    pub fn from_data(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            nullable: true,
            data,
        }
    }

    #[cfg(test)]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Type tag of this column
    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the column has no rows
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Name including labels, e.g. `value {host=a, region=eu}`
    pub fn display_name(&self) -> String {
        if self.labels.is_empty() {
            return self.name.clone();
        }
        let labels: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{} {{{}}}", self.name, labels.join(", "))
    }
}

/// Shape of a frame as seen by the charting host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameFormat {
    Table,
    TimeSeriesWide,
    TimeSeriesLong,
    #[default]
    Unknown,
}

/// Visualization hint for the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visualization {
    Table,
    Graph,
}

/// Execution metadata carried alongside the data
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameMeta {
    /// Frame shape
    pub format: FrameFormat,
    /// SQL that produced this frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_visualization: Option<Visualization>,
    /// Free-form metrics (timings, chunk counts)
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// An ordered list of named, typed columns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    pub ref_id: String,
    pub columns: Vec<Column>,
    pub meta: FrameMeta,
}

impl Frame {
    /// Create an empty frame
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a frame from columns
    pub fn with_columns(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Default::default()
        }
    }

    /// Number of rows (length of the first column)
    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of rows, checking that every column agrees
    pub fn row_len(&self) -> FrameResult<usize> {
        let expected = self.rows();
        for column in &self.columns {
            if column.len() != expected {
                return Err(FrameError::RowCountMismatch {
                    column: column.name.clone(),
                    expected,
                    found: column.len(),
                });
            }
        }
        Ok(expected)
    }

    /// Check if the frame has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column types in order
    pub fn schema(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.column_type()).collect()
    }

    /// Index of the first timestamp column
    pub fn time_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.column_type() == ColumnType::Timestamp)
    }

    /// Cell at (`column`, `row`)
    pub fn value(&self, column: usize, row: usize) -> Value {
        self.columns
            .get(column)
            .map(|c| c.data.value(row))
            .unwrap_or(Value::Null)
    }

    /// New frame holding the rows at `indices`, in that order
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            name: self.name.clone(),
            ref_id: self.ref_id.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    labels: c.labels.clone(),
                    nullable: c.nullable,
                    data: c.data.take(indices),
                })
                .collect(),
            meta: self.meta.clone(),
        }
    }
}
