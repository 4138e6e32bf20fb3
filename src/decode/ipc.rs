//! Arrow IPC Stream Decoder
//!
//! Decodes the backend's columnar response progressively: bytes are pushed
//! as they arrive from the network, and each completed record batch is
//! appended to the frame immediately, so the body is never buffered whole.
//!
//! The frame schema comes from the first record batch. Each field is mapped
//! once to a [`FieldDecoder`], which then appends every later batch of that
//! column without re-inspecting its type per cell.

use arrow::array::{Array, AsArray};
use arrow::buffer::Buffer;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, DurationMicrosecondType, DurationMillisecondType,
    DurationNanosecondType, DurationSecondType, Field, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::ipc::reader::StreamDecoder;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};

use super::error::{DecodeError, DecodeResult};
use crate::frame::{Column, ColumnData, ColumnType, Frame};

/// Raw values below this are too small to be microseconds since the epoch
/// for any date after 1970-01-12, so they are taken to be seconds.
const MICROSECOND_PLAUSIBILITY_FLOOR: i64 = 1_000_000_000_000;

/// How one Arrow field is appended to its frame column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldDecoder {
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
    Utf8,
    LargeUtf8,
    Timestamp(TimeUnit),
    /// Durations keep their raw count as int64
    Duration(TimeUnit),
    /// Anything else is rendered to its string form
    Fallback,
}

impl FieldDecoder {
    fn for_field(field: &Field) -> Self {
        match field.data_type() {
            DataType::Boolean => FieldDecoder::Bool,
            DataType::Int8 => FieldDecoder::Int8,
            DataType::Int16 => FieldDecoder::Int16,
            DataType::Int32 => FieldDecoder::Int32,
            DataType::Int64 => FieldDecoder::Int64,
            DataType::UInt8 => FieldDecoder::UInt8,
            DataType::UInt16 => FieldDecoder::UInt16,
            DataType::UInt32 => FieldDecoder::UInt32,
            DataType::UInt64 => FieldDecoder::UInt64,
            DataType::Float32 => FieldDecoder::Float32,
            DataType::Float64 => FieldDecoder::Float64,
            DataType::Utf8 => FieldDecoder::Utf8,
            DataType::LargeUtf8 => FieldDecoder::LargeUtf8,
            DataType::Timestamp(unit, _) => FieldDecoder::Timestamp(*unit),
            DataType::Duration(unit) => FieldDecoder::Duration(*unit),
            _ => FieldDecoder::Fallback,
        }
    }

    fn column_type(&self) -> ColumnType {
        match self {
            FieldDecoder::Bool => ColumnType::Bool,
            FieldDecoder::Int8 => ColumnType::Int8,
            FieldDecoder::Int16 => ColumnType::Int16,
            FieldDecoder::Int32 => ColumnType::Int32,
            FieldDecoder::Int64 | FieldDecoder::Duration(_) => ColumnType::Int64,
            FieldDecoder::UInt8 => ColumnType::UInt8,
            FieldDecoder::UInt16 => ColumnType::UInt16,
            FieldDecoder::UInt32 => ColumnType::UInt32,
            FieldDecoder::UInt64 => ColumnType::UInt64,
            FieldDecoder::Float32 => ColumnType::Float32,
            FieldDecoder::Float64 => ColumnType::Float64,
            FieldDecoder::Utf8 | FieldDecoder::LargeUtf8 | FieldDecoder::Fallback => {
                ColumnType::String
            }
            FieldDecoder::Timestamp(_) => ColumnType::Timestamp,
        }
    }
}

fn array_type_error(field: &str, expected: &str, array: &dyn Array) -> DecodeError {
    DecodeError::ArrayType {
        field: field.to_string(),
        expected: expected.to_string(),
        found: array.data_type().to_string(),
    }
}

fn append_primitive<T: ArrowPrimitiveType>(
    dst: &mut Vec<Option<T::Native>>,
    array: &dyn Array,
    field: &str,
) -> DecodeResult<()> {
    let values = array
        .as_primitive_opt::<T>()
        .ok_or_else(|| array_type_error(field, &T::DATA_TYPE.to_string(), array))?;
    dst.extend(values.iter());
    Ok(())
}

/// Raw 64-bit counts of a timestamp or duration array
fn raw_values(array: &dyn Array, unit: TimeUnit, timestamp: bool) -> Option<Vec<Option<i64>>> {
    Some(match (timestamp, unit) {
        (true, TimeUnit::Second) => array.as_primitive_opt::<TimestampSecondType>()?.iter().collect(),
        (true, TimeUnit::Millisecond) => array
            .as_primitive_opt::<TimestampMillisecondType>()?
            .iter()
            .collect(),
        (true, TimeUnit::Microsecond) => array
            .as_primitive_opt::<TimestampMicrosecondType>()?
            .iter()
            .collect(),
        (true, TimeUnit::Nanosecond) => array
            .as_primitive_opt::<TimestampNanosecondType>()?
            .iter()
            .collect(),
        (false, TimeUnit::Second) => array.as_primitive_opt::<DurationSecondType>()?.iter().collect(),
        (false, TimeUnit::Millisecond) => array
            .as_primitive_opt::<DurationMillisecondType>()?
            .iter()
            .collect(),
        (false, TimeUnit::Microsecond) => array
            .as_primitive_opt::<DurationMicrosecondType>()?
            .iter()
            .collect(),
        (false, TimeUnit::Nanosecond) => array
            .as_primitive_opt::<DurationNanosecondType>()?
            .iter()
            .collect(),
    })
}

/// Unit to read a timestamp column in, given its first non-null raw value.
///
/// Works around a backend that labels second-resolution values as
/// microseconds.
pub fn effective_timestamp_unit(declared: TimeUnit, first_value: i64) -> TimeUnit {
    if declared == TimeUnit::Microsecond && first_value < MICROSECOND_PLAUSIBILITY_FLOOR {
        TimeUnit::Second
    } else {
        declared
    }
}

/// Convert a raw count in `unit` to Unix milliseconds
pub fn to_millis(raw: i64, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000),
        TimeUnit::Millisecond => raw,
        TimeUnit::Microsecond => raw.div_euclid(1_000),
        TimeUnit::Nanosecond => raw.div_euclid(1_000_000),
    }
}

/// Per-column decode state fixed by the first batch
struct ColumnState {
    decoder: FieldDecoder,
    /// Unit actually used for timestamps, settled by the first non-null value
    resolved_unit: Option<TimeUnit>,
}

/// Streaming decoder from Arrow IPC bytes to a [`Frame`]
pub struct ArrowFrameDecoder {
    stream: StreamDecoder,
    correct_timestamp_units: bool,
    frame: Option<Frame>,
    columns: Vec<ColumnState>,
    batches: usize,
}

impl ArrowFrameDecoder {
    /// Create a decoder. `correct_timestamp_units` enables the
    /// microseconds-that-are-really-seconds correction.
    pub fn new(correct_timestamp_units: bool) -> Self {
        Self {
            stream: StreamDecoder::new(),
            correct_timestamp_units,
            frame: None,
            columns: Vec::new(),
            batches: 0,
        }
    }

    /// Feed the next piece of the body
    pub fn push(&mut self, bytes: &[u8]) -> DecodeResult<()> {
        let mut buffer = Buffer::from_vec(bytes.to_vec());
        while !buffer.is_empty() {
            if let Some(batch) = self.stream.decode(&mut buffer)? {
                self.append_batch(&batch)?;
            }
        }
        Ok(())
    }

    /// Number of record batches decoded so far
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Finish the stream and return the frame.
    ///
    /// A stream with no record batches yields an empty frame.
    pub fn finish(mut self) -> DecodeResult<Frame> {
        self.stream
            .finish()
            .map_err(|e| DecodeError::TruncatedStream(e.to_string()))?;

        let frame = self.frame.unwrap_or_default();
        tracing::debug!(
            batches = self.batches,
            fields = frame.columns.len(),
            rows = frame.rows(),
            "Decoded Arrow stream"
        );
        Ok(frame)
    }

    fn init_schema(&mut self, batch: &RecordBatch) {
        let schema = batch.schema();
        let mut columns = Vec::with_capacity(schema.fields().len());

        for field in schema.fields() {
            let decoder = FieldDecoder::for_field(field);
            if decoder == FieldDecoder::Fallback {
                tracing::warn!(
                    field = %field.name(),
                    arrow_type = %field.data_type(),
                    "Unsupported Arrow type, using string"
                );
            }
            self.columns.push(ColumnState {
                decoder,
                resolved_unit: None,
            });
            columns.push(Column::new(
                field.name().clone(),
                decoder.column_type(),
                field.is_nullable(),
            ));
        }

        self.frame = Some(Frame::with_columns("", columns));
    }

    fn append_batch(&mut self, batch: &RecordBatch) -> DecodeResult<()> {
        if self.frame.is_none() {
            self.init_schema(batch);
        }
        let batch_index = self.batches;
        self.batches += 1;

        let correct = self.correct_timestamp_units;
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };

        if batch.num_columns() != self.columns.len() {
            return Err(DecodeError::BatchWidth {
                batch: batch_index,
                expected: self.columns.len(),
                found: batch.num_columns(),
            });
        }

        for ((column, state), array) in frame
            .columns
            .iter_mut()
            .zip(self.columns.iter_mut())
            .zip(batch.columns())
        {
            append_array(column, state, array.as_ref(), correct)?;
        }

        Ok(())
    }
}

/// Append one Arrow array to its frame column
fn append_array(
    column: &mut Column,
    state: &mut ColumnState,
    array: &dyn Array,
    correct_timestamp_units: bool,
) -> DecodeResult<()> {
    let name = column.name.as_str();

    match (state.decoder, &mut column.data) {
        (FieldDecoder::Bool, ColumnData::Bool(dst)) => {
            let values = array
                .as_boolean_opt()
                .ok_or_else(|| array_type_error(name, "Boolean", array))?;
            dst.extend(values.iter());
            Ok(())
        }
        (FieldDecoder::Int8, ColumnData::Int8(dst)) => append_primitive::<Int8Type>(dst, array, name),
        (FieldDecoder::Int16, ColumnData::Int16(dst)) => {
            append_primitive::<Int16Type>(dst, array, name)
        }
        (FieldDecoder::Int32, ColumnData::Int32(dst)) => {
            append_primitive::<Int32Type>(dst, array, name)
        }
        (FieldDecoder::Int64, ColumnData::Int64(dst)) => {
            append_primitive::<Int64Type>(dst, array, name)
        }
        (FieldDecoder::UInt8, ColumnData::UInt8(dst)) => {
            append_primitive::<UInt8Type>(dst, array, name)
        }
        (FieldDecoder::UInt16, ColumnData::UInt16(dst)) => {
            append_primitive::<UInt16Type>(dst, array, name)
        }
        (FieldDecoder::UInt32, ColumnData::UInt32(dst)) => {
            append_primitive::<UInt32Type>(dst, array, name)
        }
        (FieldDecoder::UInt64, ColumnData::UInt64(dst)) => {
            append_primitive::<UInt64Type>(dst, array, name)
        }
        (FieldDecoder::Float32, ColumnData::Float32(dst)) => {
            append_primitive::<Float32Type>(dst, array, name)
        }
        (FieldDecoder::Float64, ColumnData::Float64(dst)) => {
            append_primitive::<Float64Type>(dst, array, name)
        }
        (FieldDecoder::Utf8, ColumnData::String(dst)) => {
            let values = array
                .as_string_opt::<i32>()
                .ok_or_else(|| array_type_error(name, "Utf8", array))?;
            dst.extend(values.iter().map(|s| s.map(str::to_string)));
            Ok(())
        }
        (FieldDecoder::LargeUtf8, ColumnData::String(dst)) => {
            let values = array
                .as_string_opt::<i64>()
                .ok_or_else(|| array_type_error(name, "LargeUtf8", array))?;
            dst.extend(values.iter().map(|s| s.map(str::to_string)));
            Ok(())
        }
        (FieldDecoder::Timestamp(declared), ColumnData::Timestamp(dst)) => {
            let raw = raw_values(array, declared, true)
                .ok_or_else(|| array_type_error(name, "Timestamp", array))?;

            if state.resolved_unit.is_none() {
                if let Some(first) = raw.iter().flatten().next() {
                    let unit = if correct_timestamp_units {
                        effective_timestamp_unit(declared, *first)
                    } else {
                        declared
                    };
                    if unit != declared {
                        tracing::warn!(
                            field = %name,
                            first_value = *first,
                            declared = ?declared,
                            actual = ?unit,
                            "Timestamp values look like seconds but are labelled microseconds, converting"
                        );
                    }
                    state.resolved_unit = Some(unit);
                }
            }

            let unit = state.resolved_unit.unwrap_or(declared);
            dst.extend(raw.into_iter().map(|v| v.map(|raw| to_millis(raw, unit))));
            Ok(())
        }
        (FieldDecoder::Duration(unit), ColumnData::Int64(dst)) => {
            let raw = raw_values(array, unit, false)
                .ok_or_else(|| array_type_error(name, "Duration", array))?;
            dst.extend(raw);
            Ok(())
        }
        (FieldDecoder::Fallback, ColumnData::String(dst)) => {
            let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())?;
            dst.reserve(array.len());
            for i in 0..array.len() {
                if array.is_null(i) {
                    dst.push(None);
                } else {
                    dst.push(Some(formatter.value(i).to_string()));
                }
            }
            Ok(())
        }
        (decoder, data) => Err(DecodeError::ArrayType {
            field: name.to_string(),
            expected: data.column_type().to_string(),
            found: format!("{:?}", decoder),
        }),
    }
}

/// Decode a complete Arrow IPC stream held in memory
pub fn decode_arrow_stream(bytes: &[u8], correct_timestamp_units: bool) -> DecodeResult<Frame> {
    let mut decoder = ArrowFrameDecoder::new(correct_timestamp_units);
    decoder.push(bytes)?;
    decoder.finish()
}

/// Encode record batches as an Arrow IPC stream
#[cfg(test)]
pub(crate) fn encode_batches(batches: &[RecordBatch]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let schema = batches[0].schema();
        let mut writer =
            arrow::ipc::writer::StreamWriter::try_new(&mut out, schema.as_ref()).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
        }
        writer.finish().unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        ArrayRef, BooleanArray, Date32Array, DurationSecondArray, Float64Array, Int64Array,
        StringArray, TimestampMicrosecondArray, TimestampMillisecondArray, UInt8Array,
    };
    use arrow::datatypes::Schema;
    use std::sync::Arc;

    fn batch(schema: &Arc<Schema>, columns: Vec<ArrayRef>) -> RecordBatch {
        RecordBatch::try_new(Arc::clone(schema), columns).unwrap()
    }

    fn metrics_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("time", DataType::Timestamp(TimeUnit::Millisecond, None), false),
            Field::new("host", DataType::Utf8, true),
            Field::new("value", DataType::Float64, true),
        ]))
    }

    #[test]
    fn test_decode_multiple_batches() {
        let schema = metrics_schema();
        let first = batch(
            &schema,
            vec![
                Arc::new(TimestampMillisecondArray::from(vec![1_000, 2_000])),
                Arc::new(StringArray::from(vec![Some("a"), None])),
                Arc::new(Float64Array::from(vec![Some(1.5), None])),
            ],
        );
        let second = batch(
            &schema,
            vec![
                Arc::new(TimestampMillisecondArray::from(vec![3_000])),
                Arc::new(StringArray::from(vec![Some("b")])),
                Arc::new(Float64Array::from(vec![Some(0.0)])),
            ],
        );

        let frame = decode_arrow_stream(&encode_batches(&[first, second]), true).unwrap();

        assert_eq!(frame.columns.len(), 3);
        assert_eq!(frame.rows(), 3);
        assert!(!frame.columns[0].nullable);
        assert!(frame.columns[2].nullable);
        assert_eq!(
            frame.columns[0].data,
            ColumnData::Timestamp(vec![Some(1_000), Some(2_000), Some(3_000)])
        );
        assert_eq!(
            frame.columns[1].data,
            ColumnData::String(vec![Some("a".into()), None, Some("b".into())])
        );
        // Null stays null, zero stays zero
        assert_eq!(
            frame.columns[2].data,
            ColumnData::Float64(vec![Some(1.5), None, Some(0.0)])
        );
    }

    #[test]
    fn test_decode_in_small_pieces() {
        let schema = metrics_schema();
        let record = batch(
            &schema,
            vec![
                Arc::new(TimestampMillisecondArray::from(vec![1_000, 2_000])),
                Arc::new(StringArray::from(vec![Some("a"), Some("b")])),
                Arc::new(Float64Array::from(vec![Some(1.0), Some(2.0)])),
            ],
        );
        let bytes = encode_batches(&[record.clone(), record]);

        let mut decoder = ArrowFrameDecoder::new(true);
        for piece in bytes.chunks(7) {
            decoder.push(piece).unwrap();
        }
        assert_eq!(decoder.batches(), 2);
        let frame = decoder.finish().unwrap();
        assert_eq!(frame.rows(), 4);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let schema = metrics_schema();
        let record = batch(
            &schema,
            vec![
                Arc::new(TimestampMillisecondArray::from(vec![1_000])),
                Arc::new(StringArray::from(vec![Some("a")])),
                Arc::new(Float64Array::from(vec![Some(1.0)])),
            ],
        );
        let bytes = encode_batches(&[record]);
        let cut = &bytes[..bytes.len() - 20];

        let mut decoder = ArrowFrameDecoder::new(true);
        let result = decoder.push(cut).and_then(|_| decoder.finish().map(|_| ()));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_stream_yields_empty_frame() {
        let schema = metrics_schema();
        let mut out = Vec::new();
        {
            let mut writer =
                arrow::ipc::writer::StreamWriter::try_new(&mut out, schema.as_ref()).unwrap();
            writer.finish().unwrap();
        }
        let frame = decode_arrow_stream(&out, true).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_mislabelled_microseconds_are_seconds() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "time",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        )]));
        // 2026-02-18T10:00:00Z in seconds, labelled as microseconds
        let record = batch(
            &schema,
            vec![Arc::new(TimestampMicrosecondArray::from(vec![
                None,
                Some(1_771_408_800),
            ]))],
        );

        let frame = decode_arrow_stream(&encode_batches(&[record.clone()]), true).unwrap();
        assert_eq!(
            frame.columns[0].data,
            ColumnData::Timestamp(vec![None, Some(1_771_408_800_000)])
        );

        let uncorrected = decode_arrow_stream(&encode_batches(&[record]), false).unwrap();
        assert_eq!(
            uncorrected.columns[0].data,
            ColumnData::Timestamp(vec![None, Some(1_771_408)])
        );
    }

    #[test]
    fn test_real_microseconds_are_kept() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "time",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        )]));
        let record = batch(
            &schema,
            vec![Arc::new(TimestampMicrosecondArray::from(vec![
                1_771_408_800_123_456,
            ]))],
        );
        let frame = decode_arrow_stream(&encode_batches(&[record]), true).unwrap();
        assert_eq!(
            frame.columns[0].data,
            ColumnData::Timestamp(vec![Some(1_771_408_800_123)])
        );
    }

    #[test]
    fn test_other_types() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("ok", DataType::Boolean, true),
            Field::new("count", DataType::Int64, false),
            Field::new("level", DataType::UInt8, false),
            Field::new("elapsed", DataType::Duration(TimeUnit::Second), true),
            Field::new("day", DataType::Date32, true),
        ]));
        let record = batch(
            &schema,
            vec![
                Arc::new(BooleanArray::from(vec![Some(true), None])),
                Arc::new(Int64Array::from(vec![7, -7])),
                Arc::new(UInt8Array::from(vec![1, 255])),
                Arc::new(DurationSecondArray::from(vec![Some(30), None])),
                Arc::new(Date32Array::from(vec![Some(0), None])),
            ],
        );

        let frame = decode_arrow_stream(&encode_batches(&[record]), true).unwrap();

        assert_eq!(frame.columns[0].data, ColumnData::Bool(vec![Some(true), None]));
        assert_eq!(frame.columns[1].data, ColumnData::Int64(vec![Some(7), Some(-7)]));
        assert_eq!(frame.columns[2].data, ColumnData::UInt8(vec![Some(1), Some(255)]));
        assert_eq!(frame.columns[3].data, ColumnData::Int64(vec![Some(30), None]));
        assert_eq!(
            frame.columns[4].data,
            ColumnData::String(vec![Some("1970-01-01".into()), None])
        );
    }

    #[test]
    fn test_to_millis() {
        assert_eq!(to_millis(2, TimeUnit::Second), 2_000);
        assert_eq!(to_millis(2_500, TimeUnit::Millisecond), 2_500);
        assert_eq!(to_millis(2_500_999, TimeUnit::Microsecond), 2_500);
        assert_eq!(to_millis(-1, TimeUnit::Nanosecond), -1);
    }
}
