//! Time Sort and Long-to-Wide Pivot
//!
//! Turns a merged result into something a chart can draw directly:
//!
//! ```text
//! long (one row per time + label)        wide (one row per time)
//! time   host  value                     time   value{host=a}  value{host=b}
//! 10:00  a     1.0            ──▶        10:00  1.0            2.0
//! 10:00  b     2.0                       10:01  3.0            null
//! 10:01  a     3.0
//! ```
//!
//! The pivot never invents timestamps: a series missing at an existing
//! timestamp gets a null cell, but no rows are added for timestamps that
//! appear in no series.

use std::collections::{BTreeMap, HashMap};

use super::error::{FrameError, FrameResult};
use super::types::{Column, ColumnType, Frame, FrameFormat};

/// Time-series shape of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSeriesKind {
    /// No time column
    NotTimeSeries,
    /// One row per timestamp, one column per series
    Wide,
    /// One row per (timestamp, labels) pair
    Long,
}

/// Column roles detected in a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesSchema {
    pub kind: TimeSeriesKind,
    /// First timestamp column
    pub time_index: Option<usize>,
    /// Columns holding measurements
    pub value_indices: Vec<usize>,
    /// String columns identifying a series
    pub factor_indices: Vec<usize>,
}

impl TimeSeriesSchema {
    /// Classify the columns of `frame`
    pub fn detect(frame: &Frame) -> Self {
        let mut time_index = None;
        let mut value_indices = Vec::new();
        let mut factor_indices = Vec::new();

        for (i, column) in frame.columns.iter().enumerate() {
            match column.column_type() {
                ColumnType::Timestamp if time_index.is_none() => time_index = Some(i),
                ColumnType::String => factor_indices.push(i),
                _ => value_indices.push(i),
            }
        }

        let kind = match time_index {
            None => TimeSeriesKind::NotTimeSeries,
            Some(_) if factor_indices.is_empty() => TimeSeriesKind::Wide,
            Some(_) => TimeSeriesKind::Long,
        };

        Self {
            kind,
            time_index,
            value_indices,
            factor_indices,
        }
    }
}

/// Return `frame` with its rows ordered by the time column.
///
/// Already sorted input is returned untouched after a single scan. Frames with
/// a null or missing time value cannot be ordered and are also returned as-is.
pub fn ensure_ascending(frame: Frame, time_index: usize) -> Frame {
    let times = match frame
        .columns
        .get(time_index)
        .and_then(|c| c.data.timestamps())
    {
        Some(times) if times.len() >= 2 => times,
        _ => return frame,
    };

    let mut needs_sorting = false;
    let mut previous = i64::MIN;
    for time in times {
        let Some(current) = *time else {
            return frame;
        };
        if current < previous {
            needs_sorting = true;
            break;
        }
        previous = current;
    }

    if !needs_sorting {
        return frame;
    }

    if times.iter().any(Option::is_none) {
        return frame;
    }

    tracing::debug!(rows = times.len(), "Sorting frame by time");

    let mut order: Vec<usize> = (0..times.len()).collect();
    // Stable: rows sharing a timestamp keep their relative order
    order.sort_by_key(|&i| times[i]);

    frame.take_rows(&order)
}

/// Check that the time column is ascending and free of nulls
fn validate_time_column(times: &[Option<i64>]) -> FrameResult<()> {
    let mut previous = i64::MIN;
    for (row, time) in times.iter().enumerate() {
        let current = time.ok_or(FrameError::NullTimestamp { row })?;
        if current < previous {
            return Err(FrameError::Unsorted { row });
        }
        previous = current;
    }
    Ok(())
}

/// Reshape a sorted long-format frame into wide format.
///
/// Each distinct combination of factor values becomes a series; each series
/// gets one column per value column, labelled with the factor values. Series
/// appear in the order they are first seen.
pub fn long_to_wide(frame: &Frame) -> FrameResult<Frame> {
    let schema = TimeSeriesSchema::detect(frame);
    if schema.kind != TimeSeriesKind::Long {
        return Err(FrameError::NotLongFormat(format!(
            "detected {:?}",
            schema.kind
        )));
    }
    let time_index = schema.time_index.ok_or(FrameError::MissingTimeColumn)?;
    let row_count = frame.row_len()?;

    let time_column = &frame.columns[time_index];
    let times = time_column
        .data
        .timestamps()
        .ok_or(FrameError::MissingTimeColumn)?;
    validate_time_column(times)?;

    let factors: Vec<(&str, &[Option<String>])> = schema
        .factor_indices
        .iter()
        .filter_map(|&i| {
            let column = &frame.columns[i];
            column.data.strings().map(|s| (column.name.as_str(), s))
        })
        .collect();

    // Source row of the first row of each distinct timestamp
    let mut time_rows: Vec<usize> = Vec::new();
    let mut series_lookup: HashMap<Vec<Option<&str>>, usize> = HashMap::new();
    let mut series_labels: Vec<BTreeMap<String, String>> = Vec::new();
    // Per series, per output row: the source row providing its values
    let mut slots: Vec<Vec<Option<usize>>> = Vec::new();

    let mut last_time = None;
    for row in 0..row_count {
        if times[row] != last_time {
            time_rows.push(row);
            for series in &mut slots {
                series.push(None);
            }
            last_time = times[row];
        }
        let output_row = time_rows.len() - 1;

        let key: Vec<Option<&str>> = factors
            .iter()
            .map(|(_, values)| values[row].as_deref())
            .collect();

        let series = match series_lookup.get(&key) {
            Some(&s) => s,
            None => {
                let labels = factors
                    .iter()
                    .zip(&key)
                    .map(|((name, _), value)| (name.to_string(), value.unwrap_or("").to_string()))
                    .collect();
                series_labels.push(labels);
                slots.push(vec![None; output_row + 1]);
                series_lookup.insert(key, slots.len() - 1);
                slots.len() - 1
            }
        };

        slots[series][output_row] = Some(row);
    }

    let mut columns = Vec::with_capacity(1 + series_labels.len() * schema.value_indices.len());
    columns.push(Column {
        name: time_column.name.clone(),
        labels: time_column.labels.clone(),
        nullable: time_column.nullable,
        data: time_column.data.take(&time_rows),
    });

    for (series, labels) in series_labels.into_iter().enumerate() {
        for &value_index in &schema.value_indices {
            let source = &frame.columns[value_index];
            let mut merged_labels = source.labels.clone();
            merged_labels.extend(labels.clone());
            columns.push(Column {
                name: source.name.clone(),
                labels: merged_labels,
                nullable: true,
                data: source.data.gather(&slots[series]),
            });
        }
    }

    let mut wide = Frame {
        name: frame.name.clone(),
        ref_id: frame.ref_id.clone(),
        columns,
        meta: frame.meta.clone(),
    };
    wide.meta.format = FrameFormat::TimeSeriesWide;
    Ok(wide)
}

/// Time values of a frame in row order
#[cfg(test)]
pub(crate) fn time_values(frame: &Frame) -> Option<&[Option<i64>]> {
    let index = frame.time_index()?;
    frame.columns[index].data.timestamps()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::types::ColumnData;

    fn long_frame(rows: &[(i64, &str, f64)]) -> Frame {
        Frame::with_columns(
            "",
            vec![
                Column::from_data(
                    "time",
                    ColumnData::Timestamp(rows.iter().map(|r| Some(r.0)).collect()),
                ),
                Column::from_data(
                    "host",
                    ColumnData::String(rows.iter().map(|r| Some(r.1.to_string())).collect()),
                ),
                Column::from_data(
                    "value",
                    ColumnData::Float64(rows.iter().map(|r| Some(r.2)).collect()),
                ),
            ],
        )
    }

    #[test]
    fn test_detect_wide_long_and_table() {
        let wide = Frame::with_columns(
            "",
            vec![
                Column::from_data("time", ColumnData::Timestamp(vec![Some(1)])),
                Column::from_data("cpu", ColumnData::Float64(vec![Some(1.0)])),
            ],
        );
        assert_eq!(TimeSeriesSchema::detect(&wide).kind, TimeSeriesKind::Wide);

        let long = long_frame(&[(1, "a", 1.0)]);
        let schema = TimeSeriesSchema::detect(&long);
        assert_eq!(schema.kind, TimeSeriesKind::Long);
        assert_eq!(schema.time_index, Some(0));
        assert_eq!(schema.factor_indices, vec![1]);
        assert_eq!(schema.value_indices, vec![2]);

        let table = Frame::with_columns(
            "",
            vec![Column::from_data("name", ColumnData::String(vec![Some("x".into())]))],
        );
        assert_eq!(
            TimeSeriesSchema::detect(&table).kind,
            TimeSeriesKind::NotTimeSeries
        );
    }

    #[test]
    fn test_ensure_ascending_sorted_is_untouched() {
        let frame = long_frame(&[(1, "a", 1.0), (2, "a", 2.0), (2, "b", 3.0)]);
        let expected = frame.clone();
        assert_eq!(ensure_ascending(frame, 0), expected);
    }

    #[test]
    fn test_ensure_ascending_sorts_stably() {
        let frame = long_frame(&[(3, "a", 1.0), (1, "b", 2.0), (3, "c", 3.0), (2, "d", 4.0)]);
        let sorted = ensure_ascending(frame, 0);

        assert_eq!(
            time_values(&sorted).unwrap(),
            &[Some(1), Some(2), Some(3), Some(3)]
        );
        assert_eq!(
            sorted.columns[1].data,
            ColumnData::String(vec![
                Some("b".into()),
                Some("d".into()),
                Some("a".into()),
                Some("c".into())
            ])
        );
        assert_eq!(
            sorted.columns[2].data,
            ColumnData::Float64(vec![Some(2.0), Some(4.0), Some(1.0), Some(3.0)])
        );
    }

    #[test]
    fn test_ensure_ascending_with_null_time_is_untouched() {
        let mut frame = long_frame(&[(3, "a", 1.0), (1, "b", 2.0)]);
        frame.columns[0].data = ColumnData::Timestamp(vec![Some(3), None]);
        let expected = frame.clone();
        assert_eq!(ensure_ascending(frame, 0), expected);
    }

    #[test]
    fn test_long_to_wide() {
        let frame = long_frame(&[(10, "a", 1.0), (10, "b", 2.0), (20, "a", 3.0)]);
        let wide = long_to_wide(&frame).unwrap();

        assert_eq!(wide.meta.format, FrameFormat::TimeSeriesWide);
        assert_eq!(wide.columns.len(), 3);
        assert_eq!(wide.rows(), 2);
        assert_eq!(
            wide.columns[0].data,
            ColumnData::Timestamp(vec![Some(10), Some(20)])
        );

        assert_eq!(wide.columns[1].display_name(), "value {host=a}");
        assert_eq!(
            wide.columns[1].data,
            ColumnData::Float64(vec![Some(1.0), Some(3.0)])
        );

        assert_eq!(wide.columns[2].display_name(), "value {host=b}");
        assert_eq!(
            wide.columns[2].data,
            ColumnData::Float64(vec![Some(2.0), None])
        );
    }

    #[test]
    fn test_long_to_wide_does_not_fill_timestamps() {
        // Hourly series and a per-second series: output rows are exactly the
        // distinct timestamps present, nothing in between
        let frame = long_frame(&[
            (0, "hourly", 1.0),
            (1_000, "secondly", 2.0),
            (2_000, "secondly", 3.0),
            (3_600_000, "hourly", 4.0),
        ]);
        let wide = long_to_wide(&frame).unwrap();
        assert_eq!(wide.rows(), 4);
    }

    #[test]
    fn test_long_to_wide_rejects_unsorted() {
        let frame = long_frame(&[(20, "a", 1.0), (10, "a", 2.0)]);
        assert!(matches!(
            long_to_wide(&frame),
            Err(FrameError::Unsorted { row: 1 })
        ));
    }

    #[test]
    fn test_long_to_wide_rejects_wide_input() {
        let wide = Frame::with_columns(
            "",
            vec![
                Column::from_data("time", ColumnData::Timestamp(vec![Some(1)])),
                Column::from_data("cpu", ColumnData::Float64(vec![Some(1.0)])),
            ],
        );
        assert!(matches!(
            long_to_wide(&wide),
            Err(FrameError::NotLongFormat(_))
        ));
    }
}
