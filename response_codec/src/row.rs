//! The row-major byte layout.

use crate::values::{column_width, decode_cell, encode_cell};
use crate::{
    ColumnCountMismatchSnafu, CorruptSnafu, Decoded, Result, SegmentSnafu, UnevenRowsSnafu,
    EMPTY_SENTINEL,
};
use data_types::{DataType, Response, Series};
use semantic_segment::{segment_for_tags, ParsedQuery, SeparateSegment};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use tracing::debug;

/// Encode a response in the row-major layout.
///
/// Each series is prefixed by its own separate segment (derived from the
/// series' tag assignment, with `null` standing in for group-by tags the
/// series does not report) and subtables are emitted in canonical segment
/// order. An empty response encodes to the [`EMPTY_SENTINEL`].
pub fn encode_response(response: &Response, parsed: &ParsedQuery) -> Result<Vec<u8>> {
    if response.is_empty() {
        return Ok(EMPTY_SENTINEL.to_vec());
    }

    let mut datatypes = vec![DataType::Int64];
    datatypes.extend(parsed.fields.iter().map(|field| field.datatype));

    let mut subtables: Vec<(String, &Series)> = response
        .all_series()
        .map(|series| (segment_for_tags(parsed, &series.tags), series))
        .collect();
    subtables.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for (segment, series) in subtables {
        let mut rows = Vec::new();
        for row in &series.values {
            ensure!(
                row.len() == datatypes.len(),
                ColumnCountMismatchSnafu {
                    expected: datatypes.len(),
                    actual: row.len(),
                }
            );
            for (column, (cell, datatype)) in row.iter().zip(&datatypes).enumerate() {
                encode_cell(cell, *datatype, column, &mut rows)?;
            }
        }

        out.extend_from_slice(segment.as_bytes());
        out.push(b' ');
        out.extend_from_slice(&(rows.len() as i64).to_le_bytes());
        out.extend_from_slice(&rows);
    }

    debug!(
        subtables = response.num_tables(),
        bytes = out.len(),
        "encoded response"
    );
    Ok(out)
}

/// Decode a row-major stream.
pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded> {
    let mut series_out = vec![];
    let mut hit_flags = vec![];
    let mut time_ranges = vec![];
    let mut tags_out = vec![];
    let mut segments = vec![];

    let mut idx = 0;
    while idx < bytes.len() {
        let space = bytes[idx..]
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| corrupt("unterminated segment header"))?;
        let segment_text = std::str::from_utf8(&bytes[idx..idx + space])
            .map_err(|_| corrupt("segment header is not UTF-8"))?;
        ensure!(
            segment_text.starts_with("{("),
            CorruptSnafu {
                reason: format!("unexpected subtable header {:?}", segment_text),
            }
        );
        let segment = SeparateSegment::parse(segment_text).context(SegmentSnafu)?;
        idx += space + 1;

        let length = read_i64(bytes, &mut idx)?;
        let (columns, datatypes) = segment.columns();
        let width: usize = datatypes.iter().map(|d| column_width(*d)).sum();
        ensure!(width > 0, CorruptSnafu { reason: "subtable with no columns".to_string() });
        ensure!(
            length >= 0 && length as usize % width == 0,
            UnevenRowsSnafu { length, width }
        );
        ensure!(
            idx + length as usize <= bytes.len(),
            CorruptSnafu {
                reason: "subtable data overruns the stream".to_string(),
            }
        );

        let row_count = length as usize / width;
        let mut values = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let mut row = Vec::with_capacity(datatypes.len());
            for datatype in &datatypes {
                row.push(decode_cell(&bytes[idx..], *datatype)?);
                idx += column_width(*datatype);
            }
            values.push(row);
        }

        let first_last = match (values.first(), values.last()) {
            (Some(first), Some(last)) => match (first[0].as_i64(), last[0].as_i64()) {
                (Some(first), Some(last)) => Some((first, last)),
                _ => None,
            },
            _ => None,
        };

        let tags: BTreeMap<String, String> = segment
            .tags
            .iter()
            .filter(|(_, value)| value.as_str() != "null")
            .cloned()
            .collect();

        hit_flags.push(!values.is_empty());
        time_ranges.push(first_last);
        tags_out.push(segment.tags.clone());
        segments.push(segment_text.to_string());
        series_out.push(Series {
            name: segment.measurement.clone(),
            tags,
            columns,
            values,
            partial: false,
        });
    }

    Ok(Decoded {
        response: Response::from_series(series_out),
        hit_flags,
        time_ranges,
        tags: tags_out,
        segments,
    })
}

pub(crate) fn read_i64(bytes: &[u8], idx: &mut usize) -> Result<i64> {
    ensure!(
        *idx + 8 <= bytes.len(),
        CorruptSnafu {
            reason: "stream ends inside a length field".to_string(),
        }
    );
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[*idx..*idx + 8]);
    *idx += 8;
    Ok(i64::from_le_bytes(raw))
}

fn corrupt(reason: &str) -> crate::Error {
    crate::Error::Corrupt {
        reason: reason.to_string(),
    }
}
