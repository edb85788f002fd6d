//! The columnar byte layout.
//!
//! Each column is stored contiguously behind a header naming the subtable
//! conjunction, the column and its type:
//!
//! ```text
//! (cpu.hostname=host_0).time[int64] <len:i64 LE><values...>
//! (cpu.hostname=host_0).usage_guest[float64] <len:i64 LE><values...>
//! ```
//!
//! The measurement is named once, ahead of the first tag; an untagged
//! subtable's conjunction is just the measurement name.

use crate::values::{column_width, decode_cell, encode_cell};
use crate::{
    ColumnCountMismatchSnafu, CorruptSnafu, Decoded, Result, UnevenRowsSnafu, EMPTY_SENTINEL,
};
use data_types::{Cell, DataType, Response, Series};
use itertools::Itertools;
use semantic_segment::ParsedQuery;
use snafu::ensure;
use std::collections::BTreeMap;

/// Encode a response in the columnar layout.
pub fn encode_response_columnar(response: &Response, parsed: &ParsedQuery) -> Result<Vec<u8>> {
    if response.is_empty() {
        return Ok(EMPTY_SENTINEL.to_vec());
    }

    let mut datatypes = vec![DataType::Int64];
    datatypes.extend(parsed.fields.iter().map(|field| field.datatype));

    let mut subtables: Vec<(String, &Series)> = response
        .all_series()
        .map(|series| (conjunction_text(series), series))
        .collect();
    subtables.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for (conjunction, series) in subtables {
        ensure!(
            series.columns.len() == datatypes.len(),
            ColumnCountMismatchSnafu {
                expected: datatypes.len(),
                actual: series.columns.len(),
            }
        );
        for (column, (name, datatype)) in series.columns.iter().zip(&datatypes).enumerate() {
            let mut values = Vec::new();
            for row in &series.values {
                ensure!(
                    row.len() == datatypes.len(),
                    ColumnCountMismatchSnafu {
                        expected: datatypes.len(),
                        actual: row.len(),
                    }
                );
                encode_cell(&row[column], *datatype, column, &mut values)?;
            }

            out.extend_from_slice(
                format!("({}).{}[{}]", conjunction, name, datatype).as_bytes(),
            );
            out.push(b' ');
            out.extend_from_slice(&(values.len() as i64).to_le_bytes());
            out.extend_from_slice(&values);
        }
    }
    Ok(out)
}

fn conjunction_text(series: &Series) -> String {
    if series.tags.is_empty() {
        return series.name.clone();
    }
    let tags = series
        .tags
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .join(",");
    format!("{}.{}", series.name, tags)
}

#[derive(Debug)]
struct ColumnBlock {
    conjunction: String,
    measurement: String,
    tags: Vec<(String, String)>,
    name: String,
    cells: Vec<Cell>,
}

/// Decode a columnar stream.
pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded> {
    let mut blocks: Vec<ColumnBlock> = vec![];

    let mut idx = 0;
    while idx < bytes.len() {
        let space = bytes[idx..]
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| crate::Error::Corrupt {
                reason: "unterminated column header".to_string(),
            })?;
        let header = std::str::from_utf8(&bytes[idx..idx + space]).map_err(|_| {
            crate::Error::Corrupt {
                reason: "column header is not UTF-8".to_string(),
            }
        })?;
        let (conjunction, measurement, tags, name, datatype) = parse_column_header(header)?;
        idx += space + 1;

        let length = crate::row::read_i64(bytes, &mut idx)?;
        let width = column_width(datatype);
        ensure!(
            length >= 0 && length as usize % width == 0,
            UnevenRowsSnafu { length, width }
        );
        ensure!(
            idx + length as usize <= bytes.len(),
            CorruptSnafu {
                reason: "column data overruns the stream".to_string(),
            }
        );

        let count = length as usize / width;
        let mut cells = Vec::with_capacity(count);
        for _ in 0..count {
            cells.push(decode_cell(&bytes[idx..], datatype)?);
            idx += width;
        }
        blocks.push(ColumnBlock {
            conjunction,
            measurement,
            tags,
            name,
            cells,
        });
    }

    // consecutive columns with one conjunction form one subtable
    let mut groups: Vec<Vec<ColumnBlock>> = vec![];
    for block in blocks {
        match groups.last_mut() {
            Some(group) if group[0].conjunction == block.conjunction => group.push(block),
            _ => groups.push(vec![block]),
        }
    }
    groups.sort_by(|a, b| a[0].conjunction.cmp(&b[0].conjunction));

    let mut series_out = vec![];
    let mut hit_flags = vec![];
    let mut time_ranges = vec![];
    let mut tags_out = vec![];
    let mut segments = vec![];
    for group in groups {
        let rows = group[0].cells.len();
        ensure!(
            group.iter().all(|block| block.cells.len() == rows),
            CorruptSnafu {
                reason: "ragged columns within one subtable".to_string(),
            }
        );

        let values: Vec<Vec<Cell>> = (0..rows)
            .map(|row| group.iter().map(|block| block.cells[row].clone()).collect())
            .collect();
        let first_last = match (values.first(), values.last()) {
            (Some(first), Some(last)) => match (first[0].as_i64(), last[0].as_i64()) {
                (Some(first), Some(last)) => Some((first, last)),
                _ => None,
            },
            _ => None,
        };

        let tags: BTreeMap<String, String> = group[0]
            .tags
            .iter()
            .filter(|(_, value)| value.as_str() != "null")
            .cloned()
            .collect();

        hit_flags.push(rows > 0);
        time_ranges.push(first_last);
        tags_out.push(group[0].tags.clone());
        segments.push(group[0].conjunction.clone());
        series_out.push(Series {
            name: group[0].measurement.clone(),
            tags,
            columns: group.iter().map(|block| block.name.clone()).collect(),
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

/// Split `(m.k=v,k2=v2).col[type]` into its parts.
#[allow(clippy::type_complexity)]
fn parse_column_header(
    header: &str,
) -> Result<(String, String, Vec<(String, String)>, String, DataType)> {
    let malformed = |reason: &str| crate::Error::Corrupt {
        reason: format!("column header {:?}: {}", header, reason),
    };

    let inner_end = header.find(')').ok_or_else(|| malformed("no conjunction"))?;
    let conjunction = header
        .get(1..inner_end)
        .ok_or_else(|| malformed("no conjunction"))?
        .to_string();
    let rest = header[inner_end + 1..]
        .strip_prefix('.')
        .ok_or_else(|| malformed("no column name"))?;

    let open = rest.find('[').ok_or_else(|| malformed("no datatype"))?;
    let close = rest.find(']').ok_or_else(|| malformed("no datatype"))?;
    let name = rest[..open].to_string();
    let datatype = DataType::parse(&rest[open + 1..close])
        .ok_or_else(|| malformed("unknown datatype"))?;

    let (measurement, tags) = match conjunction.split_once('.') {
        Some((measurement, tags_text)) => {
            let mut tags = vec![];
            for term in tags_text.split(',').filter(|t| !t.is_empty()) {
                if let Some(at) = term.find('=') {
                    // negated terms ("k!=v") pin nothing and are skipped
                    if !term[..at].ends_with('!') {
                        tags.push((term[..at].to_string(), term[at + 1..].to_string()));
                    }
                }
            }
            (measurement.to_string(), tags)
        }
        None => (conjunction.clone(), vec![]),
    };

    Ok((conjunction, measurement, tags, name, datatype))
}
