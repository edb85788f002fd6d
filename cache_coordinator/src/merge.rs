//! Merging cached and residual results.

use data_types::{Response, Series};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Merge the cached partial response with the residual database response.
///
/// Subtables pair up by `(measurement, tags)`; within a pair the row sets
/// are disjoint by construction (the residual covered only uncovered
/// intervals), so merging is a time-ordered interleave with no
/// deduplication. Subtables present on one side only pass through, and the
/// output is ordered by tag assignment so repeated executions render
/// identically.
pub fn merge_responses(cached: &Response, residual: &Response) -> Response {
    let mut merged: BTreeMap<(String, Vec<(String, String)>), Series> = BTreeMap::new();

    for series in cached.all_series().chain(residual.all_series()) {
        let key = (
            series.name.clone(),
            series
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        match merged.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(series.clone());
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.values.is_empty() {
                    existing.columns = series.columns.clone();
                }
                existing.values.extend(series.values.iter().cloned());
            }
        }
    }

    let mut out: Vec<Series> = merged.into_values().collect();
    for series in &mut out {
        series
            .values
            .sort_by_key(|row| row.first().and_then(|cell| cell.as_i64()));
    }
    out.retain(|series| !series.values.is_empty());

    Response::from_series(out)
}
