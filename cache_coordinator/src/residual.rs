//! Residual query construction.
//!
//! For each subtable missing data the residual carries one disjunct
//! restricting that subtable's tag conjunction to its uncovered
//! sub-intervals; OR-ing the disjuncts lets one database round trip cover
//! every gap, including two-sided ones.

use crate::Result;
use data_types::{format_rfc3339, TimeRange};
use itertools::Itertools;
use semantic_segment::{Conjunction, ParsedQuery, TagOp};
use snafu::ResultExt;

/// Build the residual query for the given per-subtable uncovered
/// intervals. Intervals are truncated into `window`; subtables with
/// nothing left to fetch contribute no disjunct. Returns the query text
/// and the global residual window, or `None` when nothing is uncovered.
pub fn residual_query(
    parsed: &ParsedQuery,
    subtables: &[(Conjunction, Vec<TimeRange>)],
    window: TimeRange,
) -> Result<Option<(String, TimeRange)>> {
    let mut clauses = vec![];
    let mut global: Option<TimeRange> = None;

    for (conjunction, uncovered) in subtables {
        for range in uncovered {
            let range = match range.clamp_to(&window) {
                Some(range) => range,
                None => continue,
            };
            global = Some(match global {
                Some(current) => TimeRange::new(
                    current.start.min(range.start),
                    current.end.max(range.end),
                ),
                None => range,
            });

            let mut terms: Vec<String> = conjunction
                .terms
                .iter()
                .map(|term| {
                    let op = match term.op {
                        TagOp::Eq => "=",
                        TagOp::NotEq => "!=",
                    };
                    format!("\"{}\" {} '{}'", term.key, op, term.value)
                })
                .collect();
            for predicate in &parsed.field_predicates {
                terms.push(predicate.to_condition());
            }
            terms.push(format!(
                "TIME >= '{}'",
                format_rfc3339(range.start).context(crate::ResidualTimestampSnafu)?
            ));
            terms.push(format!(
                "TIME < '{}'",
                format_rfc3339(range.end).context(crate::ResidualTimestampSnafu)?
            ));
            clauses.push(format!("({})", terms.join(" AND ")));
        }
    }

    let global = match (clauses.is_empty(), global) {
        (false, Some(global)) => global,
        _ => return Ok(None),
    };

    let mut query = format!(
        "SELECT {} FROM {} WHERE {}",
        parsed.select_text,
        parsed.measurement,
        clauses.join(" OR ")
    );
    if let Some(group_by) = group_by_clause(parsed) {
        query.push_str(" GROUP BY ");
        query.push_str(&group_by);
    }

    Ok(Some((query, global)))
}

fn group_by_clause(parsed: &ParsedQuery) -> Option<String> {
    let mut parts = vec![];
    if let Some(nanos) = parsed.interval_nanos {
        parts.push(format!("time({})", semantic_segment::format_duration(nanos)));
    }
    parts.extend(
        parsed
            .group_by_tags
            .iter()
            .map(|tag| format!("\"{}\"", tag)),
    );
    (!parts.is_empty()).then(|| parts.iter().join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantic_segment::test_fixtures::analyzer;
    use semantic_segment::subtable_conjunctions;

    const T0: i64 = 1640995200; // 2022-01-01T00:00:00Z

    #[test]
    fn two_sided_gap_builds_one_disjunction() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:30Z' AND hostname='host_0'",
            )
            .unwrap();
        let window = TimeRange::new(T0, T0 + 30);
        let conjunctions = subtable_conjunctions(&parsed, analyzer.catalog());
        let subtables = vec![(
            conjunctions[0].clone(),
            vec![TimeRange::new(T0, T0 + 10), TimeRange::new(T0 + 20, T0 + 30)],
        )];

        let (query, global) = residual_query(&parsed, &subtables, window)
            .unwrap()
            .unwrap();
        assert_eq!(
            query,
            "SELECT usage_guest FROM cpu WHERE \
             (\"hostname\" = 'host_0' AND TIME >= '2022-01-01T00:00:00Z' AND TIME < '2022-01-01T00:00:10Z') \
             OR \
             (\"hostname\" = 'host_0' AND TIME >= '2022-01-01T00:00:20Z' AND TIME < '2022-01-01T00:00:30Z')"
        );
        assert_eq!(global, window);
    }

    #[test]
    fn intervals_truncate_into_the_window() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:30Z' AND hostname='host_0'",
            )
            .unwrap();
        let window = TimeRange::new(T0, T0 + 30);
        let conjunctions = subtable_conjunctions(&parsed, analyzer.catalog());
        let subtables = vec![(
            conjunctions[0].clone(),
            vec![TimeRange::new(T0 - 100, T0 + 10)],
        )];

        let (query, global) = residual_query(&parsed, &subtables, window)
            .unwrap()
            .unwrap();
        assert!(query.contains("TIME >= '2022-01-01T00:00:00Z'"), "{}", query);
        assert_eq!(global, TimeRange::new(T0, T0 + 10));
    }

    #[test]
    fn group_by_and_predicates_are_preserved() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT max(usage_user) FROM cpu WHERE hostname='host_6' AND usage_user > 90 \
                 AND time >= '2022-01-01T01:00:00Z' AND time < '2022-01-01T02:00:00Z' \
                 GROUP BY time(1m)",
            )
            .unwrap();
        let window = parsed.time_range().unwrap();
        let conjunctions = subtable_conjunctions(&parsed, analyzer.catalog());
        let subtables = vec![(conjunctions[0].clone(), vec![window])];

        let (query, _) = residual_query(&parsed, &subtables, window)
            .unwrap()
            .unwrap();
        assert!(query.starts_with("SELECT max(usage_user) FROM cpu WHERE "), "{}", query);
        assert!(query.contains("usage_user > 90"), "{}", query);
        assert!(query.ends_with(" GROUP BY time(1m)"), "{}", query);
    }

    #[test]
    fn covered_subtables_contribute_nothing() {
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:30Z' AND hostname='host_0'",
            )
            .unwrap();
        let window = TimeRange::new(T0, T0 + 30);
        let conjunctions = subtable_conjunctions(&parsed, analyzer.catalog());
        let subtables = vec![(conjunctions[0].clone(), vec![])];
        assert!(residual_query(&parsed, &subtables, window)
            .unwrap()
            .is_none());
    }

    #[test]
    fn residual_round_trips_through_the_analyzer() {
        // the residual query must itself be analyzable, since concurrent
        // workers may see it written back under the same template
        let analyzer = analyzer();
        let parsed = analyzer
            .parse(
                "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:30Z' AND hostname='host_0'",
            )
            .unwrap();
        let window = TimeRange::new(T0, T0 + 30);
        let conjunctions = subtable_conjunctions(&parsed, analyzer.catalog());
        let subtables = vec![(conjunctions[0].clone(), vec![TimeRange::new(T0, T0 + 10)])];
        let (query, _) = residual_query(&parsed, &subtables, window)
            .unwrap()
            .unwrap();

        let reparsed = analyzer.parse(&query).unwrap();
        assert_eq!(reparsed.measurement, "cpu");
        assert_eq!(reparsed.time_start, Some(T0));
        assert_eq!(reparsed.time_end, Some(T0 + 10));
    }
}
