//! Canonical rendering of semantic segments.

use crate::parse::{ParsedQuery, TagOp, TagPredicate};
use itertools::Itertools;
use schema_catalog::SchemaCatalog;
use std::collections::BTreeMap;

/// One `key=value` / `key!=value` term of a subtable conjunction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConjunctionTerm {
    /// Tag key.
    pub key: String,
    /// Operator; group-by expansions are always `=`.
    pub op: TagOp,
    /// Tag value.
    pub value: String,
}

impl ConjunctionTerm {
    fn from_predicate(predicate: &TagPredicate) -> Self {
        Self {
            key: predicate.key.clone(),
            op: predicate.op,
            value: predicate.value.clone(),
        }
    }

    /// `key=value` as it appears inside a conjunction.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.key, self.op, self.value)
    }
}

/// The tag conjunction identifying one subtable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conjunction {
    /// Terms sorted by rendering; empty for an untagged subtable.
    pub terms: Vec<ConjunctionTerm>,
}

impl Conjunction {
    fn new(mut terms: Vec<ConjunctionTerm>) -> Self {
        terms.sort_by_key(ConjunctionTerm::render);
        terms.dedup();
        Self { terms }
    }

    /// Render as `(m.k=v,m.k2=v2)`; a termless conjunction renders as
    /// `(m.empty)`.
    pub fn render(&self, measurement: &str) -> String {
        if self.terms.is_empty() {
            return format!("({}.empty)", measurement);
        }
        let inner = self
            .terms
            .iter()
            .map(|term| format!("{}.{}", measurement, term.render()))
            .join(",");
        format!("({})", inner)
    }

    /// The `key=value` pairs that pin this subtable's tags (negated terms
    /// pin nothing and are skipped).
    pub fn tag_pairs(&self) -> Vec<(String, String)> {
        self.terms
            .iter()
            .filter(|term| term.op == TagOp::Eq)
            .map(|term| (term.key.clone(), term.value.clone()))
            .collect()
    }
}

/// All subtable conjunctions of a query, in canonical (sorted) order.
///
/// Predicate tags contribute fixed terms; group-by tags not pinned by a
/// predicate expand to their full value domain, and the cross-product over
/// those domains enumerates the subtables.
pub fn subtable_conjunctions(
    parsed: &ParsedQuery,
    catalog: &SchemaCatalog,
) -> Vec<Conjunction> {
    let fixed: Vec<ConjunctionTerm> = parsed
        .tag_predicates
        .iter()
        .map(ConjunctionTerm::from_predicate)
        .collect();

    let mut expansions: Vec<Vec<ConjunctionTerm>> = vec![];
    for tag in &parsed.group_by_tags {
        if parsed.tag_predicates.iter().any(|p| &p.key == tag) {
            continue;
        }
        let values = catalog
            .tag_values(&parsed.measurement, tag)
            .unwrap_or_default();
        if values.is_empty() {
            continue;
        }
        expansions.push(
            values
                .iter()
                .map(|value| ConjunctionTerm {
                    key: tag.clone(),
                    op: TagOp::Eq,
                    value: value.clone(),
                })
                .collect(),
        );
    }

    let mut conjunctions: Vec<Conjunction> = if expansions.is_empty() {
        vec![Conjunction::new(fixed)]
    } else {
        expansions
            .into_iter()
            .multi_cartesian_product()
            .map(|combo| {
                let mut terms = fixed.clone();
                terms.extend(combo);
                Conjunction::new(terms)
            })
            .collect()
    };

    conjunctions.sort_by_key(|c| c.render(&parsed.measurement));
    conjunctions
}

/// The canonical full segment:
/// `{conjunctions}#{fields}#{predicates}#{aggregation,interval}`.
pub fn integrated_segment(parsed: &ParsedQuery, catalog: &SchemaCatalog) -> String {
    let conjunctions = subtable_conjunctions(parsed, catalog)
        .iter()
        .map(|c| c.render(&parsed.measurement))
        .join("");
    format!(
        "{{{}}}#{}#{}#{}",
        conjunctions,
        fields_group(parsed),
        predicates_group(parsed),
        aggregation_group(parsed)
    )
}

/// The segment of one subtable: the shared field/predicate/aggregation
/// groups behind that subtable's single conjunction.
pub fn separate_segment_text(parsed: &ParsedQuery, conjunction: &Conjunction) -> String {
    format!(
        "{{{}}}#{}#{}#{}",
        conjunction.render(&parsed.measurement),
        fields_group(parsed),
        predicates_group(parsed),
        aggregation_group(parsed)
    )
}

/// The segment of the subtable carrying exactly `tags`, used when encoding
/// a response whose series enumerate their own tag assignments. Group-by
/// tags the series does not report are emitted with the value `null`, so
/// subtable identity (and count) survives the round-trip.
pub fn segment_for_tags(parsed: &ParsedQuery, tags: &BTreeMap<String, String>) -> String {
    let mut terms: Vec<ConjunctionTerm> = tags
        .iter()
        .map(|(key, value)| ConjunctionTerm {
            key: key.clone(),
            op: TagOp::Eq,
            value: if value.is_empty() {
                "null".to_string()
            } else {
                value.clone()
            },
        })
        .collect();
    for tag in &parsed.group_by_tags {
        if !tags.contains_key(tag) {
            terms.push(ConjunctionTerm {
                key: tag.clone(),
                op: TagOp::Eq,
                value: "null".to_string(),
            });
        }
    }
    for predicate in &parsed.tag_predicates {
        if !tags.contains_key(&predicate.key) && !parsed.group_by_tags.contains(&predicate.key)
        {
            terms.push(ConjunctionTerm::from_predicate(predicate));
        }
    }

    separate_segment_text(parsed, &Conjunction::new(terms))
}

fn fields_group(parsed: &ParsedQuery) -> String {
    let fields = parsed
        .fields
        .iter()
        .map(|field| format!("{}[{}]", field.name, field.datatype))
        .join(",");
    format!("{{{}}}", fields)
}

fn predicates_group(parsed: &ParsedQuery) -> String {
    if parsed.field_predicates.is_empty() {
        return "{empty}".to_string();
    }
    let predicates = parsed
        .field_predicates
        .iter()
        .map(|predicate| format!("({})", predicate.render()))
        .join("");
    format!("{{{}}}", predicates)
}

fn aggregation_group(parsed: &ParsedQuery) -> String {
    let aggregation = parsed.aggregation.as_deref().unwrap_or("empty");
    let interval = parsed
        .interval_nanos
        .map(crate::duration::format_duration)
        .unwrap_or_else(|| "empty".to_string());
    format!("{{{},{}}}", aggregation, interval)
}
