//! Coverage analysis: what did the cache cover, what must the database
//! still answer.

use data_types::TimeRange;
use semantic_segment::Conjunction;
use std::collections::HashMap;

/// Uncovered intervals per subtable, aligned with the canonical subtable
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtableCoverage {
    /// Per subtable: the sub-intervals of the asked window the cache did
    /// not cover, ascending.
    pub uncovered: Vec<Vec<TimeRange>>,
}

impl SubtableCoverage {
    /// Line the cache's answer up against the canonical subtable list.
    ///
    /// `decoded_tags` lists the tag pairs of each subtable in the cache's
    /// byte stream. When the matched-range list is exactly one range per
    /// stream subtable it is applied per subtable; any other length is
    /// treated as key-global coverage applying to every subtable.
    /// Conjunctions the stream does not mention at all are fully
    /// uncovered.
    pub fn align(
        window: TimeRange,
        conjunctions: &[Conjunction],
        decoded_tags: &[Vec<(String, String)>],
        matched: &[TimeRange],
    ) -> Self {
        let aligned = matched.len() == decoded_tags.len() && !decoded_tags.is_empty();
        let by_tags: HashMap<&[(String, String)], usize> = decoded_tags
            .iter()
            .enumerate()
            .map(|(index, tags)| (tags.as_slice(), index))
            .collect();

        let uncovered = conjunctions
            .iter()
            .map(|conjunction| {
                let pairs = conjunction.tag_pairs();
                match by_tags.get(pairs.as_slice()) {
                    Some(&index) if aligned => {
                        window.subtract_all(std::slice::from_ref(&matched[index]))
                    }
                    Some(_) => window.subtract_all(matched),
                    None => vec![window],
                }
            })
            .collect();
        Self { uncovered }
    }

    /// Is every subtable fully covered?
    pub fn is_full_hit(&self) -> bool {
        self.uncovered.iter().all(Vec::is_empty)
    }

    /// The union of all uncovered intervals, for classifying the hit.
    pub fn union(&self) -> Vec<TimeRange> {
        let mut all: Vec<TimeRange> = self.uncovered.iter().flatten().copied().collect();
        all.sort_by_key(|range| range.start);
        all.dedup();
        all
    }
}
