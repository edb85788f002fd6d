//! The coordinator itself: one call serves one client query end to end.

use crate::context::{CacheItem, CoreContext};
use crate::coverage::SubtableCoverage;
use crate::{merge_responses, residual_query, Error, Result};
use data_types::{Response, TimeRange};
use response_codec::{decode_response, encode_response};
use semantic_segment::{subtable_conjunctions, Conjunction, ParsedQuery, QueryAnalyzer};
use snafu::ResultExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a query was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Nothing came from the cache.
    Miss,
    /// The cache covered the whole window; the database was not asked.
    Full,
    /// Data was missing ahead of the cached range.
    PartialFront,
    /// Data was missing behind the cached range.
    PartialBack,
    /// Data was missing on both sides (or in the middle).
    PartialBoth,
}

/// The result of one execution.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The merged tabular result.
    pub response: Response,
    /// Bytes served out of the cache.
    pub bytes_served: usize,
    /// How the cache fared.
    pub hit: HitKind,
}

/// Serves queries through the cache. One coordinator is shared by all
/// workers; per-query state lives on the stack.
#[derive(Debug, Clone)]
pub struct CacheCoordinator {
    context: Arc<CoreContext>,
}

impl CacheCoordinator {
    /// Coordinator over `context`.
    pub fn new(context: Arc<CoreContext>) -> Self {
        Self { context }
    }

    /// The wired context.
    pub fn context(&self) -> &Arc<CoreContext> {
        &self.context
    }

    /// Serve one query for `worker`.
    pub async fn execute(&self, query: &str, worker: usize) -> Result<QueryOutcome> {
        let (analyzer, parsed) = self.analyze(query).await?;

        // queries without a two-sided time window cannot be range-cached
        let window = match parsed.time_range() {
            Some(window) if !window.is_empty() => window,
            _ => {
                debug!("query has no bounded time window, going direct");
                let response = self.database_query(worker, query, None).await?;
                return Ok(QueryOutcome {
                    response,
                    bytes_served: 0,
                    hit: HitKind::Miss,
                });
            }
        };

        let template = analyzer.template(query);
        let segment = match self.context.memoized_segment(&template) {
            Some(segment) => segment,
            None => {
                let segment = analyzer.segment(&parsed);
                self.context.memoize_segment(&template, &segment);
                segment
            }
        };

        let cache = self.context.cache_for(worker);
        let hit = match cache.get(&segment, window).await {
            Ok(hit) => hit,
            Err(error) => {
                warn!(segment = segment.as_str(), %error, "cache unavailable, going direct");
                let response = self.database_query(worker, query, None).await?;
                return Ok(QueryOutcome {
                    response,
                    bytes_served: 0,
                    hit: HitKind::Miss,
                });
            }
        };

        let hit = match hit {
            Some(hit) => hit,
            None => {
                return self
                    .fill_from_database(worker, query, &parsed, &segment, window)
                    .await
            }
        };

        let decoded = match decode_response(&hit.value) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(segment = segment.as_str(), %error, "cached bytes corrupt, re-querying");
                let response = self.database_query(worker, query, None).await?;
                return Ok(QueryOutcome {
                    response,
                    bytes_served: 0,
                    hit: HitKind::Miss,
                });
            }
        };

        // line the cache's answer up against the canonical subtable list;
        // subtables the cache does not know at all are fully uncovered
        let conjunctions = subtable_conjunctions(&parsed, analyzer.catalog());
        let coverage =
            SubtableCoverage::align(window, &conjunctions, &decoded.tags, &hit.matched);

        if coverage.is_full_hit() {
            debug!(segment = segment.as_str(), "full hit");
            return Ok(QueryOutcome {
                response: decoded.response,
                bytes_served: hit.value.len(),
                hit: HitKind::Full,
            });
        }

        let kind = classify(window, &coverage);
        let subtables: Vec<(Conjunction, Vec<TimeRange>)> = conjunctions
            .into_iter()
            .zip(coverage.uncovered.iter().cloned())
            .collect();
        let (residual_text, residual_window) =
            match residual_query(&parsed, &subtables, window)? {
                Some(residual) => residual,
                None => {
                    // every uncovered interval fell outside the window
                    return Ok(QueryOutcome {
                        response: decoded.response,
                        bytes_served: hit.value.len(),
                        hit: HitKind::Full,
                    });
                }
            };

        debug!(
            segment = segment.as_str(),
            residual = residual_text.as_str(),
            "partial hit, fetching residual"
        );
        let residual_response = self
            .database_query(worker, &residual_text, Some(&decoded.response))
            .await?;

        let merged = merge_responses(&decoded.response, &residual_response);

        // write back only the residual; the cache merges coverage windows.
        // nothing new means nothing to remember
        if !residual_response.is_empty() {
            self.write_back(
                cache.as_ref(),
                &segment,
                &residual_response,
                &parsed,
                residual_window,
            )
            .await;
        }

        Ok(QueryOutcome {
            response: merged,
            bytes_served: hit.value.len(),
            hit: kind,
        })
    }

    /// Parse, reloading the schema catalog once when the measurement is
    /// unknown.
    async fn analyze(&self, query: &str) -> Result<(QueryAnalyzer, ParsedQuery)> {
        let analyzer = QueryAnalyzer::new(self.context.catalog());
        match analyzer.parse(query) {
            Ok(parsed) => Ok((analyzer, parsed)),
            Err(source @ semantic_segment::Error::SchemaMissing { .. }) => {
                match self.context.load_catalog().await {
                    Ok(()) => {
                        let analyzer = QueryAnalyzer::new(self.context.catalog());
                        let parsed = analyzer.parse(query).context(crate::AnalysisSnafu)?;
                        Ok((analyzer, parsed))
                    }
                    Err(Error::NoMetadataSource) => Err(Error::Analysis { source }),
                    Err(error) => Err(error),
                }
            }
            Err(source) => Err(Error::Analysis { source }),
        }
    }

    /// The miss path: fetch the full window and populate the cache.
    async fn fill_from_database(
        &self,
        worker: usize,
        query: &str,
        parsed: &ParsedQuery,
        segment: &str,
        window: TimeRange,
    ) -> Result<QueryOutcome> {
        let response = self.database_query(worker, query, None).await?;
        if !response.is_empty() {
            let cache = self.context.cache_for(worker);
            self.write_back(cache.as_ref(), segment, &response, parsed, window)
                .await;
        }
        Ok(QueryOutcome {
            response,
            bytes_served: 0,
            hit: HitKind::Miss,
        })
    }

    /// Encode and store `response` against `window`. Write-back failures
    /// degrade the cache, not the query, so they only log.
    async fn write_back(
        &self,
        cache: &dyn crate::RangeCache,
        segment: &str,
        response: &Response,
        parsed: &ParsedQuery,
        window: TimeRange,
    ) {
        let value = match encode_response(response, parsed) {
            Ok(value) => value,
            Err(error) => {
                warn!(segment, %error, "response not encodable, skipping write-back");
                return;
            }
        };
        let item = CacheItem {
            key: segment,
            value,
            window,
            num_tables: response.num_tables(),
        };
        if let Err(error) = cache.set(item).await {
            warn!(segment, %error, "cache write-back failed");
        }
    }

    async fn database_query(
        &self,
        worker: usize,
        command: &str,
        partial: Option<&Response>,
    ) -> Result<Response> {
        let database = self.context.database_for(worker);
        let result = database
            .query(command, self.context.database_name())
            .await;
        let partial = || partial.cloned().map(Box::new);
        match result {
            Ok(response) => match response.error() {
                Some(message) => Err(Error::Database {
                    message: message.to_string(),
                    partial: partial(),
                }),
                None => Ok(response),
            },
            Err(error) => Err(Error::Database {
                message: error.to_string(),
                partial: partial(),
            }),
        }
    }
}

fn classify(window: TimeRange, coverage: &SubtableCoverage) -> HitKind {
    let union = coverage.union();
    let front = union.iter().any(|range| range.start <= window.start);
    let back = union.iter().any(|range| range.end >= window.end);
    match (front, back) {
        (true, true) => HitKind::PartialBoth,
        (true, false) => HitKind::PartialFront,
        (false, true) => HitKind::PartialBack,
        // an interior gap misses on neither edge but still needs both
        // neighbors stitched around it
        (false, false) => HitKind::PartialBoth,
    }
}
