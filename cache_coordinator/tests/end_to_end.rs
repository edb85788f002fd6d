//! End-to-end pipeline scenarios against in-memory collaborators.
//!
//! The cache double tracks per-key time coverage the way the real cache
//! does: `set` decodes the stored stream and remembers which windows it
//! was given, `get` re-encodes only the rows inside the asked window and
//! reports the matched sub-ranges.

use async_trait::async_trait;
use cache_coordinator::{
    CacheCoordinator, CacheHit, CacheItem, CoreContext, Database, DynError, HitKind, RangeCache,
};
use data_types::{parse_rfc3339, Cell, Response, Series, TimeRange};
use parking_lot::Mutex;
use response_codec::{decode_response, encode_cell};
use semantic_segment::test_fixtures::benchmark_catalog;
use semantic_segment::SeparateSegment;
use std::collections::BTreeMap;
use std::sync::Arc;

const T0: i64 = 1640995200; // 2022-01-01T00:00:00Z
const STEP: i64 = 5;

#[derive(Debug, Default)]
struct StoredSubtable {
    rows: BTreeMap<i64, Vec<Cell>>,
}

#[derive(Debug, Default)]
struct MockCache {
    /// key → (coverage windows, segment → rows)
    store: Mutex<BTreeMap<String, (Vec<TimeRange>, BTreeMap<String, StoredSubtable>)>>,
    sets: Mutex<Vec<(String, TimeRange, i64)>>,
    unavailable: bool,
}

impl MockCache {
    fn set_count(&self) -> usize {
        self.sets.lock().len()
    }
}

#[async_trait]
impl RangeCache for MockCache {
    async fn get(&self, key: &str, window: TimeRange) -> Result<Option<CacheHit>, DynError> {
        if self.unavailable {
            return Err("cache down".into());
        }
        let store = self.store.lock();
        let (coverage, subtables) = match store.get(key) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut matched: Vec<TimeRange> = coverage
            .iter()
            .filter_map(|covered| covered.intersect(&window))
            .collect();
        matched.sort_by_key(|range| range.start);
        // coalesce overlapping or touching windows
        let mut coalesced: Vec<TimeRange> = vec![];
        for range in matched {
            match coalesced.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => coalesced.push(range),
            }
        }
        if coalesced.is_empty() {
            return Ok(None);
        }

        let mut value = Vec::new();
        for (segment, subtable) in subtables {
            let (_, datatypes) = SeparateSegment::parse(segment).unwrap().columns();
            let mut rows = Vec::new();
            for (time, cells) in &subtable.rows {
                if coalesced.iter().any(|range| range.contains(*time)) {
                    for (column, (cell, datatype)) in
                        cells.iter().zip(&datatypes).enumerate()
                    {
                        encode_cell(cell, *datatype, column, &mut rows).unwrap();
                    }
                }
            }
            value.extend_from_slice(segment.as_bytes());
            value.push(b' ');
            value.extend_from_slice(&(rows.len() as i64).to_le_bytes());
            value.extend_from_slice(&rows);
        }

        Ok(Some(CacheHit {
            value,
            matched: coalesced,
        }))
    }

    async fn set(&self, item: CacheItem<'_>) -> Result<(), DynError> {
        if self.unavailable {
            return Err("cache down".into());
        }
        let decoded = decode_response(&item.value).map_err(|e| e.to_string())?;
        let mut store = self.store.lock();
        let entry = store.entry(item.key.to_string()).or_default();
        entry.0.push(item.window);
        for (index, series) in decoded.response.all_series().enumerate() {
            let subtable = entry
                .1
                .entry(decoded.segments[index].clone())
                .or_default();
            for row in &series.values {
                if let Some(time) = row[0].as_i64() {
                    subtable.rows.insert(time, row.clone());
                }
            }
        }
        self.sets
            .lock()
            .push((item.key.to_string(), item.window, item.num_tables));
        Ok(())
    }
}

/// A cache that answers every get with bytes no decoder accepts.
#[derive(Debug)]
struct CorruptCache;

#[async_trait]
impl RangeCache for CorruptCache {
    async fn get(&self, _key: &str, window: TimeRange) -> Result<Option<CacheHit>, DynError> {
        Ok(Some(CacheHit {
            value: b"{(not a segment".to_vec(),
            matched: vec![window],
        }))
    }

    async fn set(&self, _item: CacheItem<'_>) -> Result<(), DynError> {
        panic!("corrupt path must not repopulate the cache");
    }
}

/// Generates deterministic rows: one per multiple of [`STEP`] seconds
/// inside every quoted time range of the incoming query, for each
/// configured series.
#[derive(Debug)]
struct MockDatabase {
    series: Vec<(BTreeMap<String, String>, Vec<String>)>,
    int_values: bool,
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl MockDatabase {
    fn cpu_guest() -> Self {
        Self {
            series: vec![(
                [("hostname".to_string(), "host_0".to_string())]
                    .into_iter()
                    .collect(),
                vec!["time".to_string(), "usage_guest".to_string()],
            )],
            int_values: false,
            calls: Mutex::new(vec![]),
            fail: false,
        }
    }

    fn h2o_index() -> Self {
        let mut series = vec![];
        for location in ["coyote_creek", "santa_monica"] {
            for randtag in ["1", "2", "3"] {
                series.push((
                    [
                        ("location".to_string(), location.to_string()),
                        ("randtag".to_string(), randtag.to_string()),
                    ]
                    .into_iter()
                    .collect(),
                    vec!["time".to_string(), "index".to_string()],
                ));
            }
        }
        Self {
            series,
            int_values: true,
            calls: Mutex::new(vec![]),
            fail: false,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn last_call(&self) -> String {
        self.calls.lock().last().cloned().unwrap_or_default()
    }
}

fn quoted_time_ranges(query: &str) -> Vec<TimeRange> {
    let mut stamps = vec![];
    let mut rest = query;
    while let Some(open) = rest.find('\'') {
        let after = &rest[open + 1..];
        let close = match after.find('\'') {
            Some(close) => close,
            None => break,
        };
        if let Ok(seconds) = parse_rfc3339(&after[..close]) {
            stamps.push(seconds);
        }
        rest = &after[close + 1..];
    }
    stamps
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| TimeRange::new(pair[0], pair[1]))
        .collect()
}

#[async_trait]
impl Database for MockDatabase {
    async fn query(&self, command: &str, _database: &str) -> Result<Response, DynError> {
        self.calls.lock().push(command.to_string());
        if self.fail {
            return Err("database down".into());
        }

        let ranges = quoted_time_ranges(command);
        let mut out = vec![];
        for (tags, columns) in &self.series {
            let mut times: Vec<i64> = vec![];
            for range in &ranges {
                let mut t = range.start + (STEP - range.start.rem_euclid(STEP)) % STEP;
                while t < range.end {
                    times.push(t);
                    t += STEP;
                }
            }
            times.sort_unstable();
            times.dedup();
            let name = if self.int_values { "h2o_quality" } else { "cpu" };
            out.push(Series {
                name: name.to_string(),
                tags: tags.clone(),
                columns: columns.clone(),
                values: times
                    .into_iter()
                    .map(|t| {
                        let value = if self.int_values {
                            Cell::Int64(t % 100)
                        } else {
                            Cell::Float64(t as f64)
                        };
                        vec![Cell::Int64(t), value]
                    })
                    .collect(),
                partial: false,
            });
        }
        Ok(Response::from_series(out))
    }
}

fn coordinator(
    database: Arc<MockDatabase>,
    cache: Arc<dyn RangeCache>,
) -> CacheCoordinator {
    let context = CoreContext::builder()
        .database_name("benchmark")
        .add_database(database)
        .add_cache(cache)
        .catalog(benchmark_catalog())
        .build()
        .unwrap();
    CacheCoordinator::new(Arc::new(context))
}

fn row_times(response: &Response) -> Vec<i64> {
    response
        .all_series()
        .flat_map(|series| series.values.iter())
        .map(|row| row[0].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn fresh_miss_then_full_hit() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::cpu_guest());
    let cache = Arc::new(MockCache::default());
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);

    let query = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";

    let first = coordinator.execute(query, 0).await.unwrap();
    assert_eq!(first.hit, HitKind::Miss);
    assert_eq!(database.call_count(), 1);
    assert_eq!(cache.set_count(), 1);
    assert_eq!(row_times(&first.response), vec![T0, T0 + 5, T0 + 10, T0 + 15]);

    // identical call: answered purely from cache
    let second = coordinator.execute(query, 0).await.unwrap();
    assert_eq!(second.hit, HitKind::Full);
    assert_eq!(database.call_count(), 1);
    assert!(second.bytes_served > 0);
    assert_eq!(row_times(&second.response), row_times(&first.response));

    // the memoized template was reused
    assert_eq!(coordinator.context().template_count(), 1);
}

#[tokio::test]
async fn front_side_partial_hit() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::cpu_guest());
    let cache = Arc::new(MockCache::default());
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);

    let warm = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";
    coordinator.execute(warm, 0).await.unwrap();

    let wider = "SELECT usage_guest FROM cpu WHERE time >= '2021-12-31T23:59:40Z' \
                 AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";
    let outcome = coordinator.execute(wider, 0).await.unwrap();

    assert_eq!(outcome.hit, HitKind::PartialFront);
    assert_eq!(database.call_count(), 2);
    let residual = database.last_call();
    assert!(residual.contains("TIME >= '2021-12-31T23:59:40Z'"), "{}", residual);
    assert!(residual.contains("TIME < '2022-01-01T00:00:00Z'"), "{}", residual);
    assert!(!residual.contains("00:00:20Z'"), "residual over-fetches: {}", residual);

    let times = row_times(&outcome.response);
    assert_eq!(times.first(), Some(&(T0 - 20)));
    assert!(times.windows(2).all(|w| w[0] < w[1]), "not increasing: {:?}", times);
    assert_eq!(times.len(), 8);
}

#[tokio::test]
async fn two_sided_partial_hit_uses_one_disjunctive_residual() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::cpu_guest());
    let cache = Arc::new(MockCache::default());
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);

    let middle = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:10Z' \
                  AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";
    coordinator.execute(middle, 0).await.unwrap();
    let cached_rows = 2; // t0+10, t0+15

    let full = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                AND time < '2022-01-01T00:00:30Z' AND hostname='host_0'";
    let outcome = coordinator.execute(full, 0).await.unwrap();

    assert_eq!(outcome.hit, HitKind::PartialBoth);
    assert_eq!(database.call_count(), 2, "both gaps covered by one residual");
    let residual = database.last_call();
    assert_eq!(residual.matches(" OR ").count(), 1, "{}", residual);

    let times = row_times(&outcome.response);
    assert_eq!(times, vec![T0, T0 + 5, T0 + 10, T0 + 15, T0 + 20, T0 + 25]);
    assert_eq!(times.len(), cached_rows + 4);
}

#[tokio::test]
async fn cross_product_subtables_round_trip() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::h2o_index());
    let cache = Arc::new(MockCache::default());
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);

    let query = "SELECT index FROM h2o_quality WHERE time >= '2019-08-18T00:00:00Z' \
                 AND time <= '2019-08-18T00:30:00Z' GROUP BY randtag,location";

    let first = coordinator.execute(query, 0).await.unwrap();
    assert_eq!(first.hit, HitKind::Miss);
    assert_eq!(first.response.num_tables(), 6);

    let second = coordinator.execute(query, 0).await.unwrap();
    assert_eq!(second.hit, HitKind::Full);
    assert_eq!(second.response.num_tables(), 6);
    assert_eq!(database.call_count(), 1);

    // subtables come back in canonical conjunction order
    let tags: Vec<String> = second
        .response
        .all_series()
        .map(|series| format!("{},{}", series.tags["location"], series.tags["randtag"]))
        .collect();
    assert_eq!(
        tags,
        vec![
            "coyote_creek,1",
            "coyote_creek,2",
            "coyote_creek,3",
            "santa_monica,1",
            "santa_monica,2",
            "santa_monica,3"
        ]
    );
}

#[tokio::test]
async fn cache_unavailable_degrades_to_direct_database() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::cpu_guest());
    let cache = Arc::new(MockCache {
        unavailable: true,
        ..Default::default()
    });
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);

    let query = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";
    let outcome = coordinator.execute(query, 0).await.unwrap();

    assert_eq!(outcome.hit, HitKind::Miss);
    assert_eq!(database.call_count(), 1);
    assert_eq!(cache.set_count(), 0, "no Set against an unavailable cache");
    assert_eq!(row_times(&outcome.response).len(), 4);
}

#[tokio::test]
async fn corrupt_cache_bytes_fall_back_to_the_database() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::cpu_guest());
    let coordinator = coordinator(Arc::clone(&database), Arc::new(CorruptCache));

    let query = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";
    let outcome = coordinator.execute(query, 0).await.unwrap();

    assert_eq!(outcome.hit, HitKind::Miss);
    assert_eq!(outcome.bytes_served, 0);
    assert_eq!(database.call_count(), 1);
}

#[tokio::test]
async fn database_error_carries_the_partial_cache_result() {
    test_helpers::maybe_start_logging();
    let cache = Arc::new(MockCache::default());

    // warm the cache with a working database
    {
        let database = Arc::new(MockDatabase::cpu_guest());
        let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);
        let warm = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:10Z' \
                    AND time < '2022-01-01T00:00:20Z' AND hostname='host_0'";
        coordinator.execute(warm, 0).await.unwrap();
    }

    let database = Arc::new(MockDatabase {
        fail: true,
        ..MockDatabase::cpu_guest()
    });
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);
    let query = "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' \
                 AND time < '2022-01-01T00:00:30Z' AND hostname='host_0'";
    let err = coordinator.execute(query, 0).await.unwrap_err();

    match err {
        cache_coordinator::Error::Database { partial, .. } => {
            let partial = partial.expect("cached rows must accompany the error");
            assert_eq!(row_times(&partial), vec![T0 + 10, T0 + 15]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(cache.set_count(), 1, "no write-back for the failed range");
}

#[tokio::test]
async fn unbounded_queries_bypass_the_cache() {
    test_helpers::maybe_start_logging();
    let database = Arc::new(MockDatabase::cpu_guest());
    let cache = Arc::new(MockCache::default());
    let coordinator = coordinator(Arc::clone(&database), Arc::clone(&cache) as Arc<dyn RangeCache>);

    let query =
        "SELECT usage_guest FROM cpu WHERE time >= '2022-01-01T00:00:00Z' AND hostname='host_0'";
    let outcome = coordinator.execute(query, 0).await.unwrap();
    assert_eq!(outcome.hit, HitKind::Miss);
    assert_eq!(cache.set_count(), 0);
    assert_eq!(database.call_count(), 1);
}
