//! Process-wide schema metadata for the measurements a database exposes.
//!
//! The analyzer needs two things it cannot learn from query text alone:
//! which identifiers name tags (so predicates can be split into tag and
//! field predicates) and what datatype each field carries (so segments and
//! byte layouts are stable). Both are bulk-loaded once per database via the
//! `SHOW` metadata statements and treated as immutable afterwards, so
//! readers share a plain `Arc` with no locking.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use async_trait::async_trait;
use data_types::{DataType, Response};
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use tracing::debug;

/// Errors while loading schema metadata.
#[derive(Debug, Snafu)]
#[allow(missing_copy_implementations, missing_docs)]
pub enum Error {
    #[snafu(display("metadata query {:?} against {:?} failed: {}", query, database, source))]
    MetadataQuery {
        database: String,
        query: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("metadata query {:?} returned no usable rows", query))]
    EmptyMetadata { query: String },
}

/// Result with this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The seam through which the catalog issues its metadata queries.
///
/// Implemented by the database client; tests substitute canned responses.
#[async_trait]
pub trait MetadataSource: Debug + Send + Sync {
    /// Run one `SHOW ...` statement against `database` and return the raw
    /// tabular response.
    async fn metadata_query(
        &self,
        database: &str,
        query: &str,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>>;
}

/// Immutable per-database schema: measurement → tag keys/values and
/// measurement → field datatypes.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    /// measurement → tag key → known values, keys sorted.
    tags: HashMap<String, BTreeMap<String, Vec<String>>>,
    /// measurement → field name → datatype.
    fields: HashMap<String, HashMap<String, DataType>>,
}

impl SchemaCatalog {
    /// Load the catalog for `database` with the three bulk metadata
    /// statements: `SHOW TAG KEYS`, `SHOW TAG VALUES` per (measurement,
    /// key), and `SHOW FIELD KEYS`.
    pub async fn load(source: &dyn MetadataSource, database: &str) -> Result<Self> {
        let mut catalog = Self::default();

        let tag_keys_query = format!("SHOW TAG KEYS ON {}", database);
        let resp = run(source, database, &tag_keys_query).await?;
        let mut tag_keys: Vec<(String, String)> = Vec::new();
        for series in resp.all_series() {
            for row in &series.values {
                if let Some(key) = row.first().and_then(|c| c.as_str()) {
                    tag_keys.push((series.name.clone(), key.to_string()));
                }
            }
        }

        for (measurement, key) in tag_keys {
            let values_query = format!(
                "SHOW TAG VALUES ON {} FROM {} WITH KEY = \"{}\"",
                database, measurement, key
            );
            let resp = run(source, database, &values_query).await?;
            // rows are (key, value) pairs
            let values: Vec<String> = resp
                .all_series()
                .flat_map(|s| s.values.iter())
                .filter_map(|row| row.get(1).and_then(|c| c.as_str()).map(str::to_string))
                .collect();
            catalog
                .tags
                .entry(measurement)
                .or_default()
                .insert(key, values);
        }

        let field_keys_query = format!("SHOW FIELD KEYS ON {}", database);
        let resp = run(source, database, &field_keys_query).await?;
        for series in resp.all_series() {
            let fields = catalog.fields.entry(series.name.clone()).or_default();
            for row in &series.values {
                let name = row.first().and_then(|c| c.as_str());
                let datatype = row.get(1).and_then(|c| c.as_str());
                if let (Some(name), Some(datatype)) = (name, datatype) {
                    // unreported or exotic types degrade to string, which
                    // still round-trips through the 25-byte slots
                    let datatype = DataType::parse(datatype).unwrap_or(DataType::Str);
                    fields.insert(name.to_string(), datatype);
                }
            }
        }

        debug!(
            database,
            measurements = catalog.fields.len(),
            "schema catalog loaded"
        );
        Ok(catalog)
    }

    /// Is `measurement` known at all?
    pub fn has_measurement(&self, measurement: &str) -> bool {
        self.fields.contains_key(measurement) || self.tags.contains_key(measurement)
    }

    /// Is `name` a tag key of `measurement`?
    pub fn is_tag(&self, measurement: &str, name: &str) -> bool {
        self.tags
            .get(measurement)
            .map(|keys| keys.contains_key(name))
            .unwrap_or(false)
    }

    /// All known values of one tag.
    pub fn tag_values(&self, measurement: &str, tag_key: &str) -> Option<&[String]> {
        self.tags
            .get(measurement)
            .and_then(|keys| keys.get(tag_key))
            .map(Vec::as_slice)
    }

    /// Sorted tag keys of a measurement.
    pub fn tag_keys(&self, measurement: &str) -> Vec<&str> {
        self.tags
            .get(measurement)
            .map(|keys| keys.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Declared datatype of a field, if known.
    pub fn field_type(&self, measurement: &str, field: &str) -> Option<DataType> {
        self.fields
            .get(measurement)
            .and_then(|fields| fields.get(field))
            .copied()
    }

    /// Field names of a measurement, sorted. This is the expansion of an
    /// aggregated wildcard selection.
    pub fn field_names_sorted(&self, measurement: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .get(measurement)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Field and tag names of a measurement, sorted and deduplicated. This
    /// is the expansion of a bare wildcard selection, where the database
    /// reports tags as string columns.
    pub fn column_names_sorted(&self, measurement: &str) -> Vec<String> {
        let mut names = self.field_names_sorted(measurement);
        names.extend(self.tag_keys(measurement).into_iter().map(str::to_string));
        names.sort();
        names.dedup();
        names
    }

    /// Build a catalog from literal parts, for wiring tests and static
    /// deployments.
    pub fn builder() -> SchemaCatalogBuilder {
        SchemaCatalogBuilder::default()
    }
}

async fn run(source: &dyn MetadataSource, database: &str, query: &str) -> Result<Response> {
    let resp = source
        .metadata_query(database, query)
        .await
        .context(MetadataQuerySnafu { database, query })?;
    resp.all_series()
        .next()
        .context(EmptyMetadataSnafu { query })?;
    Ok(resp)
}

/// Incremental construction of a [`SchemaCatalog`].
#[derive(Debug, Default)]
pub struct SchemaCatalogBuilder {
    catalog: SchemaCatalog,
}

impl SchemaCatalogBuilder {
    /// Register a tag and its value domain.
    pub fn tag(
        mut self,
        measurement: &str,
        key: &str,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.catalog
            .tags
            .entry(measurement.to_string())
            .or_default()
            .insert(key.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Register a field and its datatype.
    pub fn field(mut self, measurement: &str, name: &str, datatype: DataType) -> Self {
        self.catalog
            .fields
            .entry(measurement.to_string())
            .or_default()
            .insert(name.to_string(), datatype);
        self
    }

    /// Finish the catalog.
    pub fn build(self) -> SchemaCatalog {
        self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_types::{Cell, Series};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct CannedSource {
        queries: Mutex<Vec<String>>,
    }

    fn rows(rows: &[&[&str]]) -> Vec<Vec<Cell>> {
        rows.iter()
            .map(|row| row.iter().map(|v| Cell::Str(v.to_string())).collect())
            .collect()
    }

    fn series(name: &str, values: Vec<Vec<Cell>>) -> Series {
        Series {
            name: name.to_string(),
            columns: vec![],
            values,
            ..Default::default()
        }
    }

    #[async_trait]
    impl MetadataSource for CannedSource {
        async fn metadata_query(
            &self,
            _database: &str,
            query: &str,
        ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
            self.queries.lock().push(query.to_string());
            let resp = if query.starts_with("SHOW TAG KEYS") {
                Response::from_series(vec![
                    series("cpu", rows(&[&["hostname"], &["region"]])),
                    series("h2o_quality", rows(&[&["location"], &["randtag"]])),
                ])
            } else if query.contains("WITH KEY = \"hostname\"") {
                Response::from_series(vec![series(
                    "cpu",
                    rows(&[&["hostname", "host_0"], &["hostname", "host_1"]]),
                )])
            } else if query.contains("WITH KEY = \"region\"") {
                Response::from_series(vec![series("cpu", rows(&[&["region", "us-west-2"]]))])
            } else if query.contains("WITH KEY = \"location\"") {
                Response::from_series(vec![series(
                    "h2o_quality",
                    rows(&[&["location", "coyote_creek"], &["location", "santa_monica"]]),
                )])
            } else if query.contains("WITH KEY = \"randtag\"") {
                Response::from_series(vec![series(
                    "h2o_quality",
                    rows(&[&["randtag", "1"], &["randtag", "2"], &["randtag", "3"]]),
                )])
            } else {
                Response::from_series(vec![
                    series(
                        "cpu",
                        rows(&[&["usage_guest", "float"], &["usage_user", "float"]]),
                    ),
                    series("h2o_quality", rows(&[&["index", "integer"]])),
                ])
            };
            Ok(resp)
        }
    }

    #[tokio::test]
    async fn load_builds_both_maps() {
        let source = CannedSource::default();
        let catalog = SchemaCatalog::load(&source, "benchmark").await.unwrap();

        assert!(catalog.has_measurement("cpu"));
        assert!(catalog.is_tag("cpu", "hostname"));
        assert!(!catalog.is_tag("cpu", "usage_guest"));
        assert_eq!(
            catalog.tag_values("cpu", "hostname").unwrap(),
            &["host_0".to_string(), "host_1".to_string()]
        );
        assert_eq!(
            catalog.field_type("cpu", "usage_guest"),
            Some(DataType::Float64)
        );
        assert_eq!(
            catalog.field_type("h2o_quality", "index"),
            Some(DataType::Int64)
        );
        assert_eq!(catalog.tag_keys("h2o_quality"), vec!["location", "randtag"]);

        // one TAG KEYS + four TAG VALUES + one FIELD KEYS
        assert_eq!(source.queries.lock().len(), 6);
    }

    #[test]
    fn wildcard_expansions() {
        let catalog = SchemaCatalog::builder()
            .tag("cpu", "hostname", ["host_0"])
            .field("cpu", "usage_user", DataType::Float64)
            .field("cpu", "usage_guest", DataType::Float64)
            .build();

        assert_eq!(
            catalog.field_names_sorted("cpu"),
            vec!["usage_guest", "usage_user"]
        );
        assert_eq!(
            catalog.column_names_sorted("cpu"),
            vec!["hostname", "usage_guest", "usage_user"]
        );
    }

    #[test]
    fn unknown_measurement_is_absent() {
        let catalog = SchemaCatalog::default();
        assert!(!catalog.has_measurement("cpu"));
        assert_eq!(catalog.field_type("cpu", "usage_user"), None);
        assert!(catalog.tag_values("cpu", "hostname").is_none());
    }
}
