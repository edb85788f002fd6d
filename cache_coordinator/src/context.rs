//! [`CoreContext`]: every collaborator a coordinator needs, wired once at
//! startup and carried by value into the pipeline.

use crate::{ConnectionPool, DynError, Error, Result};
use async_trait::async_trait;
use data_types::{Response, TimeRange};
use parking_lot::RwLock;
use schema_catalog::{MetadataSource, SchemaCatalog};
use snafu::ResultExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::info;

/// A cache `get` that found something.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The value bytes inside the asked window.
    pub value: Vec<u8>,
    /// Per-subtable sub-ranges of the window the value covers.
    pub matched: Vec<TimeRange>,
}

/// A cache `set`.
#[derive(Debug, Clone)]
pub struct CacheItem<'a> {
    /// Full semantic segment.
    pub key: &'a str,
    /// Encoded bytes.
    pub value: Vec<u8>,
    /// The half-open window the bytes cover.
    pub window: TimeRange,
    /// Number of subtables inside the bytes.
    pub num_tables: i64,
}

/// The seam to the external range-aware cache.
#[async_trait]
pub trait RangeCache: Debug + Send + Sync {
    /// Fetch `key` within `window`; `None` is a miss.
    async fn get(&self, key: &str, window: TimeRange) -> Result<Option<CacheHit>, DynError>;

    /// Store an item against the window it covers.
    async fn set(&self, item: CacheItem<'_>) -> Result<(), DynError>;
}

#[async_trait]
impl RangeCache for stscache_client::Client {
    async fn get(&self, key: &str, window: TimeRange) -> Result<Option<CacheHit>, DynError> {
        match Self::get(self, key, window.start, window.end).await {
            Ok(result) => Ok(Some(CacheHit {
                value: result.value,
                matched: result.matched,
            })),
            Err(stscache_client::Error::CacheMiss) => Ok(None),
            Err(error) => Err(Box::new(error)),
        }
    }

    async fn set(&self, item: CacheItem<'_>) -> Result<(), DynError> {
        Self::set(
            self,
            &stscache_client::Item {
                key: item.key.to_string(),
                value: item.value,
                time_start: item.window.start,
                time_end: item.window.end,
                num_tables: item.num_tables,
                ..Default::default()
            },
        )
        .await
        .map_err(|error| Box::new(error) as DynError)
    }
}

/// The seam to the time-series database.
#[async_trait]
pub trait Database: Debug + Send + Sync {
    /// Run one query in epoch-second precision.
    async fn query(&self, command: &str, database: &str) -> Result<Response, DynError>;
}

#[async_trait]
impl Database for influxdb_client::Client {
    async fn query(&self, command: &str, database: &str) -> Result<Response, DynError> {
        Self::query(self, &influxdb_client::Query::new(command, database))
            .await
            .map_err(|error| Box::new(error) as DynError)
    }
}

/// Everything one query execution needs. Immutable after startup except
/// for the two documented shared-state exceptions: the template memo
/// (read-biased lock) and the catalog slot (write-once per load).
#[derive(Debug)]
pub struct CoreContext {
    database_name: String,
    databases: ConnectionPool<dyn Database>,
    caches: ConnectionPool<dyn RangeCache>,
    metadata: Option<Arc<dyn MetadataSource>>,
    catalog: RwLock<Arc<SchemaCatalog>>,
    templates: RwLock<HashMap<String, String>>,
}

impl CoreContext {
    /// Start building a context.
    pub fn builder() -> CoreContextBuilder {
        CoreContextBuilder::default()
    }

    /// The logical database queries run against.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// The database handle for `worker`.
    pub fn database_for(&self, worker: usize) -> Arc<dyn Database> {
        Arc::clone(self.databases.handle_for(worker))
    }

    /// The cache handle for `worker`.
    pub fn cache_for(&self, worker: usize) -> Arc<dyn RangeCache> {
        Arc::clone(self.caches.handle_for(worker))
    }

    /// A snapshot of the current schema catalog.
    pub fn catalog(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.catalog.read())
    }

    /// (Re)load the schema catalog from the metadata source.
    pub async fn load_catalog(&self) -> Result<()> {
        let metadata = self.metadata.as_ref().ok_or(Error::NoMetadataSource)?;
        let catalog = SchemaCatalog::load(metadata.as_ref(), &self.database_name)
            .await
            .context(crate::CatalogLoadSnafu)?;
        info!(database = self.database_name.as_str(), "schema catalog (re)loaded");
        *self.catalog.write() = Arc::new(catalog);
        Ok(())
    }

    /// The memoized segment for `template`, or `None` when the template is
    /// new. Readers proceed in parallel.
    pub fn memoized_segment(&self, template: &str) -> Option<String> {
        self.templates.read().get(template).cloned()
    }

    /// Memoize `template → segment`. A writer blocks only when a new
    /// template shows up.
    pub fn memoize_segment(&self, template: &str, segment: &str) {
        self.templates
            .write()
            .entry(template.to_string())
            .or_insert_with(|| segment.to_string());
    }

    /// Number of memoized templates.
    pub fn template_count(&self) -> usize {
        self.templates.read().len()
    }
}

/// Builder for [`CoreContext`].
#[derive(Debug, Default)]
pub struct CoreContextBuilder {
    database_name: String,
    databases: Vec<Arc<dyn Database>>,
    caches: Vec<Arc<dyn RangeCache>>,
    metadata: Option<Arc<dyn MetadataSource>>,
    catalog: Option<SchemaCatalog>,
}

impl CoreContextBuilder {
    /// Set the logical database name.
    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    /// Add one database handle.
    pub fn add_database(mut self, database: Arc<dyn Database>) -> Self {
        self.databases.push(database);
        self
    }

    /// Add one cache handle.
    pub fn add_cache(mut self, cache: Arc<dyn RangeCache>) -> Self {
        self.caches.push(cache);
        self
    }

    /// Set the metadata source the catalog loads from.
    pub fn metadata_source(mut self, metadata: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Seed the catalog directly (tests, static deployments).
    pub fn catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Finish the context. At least one database and one cache handle are
    /// required.
    pub fn build(self) -> Result<CoreContext, &'static str> {
        if self.databases.is_empty() {
            return Err("at least one database handle is required");
        }
        if self.caches.is_empty() {
            return Err("at least one cache handle is required");
        }
        Ok(CoreContext {
            database_name: self.database_name,
            databases: ConnectionPool::new(self.databases),
            caches: ConnectionPool::new(self.caches),
            metadata: self.metadata,
            catalog: RwLock::new(Arc::new(self.catalog.unwrap_or_default())),
            templates: RwLock::new(HashMap::new()),
        })
    }
}
