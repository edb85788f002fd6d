//! A reference schema catalog mirroring the benchmark databases, for use by
//! tests across the workspace.

use crate::QueryAnalyzer;
use data_types::DataType;
use schema_catalog::SchemaCatalog;
use std::sync::Arc;

/// A catalog covering the `cpu`, `h2o_quality` and `h2o_feet` measurements
/// with the tag domains the benchmark datasets use.
pub fn benchmark_catalog() -> SchemaCatalog {
    SchemaCatalog::builder()
        .tag("cpu", "hostname", ["host_0", "host_1", "host_2", "host_3"])
        .tag("cpu", "region", ["eu-central-1", "us-west-2"])
        .field("cpu", "usage_guest", DataType::Float64)
        .field("cpu", "usage_guest_nice", DataType::Float64)
        .field("cpu", "usage_nice", DataType::Float64)
        .field("cpu", "usage_system", DataType::Float64)
        .field("cpu", "usage_user", DataType::Float64)
        .tag("h2o_quality", "location", ["coyote_creek", "santa_monica"])
        .tag("h2o_quality", "randtag", ["1", "2", "3"])
        .field("h2o_quality", "index", DataType::Int64)
        .tag("h2o_feet", "location", ["coyote_creek", "santa_monica"])
        .field("h2o_feet", "water_level", DataType::Float64)
        .field("h2o_feet", "level description", DataType::Str)
        .build()
}

/// An analyzer over [`benchmark_catalog`].
pub fn analyzer() -> QueryAnalyzer {
    QueryAnalyzer::new(Arc::new(benchmark_catalog()))
}
