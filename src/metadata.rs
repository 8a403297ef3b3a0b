//! Provenance metadata produced by every read, and the pure mapping from
//! that metadata to transport-layer header values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which backend actually served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Primary,
    Replica,
    Cache,
    Warehouse,
}

impl DataSource {
    /// The exact token used in the `X-Data-Source` header.
    pub fn as_token(self) -> &'static str {
        match self {
            DataSource::Primary => "primary",
            DataSource::Replica => "replica",
            DataSource::Cache => "redis",
            DataSource::Warehouse => "redshift",
        }
    }
}

/// Requested (or, on fallback, effective) read consistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// Primary only, zero lag.
    Strong,
    /// Replica acceptable when lag is within bound, else primary.
    Eventual,
    /// Warehouse; routed to primary when unwired (see DESIGN.md).
    Analytics,
}

impl ConsistencyLevel {
    pub fn as_token(self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "strong",
            ConsistencyLevel::Eventual => "eventual",
            ConsistencyLevel::Analytics => "analytics",
        }
    }
}

/// Provenance of a single read: where it came from, how stale it was, and
/// under what consistency level it was served. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub source: DataSource,
    pub lag_ms: u64,
    pub sampled_at_epoch_s: i64,
    pub consistency: ConsistencyLevel,
}

impl QueryMetadata {
    pub fn new(
        source: DataSource,
        lag_ms: u64,
        sampled_at_epoch_s: i64,
        consistency: ConsistencyLevel,
    ) -> Self {
        Self {
            source,
            lag_ms,
            sampled_at_epoch_s,
            consistency,
        }
    }
}

/// Produce the five transport-layer header values for a read's
/// provenance. A pure function: equal inputs always produce identical
/// output maps.
pub fn headers(metadata: &QueryMetadata) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("X-Data-Source", metadata.source.as_token().to_string());
    map.insert(
        "X-Data-Lag-Seconds",
        format!("{:.3}", metadata.lag_ms as f64 / 1000.0),
    );
    map.insert(
        "X-Consistency-Level",
        metadata.consistency.as_token().to_string(),
    );
    map.insert(
        "X-Data-Timestamp",
        metadata.sampled_at_epoch_s.to_string(),
    );
    map.insert(
        "X-Cache-Hit",
        (metadata.source == DataSource::Cache).to_string(),
    );
    map
}
