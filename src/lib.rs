//! Tenant-isolated query router and write optimizer for a multi-tier
//! (primary / replica / cache / warehouse) data platform.
//!
//! See [`router::QueryRouter`] for reads and [`optimizer::WriteOptimizer`]
//! for the bulk-ingest and hot-attribute write paths. Both borrow a
//! [`registry::EndpointRegistry`], which owns the pooled connections and
//! the replica lag vector.

pub mod cache;
pub mod cell;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod optimizer;
pub mod registry;
pub mod router;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = if let Some(hash) = built_info::GIT_COMMIT_HASH {
    hash
} else {
    ":-("
};

pub use cell::{Cell, Row};
pub use config::Config;
pub use error::RouterError;
pub use metadata::{ConsistencyLevel, DataSource, QueryMetadata};
pub use registry::EndpointRegistry;
pub use router::QueryRouter;
