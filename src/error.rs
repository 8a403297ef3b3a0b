//! Error taxonomy for the router, registry, and write optimizer.
//!
//! Each variant corresponds to a row in the error-handling table: callers
//! that need to distinguish "retryable against primary" from "never
//! surfaced" match on the variant rather than a string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// A tenant-scoped read was requested without a tenant identifier.
    /// Non-retryable; raised before any connection is acquired.
    #[error("tenant_id is required for a tenant-scoped query")]
    InvalidArgument,

    /// The pool for `endpoint` had no capacity within its acquire timeout.
    #[error("connection pool exhausted acquiring {endpoint}")]
    PoolExhausted { endpoint: &'static str },

    /// Failed to establish or acquire a connection to `endpoint`.
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A statement failed after a connection was successfully acquired.
    #[error("query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// Cache I/O failed. Never surfaced to callers of the router or
    /// optimizer; kept only so internal call sites can log the cause.
    #[error("cache operation failed: {0}")]
    CacheFailed(#[source] redis::RedisError),

    /// The lag check for a single replica failed; the replica is marked
    /// unavailable and the overall `refresh_lag` call still succeeds.
    #[error("lag check failed for replica {index}: {source}")]
    LagCheckFailed { index: usize, source: sqlx::Error },

    /// Bulk-copy into the staging table failed.
    #[error("bulk copy into staging table failed: {0}")]
    CopyFailed(#[source] sqlx::Error),

    /// The staging-to-partition drain procedure failed.
    #[error("drain failed: {0}")]
    DrainFailed(#[source] sqlx::Error),
}

impl RouterError {
    /// Whether this error should increment the circuit-breaker counter.
    /// `InvalidArgument` is excluded: it never reaches the point where a
    /// connection was attempted.
    pub fn counts_as_breaker_failure(&self) -> bool {
        !matches!(self, RouterError::InvalidArgument)
    }
}
