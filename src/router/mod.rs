//! The query router: executes a read under a declared consistency level,
//! applying tenant isolation, cache consultation, replica selection, and
//! circuit-breaker fallback.

pub mod breaker;

use std::time::Duration;

use sqlx::Connection;
use sqlx::pool::PoolConnection;
use sqlx::postgres::Postgres;
use tracing::{instrument, warn};

use crate::cache::entity_key;
use crate::cell::{row_to_cells, Row};
use crate::error::RouterError;
use crate::metadata::{ConsistencyLevel, DataSource, QueryMetadata};
use crate::registry::{AcquiredConnection, EndpointRegistry};
use breaker::CircuitBreaker;

/// A dynamically-typed bind parameter, so `execute` can accept a query
/// whose parameter shape is not known at compile time.
#[derive(Debug, Clone)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

pub struct QueryRouter<'a> {
    registry: &'a EndpointRegistry,
    breaker: CircuitBreaker,
    max_replica_lag_ms: u64,
}

impl<'a> QueryRouter<'a> {
    pub fn new(registry: &'a EndpointRegistry, circuit_breaker_threshold: u32, max_replica_lag_ms: u64) -> Self {
        Self {
            registry,
            breaker: CircuitBreaker::new(circuit_breaker_threshold),
            max_replica_lag_ms,
        }
    }

    /// Execute `query` under `consistency`, enforcing tenant isolation
    /// and consulting the cache first when eligible.
    #[instrument(skip(self, params), fields(consistency = ?consistency))]
    pub async fn execute(
        &self,
        query: &str,
        params: &[QueryParam],
        tenant_id: Option<i64>,
        consistency: ConsistencyLevel,
        cache_key: Option<&str>,
        cache_ttl: Duration,
    ) -> Result<(Vec<Row>, QueryMetadata), RouterError> {
        let Some(tenant_id) = tenant_id else {
            return Err(RouterError::InvalidArgument);
        };

        if let Some(key) = cache_key
            && consistency == ConsistencyLevel::Eventual
            && let Some(rows) = self.probe_cache(key).await
        {
            let metadata = QueryMetadata::new(DataSource::Cache, 0, now_epoch_s(), ConsistencyLevel::Eventual);
            return Ok((rows, metadata));
        }

        let acquired = match self.acquire_for(consistency).await {
            Ok(acquired) => acquired,
            Err(err) => {
                warn!(error = %err, ?consistency, "backend acquisition failed");
                if !err.counts_as_breaker_failure() || !self.breaker.record_failure() {
                    return Err(err);
                }
                return self.fallback_to_primary(tenant_id, query, params).await;
            }
        };
        let role = acquired.role;
        let replica_index = acquired.replica_index;
        let lag_ms = acquired.lag_ms;
        let mut conn = acquired.conn;

        match execute_on(tenant_id, query, params, &mut conn).await {
            Ok(rows) => {
                drop(conn);
                self.breaker.record_success();
                if let (Some(key), ConsistencyLevel::Eventual) = (cache_key, consistency) {
                    self.populate_cache(key, &rows, cache_ttl).await;
                }
                let metadata = QueryMetadata::new(role, lag_ms, now_epoch_s(), consistency);
                Ok((rows, metadata))
            }
            Err(err) => {
                warn!(error = %err, ?role, replica_index, "query execution failed");

                // Release the failed connection to its own pool *before*
                // acquiring primary, regardless of whether this trips
                // the breaker.
                drop(conn);

                if !err.counts_as_breaker_failure() || !self.breaker.record_failure() {
                    return Err(err);
                }

                self.fallback_to_primary(tenant_id, query, params).await
            }
        }
    }

    /// Retry once against primary after the breaker trips, whether that
    /// was triggered by a failed backend acquisition or a failed query
    /// execution. A success here fully closes the breaker.
    async fn fallback_to_primary(
        &self,
        tenant_id: i64,
        query: &str,
        params: &[QueryParam],
    ) -> Result<(Vec<Row>, QueryMetadata), RouterError> {
        let mut fallback_conn = self.registry.acquire_primary().await?;
        let rows = execute_on(tenant_id, query, params, &mut fallback_conn).await?;
        drop(fallback_conn);
        self.breaker.record_success();

        let metadata = QueryMetadata::new(DataSource::Primary, 0, now_epoch_s(), ConsistencyLevel::Strong);
        Ok((rows, metadata))
    }

    async fn acquire_for(&self, consistency: ConsistencyLevel) -> Result<AcquiredConnection, RouterError> {
        match consistency {
            ConsistencyLevel::Strong => Ok(AcquiredConnection {
                conn: self.registry.acquire_primary().await?,
                role: DataSource::Primary,
                replica_index: -1,
                lag_ms: 0,
            }),
            ConsistencyLevel::Eventual => self.registry.acquire_replica(self.max_replica_lag_ms).await,
            ConsistencyLevel::Analytics => Ok(AcquiredConnection {
                conn: self.registry.acquire_primary().await?,
                role: DataSource::Primary,
                replica_index: -1,
                lag_ms: 0,
            }),
        }
    }

    async fn probe_cache(&self, key: &str) -> Option<Vec<Row>> {
        match self.registry.cache().get_rows(key).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, key, "cache probe failed, treating as miss");
                None
            }
        }
    }

    async fn populate_cache(&self, key: &str, rows: &[Row], ttl: Duration) {
        if let Err(err) = self.registry.cache().set_rows(key, rows, ttl).await {
            warn!(error = %err, key, "cache write failed, ignoring");
        }
    }
}

async fn execute_on(
    tenant_id: i64,
    query: &str,
    params: &[QueryParam],
    conn: &mut PoolConnection<Postgres>,
) -> Result<Vec<Row>, RouterError> {
    let mut tx = conn.begin().await.map_err(RouterError::QueryFailed)?;

    sqlx::query("SELECT set_config('app.current_tenant_id', $1, true)")
        .bind(tenant_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(RouterError::QueryFailed)?;

    let mut built = sqlx::query(query);
    for param in params {
        built = match param {
            QueryParam::Null => built.bind(Option::<i64>::None),
            QueryParam::Bool(v) => built.bind(*v),
            QueryParam::Int(v) => built.bind(*v),
            QueryParam::Float(v) => built.bind(*v),
            QueryParam::Text(v) => built.bind(v.clone()),
        };
    }

    let pg_rows = built.fetch_all(&mut *tx).await.map_err(RouterError::QueryFailed)?;
    let rows = pg_rows
        .iter()
        .map(row_to_cells)
        .collect::<Result<Vec<_>, _>>()?;

    tx.commit().await.map_err(RouterError::QueryFailed)?;
    Ok(rows)
}

/// Produce the five provenance header values for `metadata`. Re-exported
/// here so callers of [`QueryRouter::execute`] don't need a separate
/// import for the common case.
pub use crate::metadata::headers;

fn now_epoch_s() -> i64 {
    chrono::Utc::now().timestamp()
}
