//! Owns the pooled handles for the primary, each replica, the cache, and
//! (optionally) the warehouse, and tracks per-replica lag.
//!
//! An `EndpointRegistry` is built once at process startup and passed by
//! reference (or as a shared `Arc`) to the router and optimizer — never
//! reached through ambient/global state.

pub mod lag;

use std::sync::Arc;
use std::time::Duration;

use sqlx::Row as _;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::error::RouterError;
use crate::metadata::DataSource;
use lag::{LagVector, Selection, UNAVAILABLE_LAG_MS};

/// A connection acquired on behalf of a read, together with the
/// provenance it was acquired under.
pub struct AcquiredConnection {
    pub conn: PoolConnection<Postgres>,
    pub role: DataSource,
    pub replica_index: i32,
    pub lag_ms: u64,
}

pub struct EndpointRegistry {
    primary: PgPool,
    replicas: Vec<PgPool>,
    cache: Cache,
    /// The warehouse driver is an external collaborator (out of scope);
    /// `None` means "unwired", in which case `Analytics` reads route to
    /// primary instead.
    warehouse: Option<PgPool>,
    lag: LagVector,
}

impl EndpointRegistry {
    /// Connect every endpoint named in `config` and build the registry.
    #[instrument(skip_all, fields(replicas = config.replica_hosts.len()))]
    pub async fn connect(config: &Config) -> Result<Self, RouterError> {
        let primary = PgPoolOptions::new()
            .min_connections(config.primary_pool_min)
            .max_connections(config.primary_pool_max)
            .connect(&config.primary_dsn())
            .await
            .map_err(|source| RouterError::ConnectFailed {
                endpoint: "primary",
                source,
            })?;

        let mut replicas = Vec::with_capacity(config.replica_hosts.len());
        for host in &config.replica_hosts {
            let pool = PgPoolOptions::new()
                .min_connections(config.replica_pool_min)
                .max_connections(config.replica_pool_max)
                .connect(&config.replica_dsn(host))
                .await
                .map_err(|source| RouterError::ConnectFailed {
                    endpoint: "replica",
                    source,
                })?;
            replicas.push(pool);
        }

        let cache = Cache::connect(
            &config.cache_url(),
            config.cache_connect_timeout,
            config.cache_operation_timeout,
        )
        .await?;

        Ok(Self::new(
            primary,
            replicas,
            cache,
            None,
            config.lag_check_interval,
        ))
    }

    /// Build a registry from already-connected endpoints. Used by
    /// `connect` and directly by integration tests that wire
    /// `testcontainers`-backed pools.
    pub fn new(
        primary: PgPool,
        replicas: Vec<PgPool>,
        cache: Cache,
        warehouse: Option<PgPool>,
        lag_check_interval: Duration,
    ) -> Self {
        let lag = LagVector::new(replicas.len(), lag_check_interval);
        Self {
            primary,
            replicas,
            cache,
            warehouse,
            lag,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn warehouse(&self) -> Option<&PgPool> {
        self.warehouse.as_ref()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Acquire a connection to the primary. Blocks under pool exhaustion
    /// per pool policy; never fails silently.
    #[instrument(skip(self))]
    pub async fn acquire_primary(&self) -> Result<PoolConnection<Postgres>, RouterError> {
        self.primary.acquire().await.map_err(|e| classify_acquire_error(e, "primary"))
    }

    /// Select and acquire a replica under `max_lag_ms`, or fall back to
    /// the primary when none qualify.
    #[instrument(skip(self))]
    pub async fn acquire_replica(&self, max_lag_ms: u64) -> Result<AcquiredConnection, RouterError> {
        let lags = self.lag.snapshot();
        match lag::select_replica(&lags, max_lag_ms) {
            Selection::Replica { index, lag_ms } => {
                let pool = self
                    .replicas
                    .get(index)
                    .ok_or(RouterError::InvalidArgument)?;
                let conn = pool
                    .acquire()
                    .await
                    .map_err(|e| classify_acquire_error(e, "replica"))?;
                Ok(AcquiredConnection {
                    conn,
                    role: DataSource::Replica,
                    replica_index: i32::try_from(index).unwrap_or(i32::MAX),
                    lag_ms,
                })
            }
            Selection::Primary => {
                let conn = self.acquire_primary().await?;
                Ok(AcquiredConnection {
                    conn,
                    role: DataSource::Primary,
                    replica_index: -1,
                    lag_ms: 0,
                })
            }
        }
    }

    /// Release a connection acquired via [`Self::acquire_replica`] back
    /// to its originating pool. The actual release happens on `Drop`;
    /// this only controls *when* that drop occurs.
    pub fn release(&self, acquired: AcquiredConnection) {
        drop(acquired.conn);
    }

    /// Refresh the lag vector from the heartbeat table, throttled to at
    /// most one run per `lag_check_interval_s`. A no-op (and `Ok(())`)
    /// when called again within the interval.
    #[instrument(skip(self))]
    pub async fn refresh_lag(&self) -> Result<(), RouterError> {
        if self.replicas.is_empty() {
            return Ok(());
        }

        let now = now_epoch_ms();
        if !self.lag.try_claim_refresh(now) {
            debug!("refresh_lag skipped: within throttle interval");
            return Ok(());
        }

        let mut primary_conn = self.acquire_primary().await?;
        let primary_ts: f64 = sqlx::query(
            "SELECT EXTRACT(EPOCH FROM clock_timestamp()) * 1000",
        )
        .fetch_one(&mut *primary_conn)
        .await
        .map_err(RouterError::QueryFailed)?
        .try_get(0)
        .map_err(RouterError::QueryFailed)?;
        drop(primary_conn);

        for (index, pool) in self.replicas.iter().enumerate() {
            match self.measure_one_replica(pool, primary_ts).await {
                Ok(lag_ms) => self.lag.set(index, lag_ms),
                Err(err) => {
                    warn!(replica = index, error = %err, "replica lag check failed");
                    self.lag.mark_unavailable(index);
                }
            }
        }

        Ok(())
    }

    async fn measure_one_replica(&self, pool: &PgPool, primary_ts_ms: f64) -> Result<u64, RouterError> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| classify_acquire_error(e, "replica"))?;

        let replica_ts: Option<f64> = sqlx::query(
            r"
            SELECT EXTRACT(EPOCH FROM timestamp) * 1000
            FROM replication_heartbeat
            WHERE source = 'primary'
            ORDER BY timestamp DESC
            LIMIT 1
            ",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(RouterError::QueryFailed)?
        .map(|row| row.try_get(0))
        .transpose()
        .map_err(RouterError::QueryFailed)?;

        drop(conn);

        let Some(replica_ts_ms) = replica_ts else {
            return Ok(UNAVAILABLE_LAG_MS);
        };

        let lag_ms = primary_ts_ms - replica_ts_ms;
        Ok(if lag_ms.is_sign_negative() { 0 } else { lag_ms as u64 })
    }
}

fn classify_acquire_error(source: sqlx::Error, endpoint: &'static str) -> RouterError {
    if matches!(source, sqlx::Error::PoolTimedOut) {
        RouterError::PoolExhausted { endpoint }
    } else {
        RouterError::ConnectFailed { endpoint, source }
    }
}

fn now_epoch_ms() -> i64 {
    i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(i64::MAX)
}

/// Shared-ownership handle, the shape in which the registry is typically
/// passed to many concurrent request workers.
pub type SharedRegistry = Arc<EndpointRegistry>;
