//! A thin, timeout-bounded wrapper around the Redis connection manager.
//!
//! Every method here can fail, but per the error-handling design cache
//! failures are never surfaced past the router or optimizer: callers
//! convert `RouterError::CacheFailed` into a miss/no-op and log a
//! `warn`, which is exactly what [`crate::router::QueryRouter`] and
//! [`crate::optimizer::WriteOptimizer`] do.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::instrument;

use crate::cell::Row;
use crate::error::RouterError;

#[derive(Clone)]
pub struct Cache {
    manager: redis::aio::ConnectionManager,
    operation_timeout: Duration,
}

impl Cache {
    /// Connect to `redis_url`, bounding the connect attempt by
    /// `connect_timeout` and remembering `operation_timeout` for
    /// subsequent get/set/delete calls.
    #[instrument(skip_all, fields(redis.url = %redis_url))]
    pub async fn connect(
        redis_url: &str,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self, RouterError> {
        let client = redis::Client::open(redis_url).map_err(RouterError::CacheFailed)?;
        let manager = tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| RouterError::CacheFailed(timeout_error("connect")))?
            .map_err(RouterError::CacheFailed)?;
        Ok(Self {
            manager,
            operation_timeout,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_manager(manager: redis::aio::ConnectionManager, operation_timeout: Duration) -> Self {
        Self { manager, operation_timeout }
    }

    /// Fetch and decode rows previously stored under `key`. Returns
    /// `Ok(None)` on a cache miss; any I/O or decode failure is surfaced
    /// as `RouterError::CacheFailed` for the caller to log and swallow.
    #[instrument(skip(self))]
    pub async fn get_rows(&self, key: &str) -> Result<Option<Vec<Row>>, RouterError> {
        let mut conn = self.manager.clone();
        let payload: Option<String> = tokio::time::timeout(self.operation_timeout, conn.get(key))
            .await
            .map_err(|_| RouterError::CacheFailed(timeout_error("get")))?
            .map_err(RouterError::CacheFailed)?;

        match payload {
            None => Ok(None),
            Some(raw) => crate::cell::decode_rows(&raw)
                .map(Some)
                .map_err(|e| RouterError::CacheFailed(decode_error(&e))),
        }
    }

    /// Store `rows` under `key` with the given TTL.
    #[instrument(skip(self, rows))]
    pub async fn set_rows(&self, key: &str, rows: &[Row], ttl: Duration) -> Result<(), RouterError> {
        let payload = crate::cell::encode_rows(rows).map_err(|e| RouterError::CacheFailed(decode_error(&e)))?;
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        tokio::time::timeout(self.operation_timeout, conn.set_ex::<_, _, ()>(key, payload, ttl_secs))
            .await
            .map_err(|_| RouterError::CacheFailed(timeout_error("setex")))?
            .map_err(RouterError::CacheFailed)
    }

    /// Delete `key`. Used for hot-attribute invalidation after commit.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<(), RouterError> {
        let mut conn = self.manager.clone();
        tokio::time::timeout(self.operation_timeout, conn.del::<_, ()>(key))
            .await
            .map_err(|_| RouterError::CacheFailed(timeout_error("del")))?
            .map_err(RouterError::CacheFailed)
    }
}

fn timeout_error(op: &'static str) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "operation timed out", op.to_string()))
}

fn decode_error(e: &serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "failed to (de)serialize cached rows",
        e.to_string(),
    ))
}

/// Build the invalidation key for a (tenant, entity) pair. Shared between
/// the router's cache-read path and the optimizer's invalidation path so
/// the two can never disagree on the key shape.
pub fn entity_key(tenant_id: i64, entity_id: i64) -> String {
    format!("entity:{tenant_id}:{entity_id}")
}
