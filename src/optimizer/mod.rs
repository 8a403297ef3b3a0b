//! The write optimizer: bulk-ingests telemetry through a staging table via
//! the `COPY` wire protocol with a throttled inline drain, and upserts hot
//! attributes with synchronous cache invalidation.

pub mod copy;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use sqlx::Connection;
use tracing::{debug, instrument, warn};

use crate::cache::entity_key;
use crate::error::RouterError;
use crate::registry::EndpointRegistry;
use copy::{encode_batch, TelemetryEvent, STAGING_COLUMNS, STAGING_TABLE};

pub struct WriteOptimizer<'a> {
    registry: &'a EndpointRegistry,
    flush_batch_size: i64,
    /// Epoch-ms of the last claimed drain attempt, throttled the same way
    /// `LagVector::try_claim_refresh` throttles lag checks.
    last_drain_claim_epoch_ms: AtomicI64,
    flush_interval_ms: i64,
}

impl<'a> WriteOptimizer<'a> {
    pub fn new(registry: &'a EndpointRegistry, flush_interval: Duration, flush_batch_size: i64) -> Self {
        Self {
            registry,
            flush_batch_size,
            last_drain_claim_epoch_ms: AtomicI64::new(i64::MIN / 2),
            flush_interval_ms: i64::try_from(flush_interval.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Bulk-copy `events` into the staging table via `COPY ... FROM
    /// STDIN`, then — throttled to at most one run per configured flush
    /// interval — drain the staging table into its destination partitions
    /// in the same transaction. Returns the number of rows copied.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn ingest_telemetry(&self, events: &[TelemetryEvent]) -> Result<u64, RouterError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.registry.acquire_primary().await?;
        let mut tx = conn.begin().await.map_err(RouterError::QueryFailed)?;

        let copy_statement = format!(
            "COPY {STAGING_TABLE} ({}) FROM STDIN WITH (FORMAT text)",
            STAGING_COLUMNS.join(", ")
        );
        let mut writer = tx.copy_in_raw(&copy_statement).await.map_err(RouterError::CopyFailed)?;
        let payload = encode_batch(events);
        writer.send(payload).await.map_err(RouterError::CopyFailed)?;
        let rows_copied = writer.finish().await.map_err(RouterError::CopyFailed)?;

        let now = now_epoch_ms();
        if should_attempt_drain(&self.last_drain_claim_epoch_ms, self.flush_interval_ms, now) {
            sqlx::query("SELECT stage_flush($1)")
                .bind(self.flush_batch_size)
                .execute(&mut *tx)
                .await
                .map_err(RouterError::DrainFailed)?;
            commit_drain_claim(&self.last_drain_claim_epoch_ms, now);
        } else {
            debug!("staging drain skipped: within throttle interval");
        }

        tx.commit().await.map_err(RouterError::QueryFailed)?;
        drop(conn);
        Ok(rows_copied)
    }

    /// Apply a hot-path attribute write directly (bypassing the staging
    /// table), then invalidate the cached entity snapshot. Invalidation
    /// happens strictly after commit, so a concurrent reader never
    /// repopulates the cache against the value being replaced.
    #[instrument(skip(self, attrs), fields(tenant_id, entity_id))]
    pub async fn upsert_hot_attributes(
        &self,
        tenant_id: i64,
        entity_id: i64,
        attrs: &serde_json::Value,
    ) -> Result<(), RouterError> {
        let mut conn = self.registry.acquire_primary().await?;

        sqlx::query("SELECT upsert_hot_attrs($1, $2, $3)")
            .bind(tenant_id)
            .bind(entity_id)
            .bind(attrs)
            .execute(&mut *conn)
            .await
            .map_err(RouterError::QueryFailed)?;

        drop(conn);

        let key = entity_key(tenant_id, entity_id);
        if let Err(err) = self.registry.cache().delete(&key).await {
            warn!(error = %err, key, "cache invalidation failed after hot-attribute commit");
        }

        Ok(())
    }
}

/// Check whether a drain is due, without claiming it. The timestamp is
/// only advanced via [`commit_drain_claim`], once the drain it was
/// guarding has actually succeeded — a failed drain must not starve the
/// next attempt.
fn should_attempt_drain(slot: &AtomicI64, interval_ms: i64, now_epoch_ms: i64) -> bool {
    let current = slot.load(Ordering::Acquire);
    now_epoch_ms.saturating_sub(current) >= interval_ms
}

fn commit_drain_claim(slot: &AtomicI64, now_epoch_ms: i64) {
    slot.store(now_epoch_ms, Ordering::Release);
}

fn now_epoch_ms() -> i64 {
    i64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(i64::MAX)
}
