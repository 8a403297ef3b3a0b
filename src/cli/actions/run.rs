use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::actions::Action;
use crate::metadata::ConsistencyLevel;
use crate::optimizer::WriteOptimizer;
use crate::registry::EndpointRegistry;
use crate::router::{headers, QueryRouter};

/// Handle the run action: wire an `EndpointRegistry`, a `QueryRouter`, and
/// a `WriteOptimizer` from `config`, then exercise the read and write
/// paths once against `tenant_id` and log the outcome. This crate does
/// not bind an HTTP listener; this is an operational probe, not a server.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run { config, tenant_id } => {
            let registry = EndpointRegistry::connect(&config)
                .await
                .context("failed to wire endpoint registry")?;

            registry
                .refresh_lag()
                .await
                .context("initial replica lag refresh failed")?;

            let router = QueryRouter::new(&registry, config.circuit_breaker_threshold, config.max_replica_lag_ms);

            let (rows, metadata) = router
                .execute(
                    "SELECT entity_id, attribute_id, value FROM entity_values LIMIT 10",
                    &[],
                    Some(tenant_id),
                    ConsistencyLevel::Eventual,
                    Some(&format!("tenant:{tenant_id}:sample")),
                    Duration::from_secs(30),
                )
                .await
                .context("demonstration read failed")?;

            info!(rows = rows.len(), headers = ?headers(&metadata), "demonstration read complete");

            let optimizer = WriteOptimizer::new(&registry, config.flush_interval, config.flush_batch_size);
            optimizer
                .upsert_hot_attributes(tenant_id, 1, &serde_json::json!({ "status": "probed" }))
                .await
                .context("demonstration hot-attribute upsert failed")?;

            info!("demonstration hot-attribute upsert complete");
            Ok(())
        }
    }
}
