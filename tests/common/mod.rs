#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(dead_code)]

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use eav_router::cache::Cache;
use eav_router::registry::EndpointRegistry;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers_modules::testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::IntoContainerPort,
    runners::AsyncRunner,
};

const POSTGRES_TAG: &str = "16";
const REDIS_TAG: &str = "7";
const CONNECT_ATTEMPTS: u32 = 60;

fn socket_exists(host: &str) -> bool {
    if let Some(path) = host.strip_prefix("unix://") {
        Path::new(path).exists()
    } else {
        true
    }
}

fn testcontainers_runtime_candidates() -> Vec<String> {
    let mut candidates = vec!["unix:///var/run/docker.sock".to_string()];
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR")
        && !runtime_dir.is_empty()
    {
        candidates.push(format!("unix://{runtime_dir}/.docker/run/docker.sock"));
    }
    if let Ok(home) = env::var("HOME")
        && !home.is_empty()
    {
        candidates.push(format!("unix://{home}/.docker/run/docker.sock"));
        candidates.push(format!("unix://{home}/.docker/desktop/docker.sock"));
    }
    candidates
}

fn detect_podman_socket() -> Option<String> {
    let mut candidates = vec![
        "unix:///run/podman/podman.sock".to_string(),
        "unix:///var/run/podman/podman.sock".to_string(),
    ];
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR")
        && !runtime_dir.is_empty()
    {
        candidates.push(format!("unix://{runtime_dir}/podman/podman.sock"));
    }
    if let Ok(uid) = env::var("UID")
        && !uid.is_empty()
    {
        candidates.push(format!("unix:///run/user/{uid}/podman/podman.sock"));
    }
    candidates.into_iter().find(|candidate| socket_exists(candidate))
}

fn find_container_runtime() -> Option<String> {
    if let Ok(existing) = env::var("DOCKER_HOST")
        && !existing.is_empty()
        && socket_exists(&existing)
    {
        return Some(existing);
    }
    testcontainers_runtime_candidates()
        .into_iter()
        .find(|candidate| socket_exists(candidate))
}

fn should_require_container_runtime() -> bool {
    let in_ci = env::var("CI").ok().is_some_and(|value| value.eq_ignore_ascii_case("true"));
    let force = env::var("EAV_ROUTER_REQUIRE_TESTCONTAINERS")
        .ok()
        .is_some_and(|value| matches!(value.as_str(), "1" | "true" | "TRUE"));
    in_ci || force
}

/// Returns `Ok(true)` when a container runtime is available and the test
/// should proceed, `Ok(false)` when it should print a notice and skip, or
/// `Err` when `CI`/the force-flag demands a runtime that isn't there.
pub fn ensure_container_runtime_for_test(test_name: &str) -> Result<bool> {
    if find_container_runtime().is_some() {
        return Ok(true);
    }

    let mut message = format!("No container runtime socket found (checked Podman + Docker), cannot run {test_name}");

    if let Some(podman_socket) = detect_podman_socket() {
        message.push_str(". Podman socket detected at ");
        message.push_str(&podman_socket);
        message.push_str("; set DOCKER_HOST to this value so testcontainers can use it");
    }

    if should_require_container_runtime() {
        bail!("{message}");
    }

    eprintln!("{message}; skipping");
    Ok(false)
}

pub async fn start_postgres_container() -> Result<ContainerAsync<GenericImage>> {
    GenericImage::new("postgres", POSTGRES_TAG)
        .with_exposed_port(5432.tcp())
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "eav")
        .with_env_var("POSTGRES_HOST_AUTH_METHOD", "trust")
        .start()
        .await
        .map_err(Into::into)
}

pub async fn start_redis_container() -> Result<ContainerAsync<GenericImage>> {
    GenericImage::new("redis", REDIS_TAG)
        .with_exposed_port(6379.tcp())
        .start()
        .await
        .map_err(Into::into)
}

async fn connect_pool_with_retry(host: &str, port: u16) -> Result<PgPool> {
    let dsn = format!("postgresql://postgres:postgres@{host}:{port}/eav?sslmode=disable");
    let mut last_error = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match PgPoolOptions::new().max_connections(5).connect(&dsn).await {
            Ok(pool) => return Ok(pool),
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }
    bail!("failed to connect to {dsn}; last_error={last_error:?}")
}

pub async fn connect_pool_for_container(container: &ContainerAsync<GenericImage>) -> Result<PgPool> {
    let host = container.get_host().await?.to_string();
    let port = container.get_host_port_ipv4(5432.tcp()).await?;
    connect_pool_with_retry(&host, port).await
}

pub async fn redis_url_for_container(container: &ContainerAsync<GenericImage>) -> Result<String> {
    let host = container.get_host().await?.to_string();
    let port = container.get_host_port_ipv4(6379.tcp()).await?;
    Ok(format!("redis://{host}:{port}"))
}

/// Create the tables and `SECURITY DEFINER` procedures the router and
/// optimizer depend on, on a freshly started Postgres container.
pub async fn seed_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE entity_values (
            entity_id    BIGINT NOT NULL,
            tenant_id    BIGINT NOT NULL,
            attribute_id BIGINT NOT NULL,
            value        TEXT
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("ALTER TABLE entity_values ENABLE ROW LEVEL SECURITY").execute(pool).await?;
    sqlx::query(
        r"
        CREATE POLICY entity_values_tenant_isolation ON entity_values
        USING (tenant_id = current_setting('app.current_tenant_id', true)::bigint)
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE replication_heartbeat (
            source    TEXT NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE UNLOGGED TABLE entity_values_ingest (
            entity_id      BIGINT,
            tenant_id      BIGINT,
            attribute_id   BIGINT,
            value          TEXT,
            value_int      BIGINT,
            value_decimal  DOUBLE PRECISION,
            ingested_at    TIMESTAMP
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE hot_attributes (
            tenant_id BIGINT NOT NULL,
            entity_id BIGINT NOT NULL,
            attrs     JSONB NOT NULL,
            PRIMARY KEY (tenant_id, entity_id)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE OR REPLACE FUNCTION stage_flush(limit_int BIGINT)
        RETURNS BIGINT
        SECURITY DEFINER
        LANGUAGE plpgsql
        AS $$
        DECLARE
            moved BIGINT;
        BEGIN
            WITH staged AS (
                DELETE FROM entity_values_ingest
                WHERE ctid IN (
                    SELECT ctid FROM entity_values_ingest LIMIT limit_int
                )
                RETURNING entity_id, tenant_id, attribute_id, value
            )
            INSERT INTO entity_values (entity_id, tenant_id, attribute_id, value)
            SELECT entity_id, tenant_id, attribute_id, value FROM staged;
            GET DIAGNOSTICS moved = ROW_COUNT;
            RETURN moved;
        END;
        $$
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE OR REPLACE FUNCTION upsert_hot_attrs(p_tenant_id BIGINT, p_entity_id BIGINT, p_attrs JSONB)
        RETURNS VOID
        SECURITY DEFINER
        LANGUAGE plpgsql
        AS $$
        BEGIN
            INSERT INTO hot_attributes (tenant_id, entity_id, attrs)
            VALUES (p_tenant_id, p_entity_id, p_attrs)
            ON CONFLICT (tenant_id, entity_id) DO UPDATE SET attrs = EXCLUDED.attrs;
        END;
        $$
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one heartbeat row for `source`, `lag_ms` behind `now()`.
pub async fn seed_heartbeat(pool: &PgPool, source: &str, lag_ms: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO replication_heartbeat (source, timestamp) VALUES ($1, now() - (($2 || ' milliseconds')::interval))",
    )
    .bind(source)
    .bind(lag_ms.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Build an `EndpointRegistry` directly from already-connected pools,
/// bypassing `Config`/DSN assembly entirely.
pub async fn registry_from(primary: PgPool, replicas: Vec<PgPool>, redis_url: &str) -> Result<EndpointRegistry> {
    let cache = Cache::connect(redis_url, Duration::from_secs(5), Duration::from_secs(5)).await?;
    Ok(EndpointRegistry::new(primary, replicas, cache, None, Duration::from_millis(0)))
}
