//! Plain configuration struct assembled from CLI flags / environment
//! variables (see `cli/commands.rs`). There is no generic config-file
//! loader here — that remains an external collaborator's job.

use std::time::Duration;

use secrecy::SecretString;

#[derive(Clone)]
pub struct Config {
    pub primary_host: String,
    pub replica_hosts: Vec<String>,
    pub cache_host: String,
    pub cache_port: u16,
    pub cache_connect_timeout: Duration,
    pub cache_operation_timeout: Duration,
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub primary_pool_min: u32,
    pub primary_pool_max: u32,
    pub replica_pool_min: u32,
    pub replica_pool_max: u32,
    pub max_replica_lag_ms: u64,
    pub lag_check_interval: Duration,
    pub circuit_breaker_threshold: u32,
    pub flush_interval: Duration,
    pub flush_batch_size: i64,
}

impl Config {
    pub fn primary_dsn(&self) -> String {
        format!(
            "postgresql://{}:{}@{}/{}",
            self.user,
            secrecy::ExposeSecret::expose_secret(&self.password),
            self.primary_host,
            self.database
        )
    }

    pub fn replica_dsn(&self, host: &str) -> String {
        format!(
            "postgresql://{}:{}@{}/{}",
            self.user,
            secrecy::ExposeSecret::expose_secret(&self.password),
            host,
            self.database
        )
    }

    pub fn cache_url(&self) -> String {
        format!("redis://{}:{}", self.cache_host, self.cache_port)
    }
}

/// Defaults match the tunables documented for each CLI flag.
impl Default for Config {
    fn default() -> Self {
        Self {
            primary_host: String::new(),
            replica_hosts: Vec::new(),
            cache_host: String::new(),
            cache_port: 6379,
            cache_connect_timeout: Duration::from_secs(1),
            cache_operation_timeout: Duration::from_secs(1),
            database: String::new(),
            user: String::new(),
            password: SecretString::from(String::new()),
            primary_pool_min: 10,
            primary_pool_max: 50,
            replica_pool_min: 5,
            replica_pool_max: 20,
            max_replica_lag_ms: 3000,
            lag_check_interval: Duration::from_secs(10),
            circuit_breaker_threshold: 5,
            flush_interval: Duration::from_millis(100),
            flush_batch_size: 50_000,
        }
    }
}
