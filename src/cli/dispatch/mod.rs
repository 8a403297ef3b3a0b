use std::time::Duration;

use anyhow::Result;
use clap::ArgMatches;
use secrecy::SecretString;

use crate::cli::actions::Action;
use crate::config::Config;

pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let config = Config {
        primary_host: matches.get_one::<String>("primary-host").cloned().unwrap_or_default(),
        replica_hosts: matches
            .get_many::<String>("replica-host")
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default(),
        cache_host: matches.get_one::<String>("cache-host").cloned().unwrap_or_default(),
        cache_port: matches.get_one::<u16>("cache-port").copied().unwrap_or(6379),
        database: matches.get_one::<String>("database").cloned().unwrap_or_default(),
        user: matches.get_one::<String>("user").cloned().unwrap_or_default(),
        password: SecretString::from(matches.get_one::<String>("password").cloned().unwrap_or_default()),
        max_replica_lag_ms: matches.get_one::<u64>("max-replica-lag-ms").copied().unwrap_or(3000),
        lag_check_interval: Duration::from_secs(
            matches.get_one::<u64>("lag-check-interval-secs").copied().unwrap_or(10),
        ),
        circuit_breaker_threshold: matches.get_one::<u32>("circuit-breaker-threshold").copied().unwrap_or(5),
        flush_interval: Duration::from_millis(matches.get_one::<u64>("flush-interval-ms").copied().unwrap_or(100)),
        flush_batch_size: matches.get_one::<i64>("flush-batch-size").copied().unwrap_or(50_000),
        ..Config::default()
    };

    let tenant_id = matches.get_one::<i64>("tenant-id").copied().unwrap_or(1);

    Ok(Action::Run { config, tenant_id })
}
