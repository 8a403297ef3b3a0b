use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("eav-router")
        .about("Tenant-isolated query router and write optimizer probe")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(built_info::GIT_COMMIT_HASH.to_owned())
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("primary-host")
                .long("primary-host")
                .help("Hostname of the primary Postgres endpoint")
                .env("EAV_ROUTER_PRIMARY_HOST")
                .default_value("localhost")
                .value_name("HOST"),
        )
        .arg(
            Arg::new("replica-host")
                .long("replica-host")
                .help("Hostname of a read replica; repeat for multiple replicas")
                .env("EAV_ROUTER_REPLICA_HOSTS")
                .value_name("HOST")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("cache-host")
                .long("cache-host")
                .help("Hostname of the Redis cache")
                .env("EAV_ROUTER_CACHE_HOST")
                .default_value("localhost")
                .value_name("HOST"),
        )
        .arg(
            Arg::new("cache-port")
                .long("cache-port")
                .help("Port of the Redis cache")
                .env("EAV_ROUTER_CACHE_PORT")
                .default_value("6379")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .help("Database name")
                .env("EAV_ROUTER_DATABASE")
                .default_value("eav")
                .value_name("NAME"),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .help("Database user")
                .env("EAV_ROUTER_USER")
                .default_value("eav_admin")
                .value_name("USER"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Database password")
                .env("EAV_ROUTER_PASSWORD")
                .default_value("")
                .value_name("PASSWORD"),
        )
        .arg(
            Arg::new("tenant-id")
                .long("tenant-id")
                .help("Tenant id to use for the demonstration request")
                .env("EAV_ROUTER_TENANT_ID")
                .default_value("1")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("max-replica-lag-ms")
                .long("max-replica-lag-ms")
                .help("Maximum acceptable replica lag for eventual reads, in milliseconds")
                .env("EAV_ROUTER_MAX_REPLICA_LAG_MS")
                .default_value("3000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("lag-check-interval-secs")
                .long("lag-check-interval-secs")
                .help("Minimum interval between replica lag refreshes, in seconds")
                .env("EAV_ROUTER_LAG_CHECK_INTERVAL_SECS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("circuit-breaker-threshold")
                .long("circuit-breaker-threshold")
                .help("Consecutive replica failures before falling back to primary")
                .env("EAV_ROUTER_CIRCUIT_BREAKER_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("flush-interval-ms")
                .long("flush-interval-ms")
                .help("Minimum interval between staging-table drains, in milliseconds")
                .env("EAV_ROUTER_FLUSH_INTERVAL_MS")
                .default_value("100")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("flush-batch-size")
                .long("flush-batch-size")
                .help("Row batch size passed to the staging drain procedure")
                .env("EAV_ROUTER_FLUSH_BATCH_SIZE")
                .default_value("50000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_var("EAV_ROUTER_PRIMARY_HOST", None::<String>, || {
            let command = new();
            let matches = command.get_matches_from(vec!["eav-router"]);

            assert_eq!(
                matches.get_one::<String>("primary-host").map(String::as_str),
                Some("localhost")
            );
            assert_eq!(matches.get_one::<u16>("cache-port").copied(), Some(6379));
            assert_eq!(matches.get_one::<u64>("max-replica-lag-ms").copied(), Some(3000));
            assert_eq!(matches.get_one::<u32>("circuit-breaker-threshold").copied(), Some(5));
        });
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "eav-router");
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_replica_hosts_repeatable_and_comma_delimited() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "eav-router",
            "--replica-host",
            "replica-a,replica-b",
            "--replica-host",
            "replica-c",
        ]);

        let hosts: Vec<String> = matches
            .get_many::<String>("replica-host")
            .unwrap()
            .map(ToString::to_string)
            .collect();
        assert_eq!(hosts, vec!["replica-a", "replica-b", "replica-c"]);
    }

    #[test]
    fn test_tunables_parse_from_flags() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "eav-router",
            "--database",
            "genesis",
            "--user",
            "genesis_admin",
            "--flush-batch-size",
            "1000",
        ]);

        assert_eq!(matches.get_one::<String>("database").map(String::as_str), Some("genesis"));
        assert_eq!(matches.get_one::<String>("user").map(String::as_str), Some("genesis_admin"));
        assert_eq!(matches.get_one::<i64>("flush-batch-size").copied(), Some(1000));
    }
}
