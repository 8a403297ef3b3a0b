pub mod run;

use crate::config::Config;

#[derive(Debug)]
pub enum Action {
    /// Wire an `EndpointRegistry` from `config` and run one demonstration
    /// request end to end: an eventual read (cache-then-replica), a hot
    /// attribute write with cache invalidation, and a lag refresh. This
    /// crate does not bind an HTTP listener; this is an operational
    /// probe, not a server.
    Run { config: Config, tenant_id: i64 },
}
