//! Dispatcher configuration.

use std::time::Duration;

use tracing::{info, warn};

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 10;

/// Service address used when none is configured.
pub const DEFAULT_SERVER_ADDR: &str = "ws://peer0.org1.example.com:20000";

/// Per-call deadline for a remote execution.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the service address.
pub const ENV_SERVER_ADDR: &str = "TEE_SERVER_ADDR";

/// Environment variable holding the worker count.
pub const ENV_WORKERS: &str = "TEE_WORKERS";

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// WebSocket endpoint of the confidential-compute service
    pub server_addr: String,
    /// Number of connections, workers and queue slots
    pub workers: usize,
    /// Deadline for each remote call
    pub call_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            workers: DEFAULT_WORKERS,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    /// Read `TEE_SERVER_ADDR` and `TEE_WORKERS` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let server_addr = match lookup(ENV_SERVER_ADDR).filter(|addr| !addr.is_empty()) {
            Some(addr) => addr,
            None => {
                info!(
                    addr = DEFAULT_SERVER_ADDR,
                    "{} is not set, using default", ENV_SERVER_ADDR
                );
                DEFAULT_SERVER_ADDR.to_string()
            }
        };

        Self {
            server_addr,
            workers: parse_workers(lookup(ENV_WORKERS).as_deref()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Parse a worker count; unset, unparsable and zero all mean the default.
pub fn parse_workers(raw: Option<&str>) -> usize {
    match raw.map(str::trim).map(str::parse::<usize>) {
        Some(Ok(n)) if n > 0 => n,
        Some(_) => {
            warn!(
                value = raw.unwrap_or_default(),
                default = DEFAULT_WORKERS,
                "{} is illegal, using default", ENV_WORKERS
            );
            DEFAULT_WORKERS
        }
        None => DEFAULT_WORKERS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::from_lookup(|_| None);
        assert_eq!(config, DispatcherConfig::default());
        assert_eq!(config.workers, 10);
        assert_eq!(config.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SERVER_ADDR, "ws://127.0.0.1:4000"),
            (ENV_WORKERS, "3"),
        ]
        .into_iter()
        .collect();
        let config = DispatcherConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.server_addr, "ws://127.0.0.1:4000");
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn test_parse_workers_fallbacks() {
        assert_eq!(parse_workers(None), DEFAULT_WORKERS);
        assert_eq!(parse_workers(Some("abc")), DEFAULT_WORKERS);
        assert_eq!(parse_workers(Some("0")), DEFAULT_WORKERS);
        assert_eq!(parse_workers(Some(" 4 ")), 4);
    }
}
