use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::pool::DEFAULT_FREE_LIST_CAPACITY;

/// Default delay between autosend ticks in milliseconds.
pub const DEFAULT_AUTOSEND_DELAY_MS: u64 = 10;

/// outmsg - Batched output server with pooled message buffers
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Network binding address
    #[arg(short, long, default_value = "127.0.0.1:7172")]
    pub bind: SocketAddr,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    pub max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    // === Output message settings ===

    /// Maximum number of idle output messages kept for reuse
    #[arg(long, default_value = "2048")]
    pub free_list_capacity: usize,

    /// Delay in milliseconds between autosend flushes
    #[arg(long, default_value = "10")]
    pub autosend_delay_ms: u64,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse_args() -> Self {
        Config::parse()
    }

    /// Autosend tick cadence
    pub fn autosend_delay(&self) -> Duration {
        Duration::from_millis(self.autosend_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 7172)),
            max_connections: 10_000,
            log_level: "info".to_string(),
            free_list_capacity: DEFAULT_FREE_LIST_CAPACITY,
            autosend_delay_ms: DEFAULT_AUTOSEND_DELAY_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli() {
        let parsed = Config::parse_from(["outmsg"]);
        let default = Config::default();

        assert_eq!(parsed.bind, default.bind);
        assert_eq!(parsed.max_connections, default.max_connections);
        assert_eq!(parsed.free_list_capacity, 2048);
        assert_eq!(parsed.autosend_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_override_pool_settings() {
        let config = Config::parse_from([
            "outmsg",
            "--free-list-capacity",
            "64",
            "--autosend-delay-ms",
            "25",
        ]);
        assert_eq!(config.free_list_capacity, 64);
        assert_eq!(config.autosend_delay(), Duration::from_millis(25));
    }
}
