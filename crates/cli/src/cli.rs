use crate::commands::Commands;
use clap::{Args, Parser};
use sqlbox_service::{CliOverrides, StoreConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sqlbox")]
#[command(about = "Run SQL in a throwaway sandbox and compare cached results", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options that override the config file and environment
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file to read instead of $XDG_CONFIG_HOME/sqlbox/config.json
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Execution budget per query, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Sliding cache expiry, in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// Run every request itself instead of waiting on identical in-flight ones
    #[arg(long, global = true)]
    pub no_coalesce: bool,

    /// Cache in Redis at this URL
    #[arg(long, global = true, value_name = "URL", conflicts_with = "memory")]
    pub redis_url: Option<String>,

    /// Cache in process memory
    #[arg(long, global = true)]
    pub memory: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print cache and execution counters to stderr when done
    #[arg(long, global = true)]
    pub stats: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> CliOverrides {
        let store = match (&self.redis_url, self.memory) {
            (Some(url), _) => Some(StoreConfig::Redis { url: url.clone() }),
            (None, true) => Some(StoreConfig::Memory),
            (None, false) => None,
        };

        CliOverrides {
            execution_timeout: self.timeout_ms.map(Duration::from_millis),
            cache_ttl: self.cache_ttl_secs.map(Duration::from_secs),
            coalesce_in_flight: self.no_coalesce.then_some(false),
            store,
        }
    }
}
