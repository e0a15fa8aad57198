/// Constants used throughout the sqlbox codebase
use std::time::Duration;

// Cache key layout:
//   sqlbox:sql-input:<input-hash>   -> <output-hash>
//   sqlbox:sql-output:<output-hash> -> <serialized output>
pub const INPUT_KEY_PREFIX: &str = "sqlbox:sql-input:";
pub const OUTPUT_KEY_PREFIX: &str = "sqlbox:sql-output:";

// Sliding expiration applied on every read and write
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

// How often the in-memory store drops entries nobody read again
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

// Wall-clock budget for init + query
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(1);

// Environment variable names
pub const SQLBOX_CONFIG_VAR: &str = "SQLBOX_CONFIG";
pub const SQLBOX_TIMEOUT_MS_VAR: &str = "SQLBOX_TIMEOUT_MS";
pub const SQLBOX_CACHE_TTL_SECS_VAR: &str = "SQLBOX_CACHE_TTL_SECS";
pub const SQLBOX_COALESCE_VAR: &str = "SQLBOX_COALESCE";
pub const SQLBOX_DEBUG_VAR: &str = "SQLBOX_DEBUG";
pub const REDIS_URL_VAR: &str = "REDIS_URL";
pub const REDIS_ADDR_VAR: &str = "REDIS_ADDR";
pub const REDIS_PASSWORD_VAR: &str = "REDIS_PASSWORD";
pub const REDIS_DB_VAR: &str = "REDIS_DB";
