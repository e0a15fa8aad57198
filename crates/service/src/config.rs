//! Service configuration with precedence and validation
//!
//! Values are resolved in order: defaults, JSON config file, environment,
//! command line. Each later layer overrides only what it sets.

use serde::{Deserialize, Serialize};
use sqlbox_core::{
    Error, Result, ResultExt, DEFAULT_CACHE_TTL, DEFAULT_EXECUTION_TIMEOUT, REDIS_ADDR_VAR,
    REDIS_DB_VAR, REDIS_PASSWORD_VAR, REDIS_URL_VAR, SQLBOX_CACHE_TTL_SECS_VAR,
    SQLBOX_COALESCE_VAR, SQLBOX_CONFIG_VAR, SQLBOX_TIMEOUT_MS_VAR,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Which key-value backend holds the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process store; entries live as long as the process
    #[default]
    Memory,
    /// Shared Redis instance
    Redis { url: String },
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
    /// Command line argument
    CommandLine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Wall-clock budget for one sandbox run (init and query together)
    pub execution_timeout: Duration,
    /// Sliding expiry applied to every cache read and write
    pub cache_ttl: Duration,
    /// Let concurrent requests for the same input wait on a single execution
    pub coalesce_in_flight: bool,
    pub store: StoreConfig,
    /// Highest-precedence layer that contributed a value
    pub source: ConfigSource,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            coalesce_in_flight: true,
            store: StoreConfig::Memory,
            source: ConfigSource::Default,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.execution_timeout.is_zero() {
            return Err(Error::configuration("execution timeout must be positive"));
        }
        if self.cache_ttl.as_secs() == 0 {
            return Err(Error::configuration(
                "cache TTL must be at least one second",
            ));
        }
        if let StoreConfig::Redis { url } = &self.store {
            if url.trim().is_empty() {
                return Err(Error::configuration("redis store requires a url"));
            }
        }
        Ok(())
    }
}

/// Builder for creating service configurations
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.config.execution_timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn with_coalesce_in_flight(mut self, coalesce: bool) -> Self {
        self.config.coalesce_in_flight = coalesce;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.config.source = source;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ServiceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub execution_timeout: Option<Duration>,
    pub cache_ttl: Option<Duration>,
    pub coalesce_in_flight: Option<bool>,
    pub store: Option<StoreConfig>,
}

impl CliOverrides {
    fn is_empty(&self) -> bool {
        self.execution_timeout.is_none()
            && self.cache_ttl.is_none()
            && self.coalesce_in_flight.is_none()
            && self.store.is_none()
    }
}

/// On-disk shape of the JSON config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    execution_timeout_ms: Option<u64>,
    cache_ttl_secs: Option<u64>,
    coalesce_in_flight: Option<bool>,
    store: Option<StoreConfig>,
}

/// Configuration loader that handles precedence
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env: HashMap<String, String>,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment
    pub fn new() -> Self {
        Self::with_env(std::env::vars())
    }

    /// Loader reading the given variables instead of the process environment
    pub fn with_env<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            env: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            config_file: None,
        }
    }

    /// Read this file instead of `SQLBOX_CONFIG` or the XDG default
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Load defaults, then the config file, then the environment
    pub fn load(&self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::default();

        if let Some((path, file)) = self.load_from_config_file()? {
            apply_file(&mut config, file);
            config.source = ConfigSource::ConfigFile(path);
        }

        if let Some(var) = self.apply_env(&mut config)? {
            config.source = ConfigSource::EnvironmentVariable(var);
        }

        config.validate()?;
        tracing::debug!(source = ?config.source, "configuration loaded");
        Ok(config)
    }

    /// Apply command line arguments (highest precedence)
    pub fn apply_cli_args(
        mut config: ServiceConfig,
        overrides: CliOverrides,
    ) -> Result<ServiceConfig> {
        if overrides.is_empty() {
            return Ok(config);
        }

        if let Some(timeout) = overrides.execution_timeout {
            config.execution_timeout = timeout;
        }
        if let Some(ttl) = overrides.cache_ttl {
            config.cache_ttl = ttl;
        }
        if let Some(coalesce) = overrides.coalesce_in_flight {
            config.coalesce_in_flight = coalesce;
        }
        if let Some(store) = overrides.store {
            config.store = store;
        }

        config.source = ConfigSource::CommandLine;
        config.validate()?;
        Ok(config)
    }

    fn var(&self, name: &str) -> Option<&str> {
        self.env
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// The file to read and whether it was asked for explicitly
    fn config_file_path(&self) -> Result<(PathBuf, bool)> {
        if let Some(path) = &self.config_file {
            return Ok((path.clone(), true));
        }
        if let Some(path) = self.var(SQLBOX_CONFIG_VAR) {
            return Ok((PathBuf::from(path), true));
        }

        let config_dir = match self.var("XDG_CONFIG_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir().ok_or_else(|| {
                Error::configuration(
                    "could not determine config directory; set XDG_CONFIG_HOME or HOME",
                )
            })?,
        };
        Ok((config_dir.join("sqlbox").join("config.json"), false))
    }

    fn load_from_config_file(&self) -> Result<Option<(PathBuf, FileConfig)>> {
        let (path, explicit) = match self.config_file_path() {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(error = %e, "no config directory, skipping config file");
                return Ok(None);
            }
        };

        if !path.exists() {
            if explicit {
                return Err(Error::configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let file: FileConfig = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        Ok(Some((path, file)))
    }

    /// Overlay environment variables; returns the last variable applied
    fn apply_env(&self, config: &mut ServiceConfig) -> Result<Option<String>> {
        let mut applied = None;

        if let Some(raw) = self.var(SQLBOX_TIMEOUT_MS_VAR) {
            let ms = parse_u64(SQLBOX_TIMEOUT_MS_VAR, raw)?;
            config.execution_timeout = Duration::from_millis(ms);
            applied = Some(SQLBOX_TIMEOUT_MS_VAR.to_string());
        }

        if let Some(raw) = self.var(SQLBOX_CACHE_TTL_SECS_VAR) {
            let secs = parse_u64(SQLBOX_CACHE_TTL_SECS_VAR, raw)?;
            config.cache_ttl = Duration::from_secs(secs);
            applied = Some(SQLBOX_CACHE_TTL_SECS_VAR.to_string());
        }

        if let Some(raw) = self.var(SQLBOX_COALESCE_VAR) {
            config.coalesce_in_flight = parse_bool(SQLBOX_COALESCE_VAR, raw)?;
            applied = Some(SQLBOX_COALESCE_VAR.to_string());
        }

        if let Some(url) = self.var(REDIS_URL_VAR) {
            config.store = StoreConfig::Redis {
                url: url.to_string(),
            };
            applied = Some(REDIS_URL_VAR.to_string());
        } else if let Some(addr) = self.var(REDIS_ADDR_VAR) {
            let db = self
                .var(REDIS_DB_VAR)
                .map(|raw| {
                    raw.parse::<u32>().map_err(|_| {
                        Error::configuration(format!(
                            "{REDIS_DB_VAR} must be a database index, got {raw:?}"
                        ))
                    })
                })
                .transpose()?;
            config.store = StoreConfig::Redis {
                url: redis_url(addr, self.var(REDIS_PASSWORD_VAR), db)?,
            };
            applied = Some(REDIS_ADDR_VAR.to_string());
        }

        Ok(applied)
    }
}

fn apply_file(config: &mut ServiceConfig, file: FileConfig) {
    if let Some(ms) = file.execution_timeout_ms {
        config.execution_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = file.cache_ttl_secs {
        config.cache_ttl = Duration::from_secs(secs);
    }
    if let Some(coalesce) = file.coalesce_in_flight {
        config.coalesce_in_flight = coalesce;
    }
    if let Some(store) = file.store {
        config.store = store;
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse().map_err(|_| {
        Error::configuration(format!("{name} must be a non-negative integer, got {raw:?}"))
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{name} must be a boolean, got {raw:?}"
        ))),
    }
}

/// `redis://[:password@]addr[/db]`, with the password percent-encoded
fn redis_url(addr: &str, password: Option<&str>, db: Option<u32>) -> Result<String> {
    let invalid = || {
        Error::configuration(format!(
            "{REDIS_ADDR_VAR} is not a valid address: {addr:?}"
        ))
    };

    let mut url = Url::parse(&format!("redis://{addr}")).map_err(|_| invalid())?;
    if url.host_str().is_none() {
        return Err(invalid());
    }
    if let Some(password) = password {
        url.set_password(Some(password)).map_err(|()| invalid())?;
    }
    if let Some(db) = db {
        url.set_path(&format!("/{db}"));
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader(vars: &[(&str, &str)], dir: &TempDir) -> ConfigLoader {
        let mut env: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        env.push((
            "XDG_CONFIG_HOME".to_string(),
            dir.path().display().to_string(),
        ));
        ConfigLoader::with_env(env)
    }

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let sqlbox_dir = dir.path().join("sqlbox");
        std::fs::create_dir_all(&sqlbox_dir).unwrap();
        let path = sqlbox_dir.join("config.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let config = loader(&[], &dir).load().unwrap();

        assert_eq!(config.execution_timeout, Duration::from_secs(1));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert!(config.coalesce_in_flight);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.source, ConfigSource::Default);
    }

    #[test]
    fn test_builder() {
        let config = ServiceConfigBuilder::new()
            .with_execution_timeout(Duration::from_millis(250))
            .with_cache_ttl(Duration::from_secs(60))
            .with_coalesce_in_flight(false)
            .with_store(StoreConfig::Redis {
                url: "redis://localhost:6379".into(),
            })
            .build()
            .unwrap();

        assert_eq!(config.execution_timeout, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert!(!config.coalesce_in_flight);
    }

    #[test]
    fn test_validation_rejects_zero_budgets() {
        assert!(ServiceConfigBuilder::new()
            .with_execution_timeout(Duration::ZERO)
            .build()
            .is_err());
        assert!(ServiceConfigBuilder::new()
            .with_cache_ttl(Duration::from_millis(500))
            .build()
            .is_err());
        assert!(ServiceConfigBuilder::new()
            .with_store(StoreConfig::Redis { url: " ".into() })
            .build()
            .is_err());
    }

    #[test]
    fn test_config_file_layer() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "execution_timeout_ms": 2500,
                "coalesce_in_flight": false,
                "store": { "type": "redis", "url": "redis://cache:6379/2" }
            }"#,
        );

        let config = loader(&[], &dir).load().unwrap();
        assert_eq!(config.execution_timeout, Duration::from_millis(2500));
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert!(!config.coalesce_in_flight);
        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://cache:6379/2".into()
            }
        );
        assert_eq!(config.source, ConfigSource::ConfigFile(path));
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, r#"{ "execution_timeout": 5 }"#);

        let err = loader(&[], &dir).load().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let missing = missing.display().to_string();

        assert!(loader(&[(SQLBOX_CONFIG_VAR, &missing)], &dir).load().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, r#"{ "execution_timeout_ms": 2500, "cache_ttl_secs": 10 }"#);

        let config = loader(
            &[(SQLBOX_TIMEOUT_MS_VAR, "300"), (SQLBOX_COALESCE_VAR, "off")],
            &dir,
        )
        .load()
        .unwrap();

        assert_eq!(config.execution_timeout, Duration::from_millis(300));
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert!(!config.coalesce_in_flight);
        assert!(matches!(config.source, ConfigSource::EnvironmentVariable(_)));
    }

    #[test]
    fn test_redis_addr_variables() {
        let dir = TempDir::new().unwrap();
        let config = loader(
            &[
                (REDIS_ADDR_VAR, "localhost:6379"),
                (REDIS_PASSWORD_VAR, "p@ss word"),
                (REDIS_DB_VAR, "3"),
            ],
            &dir,
        )
        .load()
        .unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://:p%40ss%20word@localhost:6379/3".into()
            }
        );
    }

    #[test]
    fn test_redis_addr_without_password_or_db() {
        let dir = TempDir::new().unwrap();
        let config = loader(&[(REDIS_ADDR_VAR, "cache.internal:6380")], &dir)
            .load()
            .unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://cache.internal:6380".into()
            }
        );

        assert!(loader(&[(REDIS_ADDR_VAR, "host:port")], &dir).load().is_err());
    }

    #[test]
    fn test_redis_url_wins_over_addr() {
        let dir = TempDir::new().unwrap();
        let config = loader(
            &[
                (REDIS_URL_VAR, "redis://primary:6379"),
                (REDIS_ADDR_VAR, "secondary:6379"),
            ],
            &dir,
        )
        .load()
        .unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: "redis://primary:6379".into()
            }
        );
    }

    #[test]
    fn test_invalid_env_values() {
        let dir = TempDir::new().unwrap();
        assert!(loader(&[(SQLBOX_TIMEOUT_MS_VAR, "soon")], &dir).load().is_err());
        assert!(loader(&[(SQLBOX_COALESCE_VAR, "maybe")], &dir).load().is_err());
        assert!(loader(&[(SQLBOX_CACHE_TTL_SECS_VAR, "0")], &dir).load().is_err());
        assert!(loader(&[(REDIS_ADDR_VAR, "h:1"), (REDIS_DB_VAR, "x")], &dir)
            .load()
            .is_err());
    }

    #[test]
    fn test_cli_args_take_precedence() {
        let dir = TempDir::new().unwrap();
        let config = loader(&[(SQLBOX_TIMEOUT_MS_VAR, "300")], &dir).load().unwrap();

        let config = ConfigLoader::apply_cli_args(
            config,
            CliOverrides {
                execution_timeout: Some(Duration::from_millis(50)),
                store: Some(StoreConfig::Memory),
                ..CliOverrides::default()
            },
        )
        .unwrap();

        assert_eq!(config.execution_timeout, Duration::from_millis(50));
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.source, ConfigSource::CommandLine);
    }

    #[test]
    fn test_empty_cli_args_keep_source() {
        let config = ServiceConfig::default();
        let config = ConfigLoader::apply_cli_args(config, CliOverrides::default()).unwrap();
        assert_eq!(config.source, ConfigSource::Default);
    }
}
