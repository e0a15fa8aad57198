//! Execution service: canonicalize, probe the cache, run, store

use crate::config::{ServiceConfig, StoreConfig};
use crate::stats::{ServiceStats, StatsReport};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use sqlbox_cache::{hash_input, KeyValueStore, MemoryStore, RedisStore, TwoTierCache};
use sqlbox_core::{Error, ExecutionInput, Result, Row, DEFAULT_PURGE_INTERVAL};
use sqlbox_sandbox::{Sandbox, SqliteSandbox};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

/// Rows of a cached output, produced one at a time
pub type RowStream = BoxStream<'static, Row>;

/// A cached output resolved from a handle
pub struct RetrievedQuery {
    pub output_hash: String,
    pub header: Vec<String>,
    pub rows: RowStream,
}

impl std::fmt::Debug for RetrievedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievedQuery")
            .field("output_hash", &self.output_hash)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

enum Role {
    Leader(Arc<Notify>),
    Follower(Arc<Notify>),
}

/// Releases an in-flight slot and wakes everyone waiting on it
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, Arc<Notify>>,
    key: String,
    notify: Arc<Notify>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.notify));
        self.notify.notify_waiters();
    }
}

pub struct ExecutionService {
    cache: TwoTierCache<Arc<dyn KeyValueStore>>,
    sandbox: Arc<dyn Sandbox>,
    execution_timeout: Duration,
    coalesce_in_flight: bool,
    /// Input hashes currently being executed, keyed to the leader's wakeup
    in_flight: DashMap<String, Arc<Notify>>,
    stats: ServiceStats,
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("store", &self.cache.store().name())
            .field("execution_timeout", &self.execution_timeout)
            .field("cache_ttl", &self.cache.ttl())
            .field("coalesce_in_flight", &self.coalesce_in_flight)
            .finish_non_exhaustive()
    }
}

impl ExecutionService {
    pub fn new(
        config: &ServiceConfig,
        store: Arc<dyn KeyValueStore>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            cache: TwoTierCache::with_ttl(store, config.cache_ttl),
            sandbox,
            execution_timeout: config.execution_timeout,
            coalesce_in_flight: config.coalesce_in_flight,
            in_flight: DashMap::new(),
            stats: ServiceStats::new(),
        }
    }

    /// Connect the configured store and use the SQLite sandbox
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = match &config.store {
            StoreConfig::Memory => {
                let memory = Arc::new(MemoryStore::new());
                memory.spawn_purge_task(DEFAULT_PURGE_INTERVAL);
                memory
            }
            StoreConfig::Redis { url } => Arc::new(RedisStore::connect(url).await?),
        };
        Ok(Self::new(config, store, Arc::new(SqliteSandbox::new())))
    }

    pub fn cache(&self) -> &TwoTierCache<Arc<dyn KeyValueStore>> {
        &self.cache
    }

    pub fn stats(&self) -> StatsReport {
        self.stats.generate_report()
    }

    /// Run `query` after `init` and return the handle of its result
    ///
    /// Identical requests (after normalization) are answered from the cache
    /// without running the sandbox. `Timeout`, `InitError` and `QueryError`
    /// describe the caller's SQL; every other error is a service fault.
    #[instrument(skip_all, fields(input_hash = tracing::field::Empty))]
    pub async fn run_query(
        &self,
        init: &str,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<String> {
        require("schema", init)?;
        require("query", query)?;

        let input = sqlbox_sql::normalize_input(&ExecutionInput::new(init, query))?;
        let input_hash = hash_input(&input);
        tracing::Span::current().record("input_hash", input_hash.as_str());

        if self.is_cached(&input_hash).await? {
            self.stats.record_hit();
            debug!("cache hit");
            return Ok(input_hash);
        }
        self.stats.record_miss();
        debug!("cache miss");

        if !self.coalesce_in_flight {
            return self.execute_and_store(&input, cancel).await;
        }

        loop {
            let role = match self.in_flight.entry(input_hash.clone()) {
                Entry::Occupied(entry) => Role::Follower(Arc::clone(entry.get())),
                Entry::Vacant(entry) => {
                    let notify = Arc::new(Notify::new());
                    entry.insert(Arc::clone(&notify));
                    Role::Leader(notify)
                }
            };

            match role {
                Role::Leader(notify) => {
                    let _guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        key: input_hash.clone(),
                        notify,
                    };
                    // a previous leader may have finished since the first probe
                    if self.is_cached(&input_hash).await? {
                        self.stats.record_coalesced();
                        return Ok(input_hash);
                    }
                    return self.execute_and_store(&input, cancel).await;
                }
                Role::Follower(notify) => {
                    let notified = notify.notified();
                    let leader_running = self
                        .in_flight
                        .get(&input_hash)
                        .is_some_and(|current| Arc::ptr_eq(current.value(), &notify));

                    if leader_running {
                        debug!("waiting for in-flight execution");
                        tokio::select! {
                            () = cancel.cancelled() => return Err(Error::cancelled("query")),
                            () = notified => {}
                        }
                    }

                    if self.is_cached(&input_hash).await? {
                        self.stats.record_coalesced();
                        debug!("served by in-flight execution");
                        return Ok(input_hash);
                    }
                    // the leader failed or was cancelled; compete for the slot
                }
            }
        }
    }

    /// Resolve a handle to its header and a stream of its rows
    #[instrument(skip(self))]
    pub async fn retrieve_query(&self, id: &str) -> Result<RetrievedQuery> {
        require("id", id)?;

        let output_hash = self
            .cache
            .probe_output_hash(id)
            .await
            .inspect_err(log_fault)?
            .ok_or_else(|| Error::not_found("id"))?;
        let output = self
            .cache
            .get_output(&output_hash)
            .await
            .inspect_err(log_fault)?
            .ok_or_else(|| Error::not_found("id"))?;

        debug!(rows = output.row_count(), "output retrieved");
        Ok(RetrievedQuery {
            output_hash,
            header: output.header,
            rows: stream::iter(output.rows).boxed(),
        })
    }

    /// Whether two handles produced the same output, by output hash alone
    #[instrument(skip(self))]
    pub async fn compare(&self, left_id: &str, right_id: &str) -> Result<bool> {
        require("left_id", left_id)?;
        require("right_id", right_id)?;

        let left = self
            .cache
            .probe_output_hash(left_id)
            .await
            .inspect_err(log_fault)?
            .ok_or_else(|| Error::not_found("left_id"))?;
        let right = self
            .cache
            .probe_output_hash(right_id)
            .await
            .inspect_err(log_fault)?
            .ok_or_else(|| Error::not_found("right_id"))?;

        Ok(left == right)
    }

    /// A handle is a hit only if both of its tiers are still live
    async fn is_cached(&self, input_hash: &str) -> Result<bool> {
        let Some(output_hash) = self
            .cache
            .probe_output_hash(input_hash)
            .await
            .inspect_err(log_fault)?
        else {
            return Ok(false);
        };
        self.cache
            .has_output(&output_hash)
            .await
            .inspect_err(log_fault)
    }

    async fn execute_and_store(
        &self,
        input: &ExecutionInput,
        cancel: CancellationToken,
    ) -> Result<String> {
        self.stats.record_execution();
        let started = Instant::now();

        let output = self
            .sandbox
            .execute(input.clone(), self.execution_timeout, cancel)
            .await
            .inspect_err(log_failure)?;

        debug!(
            columns = output.column_count(),
            rows = output.row_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query executed"
        );

        self.cache
            .write_to_cache(input, &output)
            .await
            .inspect_err(log_fault)
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        Err(Error::invalid_argument(field))
    } else {
        Ok(())
    }
}

fn log_fault(error: &Error) {
    if error.is_internal() {
        error!(error = %error, "internal fault");
    }
}

fn log_failure(error: &Error) {
    match error {
        e if e.is_user_facing() => debug!(error = %e, "query rejected"),
        Error::Cancelled { .. } => debug!("query cancelled"),
        e => log_fault(e),
    }
}
