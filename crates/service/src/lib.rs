//! Sandboxed SQL execution with a content-addressed result cache
//!
//! ## Key Components
//!
//! - **`service`**: [`ExecutionService`], which normalizes a request, answers
//!   it from the cache or runs it in the sandbox, and resolves handles back
//!   into results.
//! - **`api`**: boundary request/response types and the [`Handler`] that
//!   translates service results into them.
//! - **`config`**: [`ServiceConfig`] and its layered [`ConfigLoader`].
//! - **`stats`**: hit, miss, execution and coalescing counters.

pub mod api;
pub mod config;
pub mod service;
pub mod stats;

pub use api::{
    AreQueriesOutputSameRequest, AreQueriesOutputSameResponse, Handler, RetrieveEvent,
    RetrieveQueryRequest, RetrieveQueryResponse, RunQueryRequest, RunQueryResponse, Status,
};
pub use config::{
    CliOverrides, ConfigLoader, ConfigSource, ServiceConfig, ServiceConfigBuilder, StoreConfig,
};
pub use service::{ExecutionService, RetrievedQuery, RowStream};
pub use stats::{ServiceStats, StatsReport};
