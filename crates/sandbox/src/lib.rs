//! Sandboxed SQL execution for sqlbox
//!
//! Every call gets a brand-new in-memory SQLite database that is dropped
//! when the call returns.

pub mod abort;
pub mod sqlite;

use async_trait::async_trait;
use sqlbox_core::{ExecutionInput, ExecutionOutput, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use abort::{AbortFlag, AbortReason};
pub use sqlite::SqliteSandbox;

/// Runs an init script followed by a query in an isolated engine instance
///
/// Implementations must stop the engine, not just the caller's wait, once
/// `deadline` elapses or `cancel` fires, and report `Error::Timeout` or
/// `Error::Cancelled` respectively. Failures of the init script are
/// `Error::InitError`, failures of the query `Error::QueryError`.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        input: ExecutionInput,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutput>;
}
