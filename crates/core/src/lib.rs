//! Core domain types, errors, and constants for `sqlbox`.
//!
//! ## Key Components
//!
//! - **`errors`**: the primary `Error` enum and `Result` alias shared by every
//!   crate in the workspace, plus the `ErrorCode` each failure is reported as.
//! - **`types`**: `ExecutionInput` and `ExecutionOutput`, the two values the
//!   sandbox consumes and produces and the cache addresses by content.
//! - **`constants`**: cache key prefixes, default budgets and environment
//!   variable names.

pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, ErrorCode, Result, ResultExt},
    types::*,
};
