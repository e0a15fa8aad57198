//! SQL canonicalization for sqlbox
//!
//! Query text is tokenized with the SQLite dialect and re-rendered with
//! fixed spacing rules, so two queries that differ only in keyword case,
//! comments or whitespace end up byte-identical. The init script is never
//! passed through here.

pub mod canonical;

pub use canonical::{normalize, normalize_input, split_statements};
