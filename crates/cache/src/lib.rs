//! Result cache for sqlbox
//!
//! This crate provides the content-addressed side of the service:
//! - Content hashing of normalized inputs and of outputs
//! - A two-tier cache (input hash -> output hash -> output)
//! - Key-value backends with sliding per-key expiry (Redis, in-process)

pub mod hashing;
pub mod store;
pub mod tiered;

pub use hashing::{hash_input, hash_output, ContentHasher};
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use tiered::{input_key, output_key, TwoTierCache};
