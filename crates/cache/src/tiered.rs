//! Two-tier result cache
//!
//! Tier one maps an input hash to the hash of the output it produced; tier
//! two maps an output hash to the serialized output. Distinct inputs with
//! equal outputs share one tier-two entry.

use crate::hashing::{hash_input, hash_output};
use crate::store::KeyValueStore;
use sqlbox_core::{
    ExecutionInput, ExecutionOutput, Result, DEFAULT_CACHE_TTL, INPUT_KEY_PREFIX,
    OUTPUT_KEY_PREFIX,
};
use std::time::Duration;
use tracing::{debug, instrument};

pub fn input_key(input_hash: &str) -> String {
    format!("{INPUT_KEY_PREFIX}{input_hash}")
}

pub fn output_key(output_hash: &str) -> String {
    format!("{OUTPUT_KEY_PREFIX}{output_hash}")
}

/// Cache over any [`KeyValueStore`]; every read and write resets the TTL
///
/// No locks are taken: racing writers of the same input store the same
/// values and converge.
#[derive(Debug, Clone)]
pub struct TwoTierCache<S> {
    store: S,
    ttl: Duration,
}

impl<S: KeyValueStore> TwoTierCache<S> {
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve an input hash to its output hash; `None` once evicted
    #[instrument(level = "debug", skip(self))]
    pub async fn probe_output_hash(&self, input_hash: &str) -> Result<Option<String>> {
        let output_hash = self.store.get_ex(&input_key(input_hash), self.ttl).await?;
        debug!(hit = output_hash.is_some(), "input tier probed");
        Ok(output_hash)
    }

    /// Whether an output entry is live; refreshes it without transferring it
    #[instrument(level = "debug", skip(self))]
    pub async fn has_output(&self, output_hash: &str) -> Result<bool> {
        self.store.touch(&output_key(output_hash), self.ttl).await
    }

    /// Load and decode an output entry; `None` once evicted
    #[instrument(level = "debug", skip(self))]
    pub async fn get_output(&self, output_hash: &str) -> Result<Option<ExecutionOutput>> {
        let Some(serialized) = self.store.get_ex(&output_key(output_hash), self.ttl).await? else {
            debug!("output tier miss");
            return Ok(None);
        };
        let output = serde_json::from_str(&serialized)?;
        Ok(Some(output))
    }

    /// Record that `input` produced `output`; returns the input hash
    ///
    /// The output entry is written only if no live entry holds it already.
    /// The input entry is always overwritten with a fresh TTL.
    #[instrument(skip_all)]
    pub async fn write_to_cache(
        &self,
        input: &ExecutionInput,
        output: &ExecutionOutput,
    ) -> Result<String> {
        let output_hash = hash_output(output);

        if self.has_output(&output_hash).await? {
            debug!(output_hash = %output_hash, "output already cached, reusing entry");
        } else {
            let serialized = serde_json::to_string(output)?;
            self.store
                .set_ex(&output_key(&output_hash), &serialized, self.ttl)
                .await?;
            debug!(output_hash = %output_hash, bytes = serialized.len(), "output cached");
        }

        let normalized = sqlbox_sql::normalize_input(input)?;
        let input_hash = hash_input(&normalized);
        self.store
            .set_ex(&input_key(&input_hash), &output_hash, self.ttl)
            .await?;
        debug!(input_hash = %input_hash, output_hash = %output_hash, "input cached");

        Ok(input_hash)
    }
}
