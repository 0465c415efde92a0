//! Plan storage abstraction.
//!
//! A [`PlanStore`] keeps one [`StoredPlan`] (body plus its fingerprint) per
//! key. All mutations are conditional and atomic: creation succeeds only when
//! the key is absent, and replacement or removal succeeds only while the
//! stored fingerprint still equals the caller's expected one. This closes the
//! window between checking a fingerprint and writing, in which two writers
//! holding the same version could otherwise both succeed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::etag::ETag;
use crate::key::PlanKey;

/// A plan document together with its current fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPlan {
    /// The plan document.
    pub body: Value,
    /// Fingerprint of `body` under its key.
    pub etag: ETag,
}

impl StoredPlan {
    /// Builds a record for `body` under `key`, computing its fingerprint.
    #[must_use]
    pub fn new(key: &PlanKey, body: Value) -> Self {
        let etag = ETag::generate(key, &body);
        Self { body, etag }
    }
}

/// Outcome of a conditional mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The mutation was applied.
    Applied,
    /// No record exists for the key.
    Missing,
    /// The stored fingerprint differs from the expected one.
    Stale(ETag),
}

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or the connection broke.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The backend answered with an error or an unexpected reply.
    #[error("store protocol error: {0}")]
    Protocol(String),

    /// A stored record could not be decoded.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt {
        /// Key of the unreadable record.
        key: String,
        /// Why decoding failed.
        reason: String,
    },

    /// The backend did not answer in time.
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value storage for plans.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Returns the record stored under `key`, if any.
    async fn get(&self, key: &PlanKey) -> Result<Option<StoredPlan>, StoreError>;

    /// Stores `plan` under `key` unless a record already exists.
    ///
    /// Returns `true` when the record was written.
    async fn insert_if_absent(&self, key: &PlanKey, plan: StoredPlan) -> Result<bool, StoreError>;

    /// Replaces the record under `key` if its fingerprint equals `expected`.
    async fn replace_if_match(
        &self,
        key: &PlanKey,
        expected: &ETag,
        plan: StoredPlan,
    ) -> Result<CasOutcome, StoreError>;

    /// Removes the record under `key` if its fingerprint equals `expected`.
    async fn delete_if_match(&self, key: &PlanKey, expected: &ETag)
        -> Result<CasOutcome, StoreError>;
}
