//! Content fingerprints and conditional-header comparison.
//!
//! An [`ETag`] is a SHA-256 digest over the storage key and the canonical
//! JSON encoding of the stored document. `serde_json` keeps object members in
//! sorted order, so two documents with equal content always encode to the
//! same bytes regardless of the member order a client submitted.
//!
//! # Example
//!
//! ```
//! use planvault_core::{ETag, PlanKey};
//! use serde_json::json;
//!
//! let key = PlanKey::new("plan", "p1");
//! let a = ETag::generate(&key, &json!({"objectId": "p1", "planType": "inNetwork"}));
//! let b = ETag::generate(&key, &json!({"planType": "inNetwork", "objectId": "p1"}));
//! assert_eq!(a, b);
//! assert!(a.matches("\"".to_string() + a.as_str() + "\""));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::key::PlanKey;

/// Separates the key from the content in the digest input.
const KEY_SEPARATOR: u8 = 0x00;

/// Opaque version token for a stored plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Computes the fingerprint of `content` stored under `key`.
    #[must_use]
    pub fn generate(key: &PlanKey, content: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        hasher.update([KEY_SEPARATOR]);
        hasher.update(content.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a token previously produced by [`ETag::generate`], e.g. when
    /// reading it back from a store.
    #[must_use]
    pub fn from_stored(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the bare token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the token in quoted strong-validator form for an `ETag` header.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Compares against a client-supplied `If-Match` / `If-None-Match` token.
    ///
    /// Quote characters and surrounding whitespace are stripped from the
    /// client token before comparison.
    #[must_use]
    pub fn compare(&self, client_token: impl AsRef<str>) -> Comparison {
        if normalize(client_token.as_ref()) == self.0 {
            Comparison::Match
        } else {
            Comparison::Mismatch
        }
    }

    /// Shorthand for `self.compare(token) == Comparison::Match`.
    #[must_use]
    pub fn matches(&self, client_token: impl AsRef<str>) -> bool {
        self.compare(client_token) == Comparison::Match
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of comparing a server fingerprint with a client token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// The client token names the current version.
    Match,
    /// The client token names some other version.
    Mismatch,
}

fn normalize(token: &str) -> String {
    token.trim().replace('"', "")
}
