//! Index intents for the downstream search indexer.
//!
//! The controller never indexes anything itself. It describes the effect a
//! mutation should have on the search index as an [`IndexIntent`] and hands it
//! to an [`IndexPublisher`], which delivers it asynchronously.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The indexing effect an intent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentOperation {
    /// Index the body.
    Store,
    /// Remove the body from the index.
    Delete,
}

impl IntentOperation {
    /// Returns the wire name of the operation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "STORE",
            Self::Delete => "DELETE",
        }
    }
}

/// A message describing one indexing effect.
///
/// Serializes to `{"operation": "STORE" | "DELETE", "body": <plan>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexIntent {
    /// The requested effect.
    pub operation: IntentOperation,
    /// The plan to index, or the prior plan to remove.
    pub body: Value,
}

impl IndexIntent {
    /// An intent to index `body`.
    #[must_use]
    pub const fn store(body: Value) -> Self {
        Self {
            operation: IntentOperation::Store,
            body,
        }
    }

    /// An intent to remove `body` from the index.
    #[must_use]
    pub const fn delete(body: Value) -> Self {
        Self {
            operation: IntentOperation::Delete,
            body,
        }
    }
}

/// Fire-and-forget delivery of index intents.
///
/// Implementations must not block and must not fail towards the caller:
/// delivery problems are the publisher's to log and count. Intents handed to
/// one publisher are delivered in the order they were published.
pub trait IndexPublisher: Send + Sync {
    /// Enqueues `intent` for delivery.
    fn publish(&self, intent: IndexIntent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let intent = IndexIntent::store(json!({"objectId": "p1"}));
        let wire = serde_json::to_value(&intent).unwrap();
        assert_eq!(wire, json!({"operation": "STORE", "body": {"objectId": "p1"}}));

        let intent = IndexIntent::delete(json!({"objectId": "p1"}));
        let wire = serde_json::to_value(&intent).unwrap();
        assert_eq!(wire["operation"], "DELETE");
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(IntentOperation::Store.as_str(), "STORE");
        assert_eq!(IntentOperation::Delete.as_str(), "DELETE");
    }
}
