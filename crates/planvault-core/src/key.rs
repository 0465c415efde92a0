//! Storage key derivation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The resource type tag used when no other tag is configured.
pub const DEFAULT_RESOURCE_TYPE: &str = "plan";

/// A store address of the form `<resourceType>_<objectId>`.
///
/// The object identifier is used verbatim; no escaping or validation is
/// applied beyond what the schema enforces on request bodies.
///
/// # Example
///
/// ```
/// use planvault_core::PlanKey;
///
/// let key = PlanKey::new("plan", "12xvxc345ssdsds-508");
/// assert_eq!(key.as_str(), "plan_12xvxc345ssdsds-508");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanKey(String);

impl PlanKey {
    /// Derives the key for `object_id` under `resource_type`.
    #[must_use]
    pub fn new(resource_type: &str, object_id: &str) -> Self {
        Self(format!("{resource_type}_{object_id}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlanKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
