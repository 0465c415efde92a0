//! Additive merge-patch.
//!
//! Top-level members of the patch replace those of the current document,
//! except [`LINKED_PLAN_SERVICES`], which accumulates: the patch's items are
//! appended after the current items.

use serde_json::{Map, Value};

/// The member that is appended to instead of replaced.
pub const LINKED_PLAN_SERVICES: &str = "linkedPlanServices";

/// Merges `patch` into a copy of `current`.
///
/// Non-object inputs are treated as empty objects; callers are expected to
/// have rejected non-object patches before this point.
///
/// # Example
///
/// ```
/// use planvault_core::merge::merge;
/// use serde_json::json;
///
/// let current = json!({"planType": "inNetwork", "linkedPlanServices": [{"objectId": "a"}]});
/// let patch = json!({"planType": "outOfNetwork", "linkedPlanServices": [{"objectId": "b"}]});
///
/// let merged = merge(&current, &patch);
/// assert_eq!(merged["planType"], "outOfNetwork");
/// assert_eq!(merged["linkedPlanServices"], json!([{"objectId": "a"}, {"objectId": "b"}]));
/// ```
#[must_use]
pub fn merge(current: &Value, patch: &Value) -> Value {
    let mut merged: Map<String, Value> = current.as_object().cloned().unwrap_or_default();
    let Some(patch) = patch.as_object() else {
        return Value::Object(merged);
    };

    for (field, value) in patch {
        merged.insert(field.clone(), value.clone());
    }

    if let Some(Value::Array(appended)) = patch.get(LINKED_PLAN_SERVICES) {
        let mut services = match current.get(LINKED_PLAN_SERVICES) {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::with_capacity(appended.len()),
        };
        services.extend(appended.iter().cloned());
        merged.insert(LINKED_PLAN_SERVICES.to_string(), Value::Array(services));
    }

    Value::Object(merged)
}
