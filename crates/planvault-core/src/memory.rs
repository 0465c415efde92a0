//! In-process plan store.
//!
//! Backed by a [`DashMap`]; conditional operations hold the shard lock for
//! the key while comparing and writing, which makes them atomic with respect
//! to every other operation on the same key.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::etag::ETag;
use crate::key::PlanKey;
use crate::store::{CasOutcome, PlanStore, StoreError, StoredPlan};

/// A [`PlanStore`] that keeps records in memory.
///
/// # Example
///
/// ```
/// use planvault_core::{MemoryPlanStore, PlanKey, PlanStore, StoredPlan};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = MemoryPlanStore::new();
/// let key = PlanKey::new("plan", "p1");
/// let plan = StoredPlan::new(&key, json!({"objectId": "p1"}));
///
/// assert!(store.insert_if_absent(&key, plan.clone()).await.unwrap());
/// assert!(!store.insert_if_absent(&key, plan).await.unwrap());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    records: DashMap<String, StoredPlan>,
}

impl MemoryPlanStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no plans are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn get(&self, key: &PlanKey) -> Result<Option<StoredPlan>, StoreError> {
        Ok(self.records.get(key.as_str()).map(|entry| entry.value().clone()))
    }

    async fn insert_if_absent(&self, key: &PlanKey, plan: StoredPlan) -> Result<bool, StoreError> {
        match self.records.entry(key.as_str().to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(plan);
                Ok(true)
            }
        }
    }

    async fn replace_if_match(
        &self,
        key: &PlanKey,
        expected: &ETag,
        plan: StoredPlan,
    ) -> Result<CasOutcome, StoreError> {
        match self.records.entry(key.as_str().to_string()) {
            Entry::Vacant(_) => Ok(CasOutcome::Missing),
            Entry::Occupied(mut slot) => {
                if &slot.get().etag != expected {
                    return Ok(CasOutcome::Stale(slot.get().etag.clone()));
                }
                slot.insert(plan);
                Ok(CasOutcome::Applied)
            }
        }
    }

    async fn delete_if_match(
        &self,
        key: &PlanKey,
        expected: &ETag,
    ) -> Result<CasOutcome, StoreError> {
        match self.records.entry(key.as_str().to_string()) {
            Entry::Vacant(_) => Ok(CasOutcome::Missing),
            Entry::Occupied(slot) => {
                if &slot.get().etag != expected {
                    return Ok(CasOutcome::Stale(slot.get().etag.clone()));
                }
                slot.remove();
                Ok(CasOutcome::Applied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, n: i64) -> (PlanKey, StoredPlan) {
        let key = PlanKey::new("plan", id);
        let plan = StoredPlan::new(&key, json!({"objectId": id, "n": n}));
        (key, plan)
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryPlanStore::new();
        let (key, _) = record("p1", 0);
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = MemoryPlanStore::new();
        let (key, plan) = record("p1", 0);
        assert!(store.insert_if_absent(&key, plan.clone()).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(plan));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_never_overwrites() {
        let store = MemoryPlanStore::new();
        let (key, first) = record("p1", 0);
        let (_, second) = record("p1", 1);
        assert!(store.insert_if_absent(&key, first.clone()).await.unwrap());
        assert!(!store.insert_if_absent(&key, second).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_replace_if_match() {
        let store = MemoryPlanStore::new();
        let (key, first) = record("p1", 0);
        let (_, second) = record("p1", 1);
        store.insert_if_absent(&key, first.clone()).await.unwrap();

        let outcome = store.replace_if_match(&key, &first.etag, second.clone()).await.unwrap();
        assert_eq!(outcome, CasOutcome::Applied);
        assert_eq!(store.get(&key).await.unwrap(), Some(second.clone()));

        // The old fingerprint is now stale.
        let (_, third) = record("p1", 2);
        let outcome = store.replace_if_match(&key, &first.etag, third).await.unwrap();
        assert_eq!(outcome, CasOutcome::Stale(second.etag));
    }

    #[tokio::test]
    async fn test_replace_missing() {
        let store = MemoryPlanStore::new();
        let (key, plan) = record("p1", 0);
        let outcome = store.replace_if_match(&key, &plan.etag, plan.clone()).await.unwrap();
        assert_eq!(outcome, CasOutcome::Missing);
    }

    #[tokio::test]
    async fn test_delete_if_match() {
        let store = MemoryPlanStore::new();
        let (key, plan) = record("p1", 0);
        store.insert_if_absent(&key, plan.clone()).await.unwrap();

        let wrong = ETag::from_stored("nope");
        assert_eq!(
            store.delete_if_match(&key, &wrong).await.unwrap(),
            CasOutcome::Stale(plan.etag.clone())
        );
        assert_eq!(
            store.delete_if_match(&key, &plan.etag).await.unwrap(),
            CasOutcome::Applied
        );
        assert_eq!(
            store.delete_if_match(&key, &plan.etag).await.unwrap(),
            CasOutcome::Missing
        );
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
