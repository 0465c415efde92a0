//! Plan lifecycle controller.
//!
//! The controller runs the gates of each operation in a fixed order and
//! only touches the store once every gate has passed, so a rejected request
//! never leaves a partial write behind.
//!
//! | Operation | Gates (first failure wins) | Intents |
//! |---|---|---|
//! | create | body, schema, absent | `STORE(new)` |
//! | read | present, `If-None-Match` | none |
//! | replace | present, body, schema, identity, `If-Match` | `DELETE(old)`, `STORE(new)` |
//! | merge | present, patch, identity, `If-Match`, merged schema | `DELETE(old)`, `STORE(merged)` |
//! | delete | present, `If-Match` | `DELETE(old)` |
//!
//! Conditional writes go through the store's compare-and-swap primitives.
//! When a concurrent writer wins the race between the `If-Match` check and
//! the write, the request fails with [`PlanError::PreconditionFailed`]
//! carrying the winner's fingerprint and emits no intents.
//!
//! Each write and the intents it emits run on a spawned task. A caller that
//! stops waiting (client disconnect, request timeout) cannot leave a
//! committed write without its intents.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PlanError, PlanResult};
use crate::etag::ETag;
use crate::intent::{IndexIntent, IndexPublisher};
use crate::key::{PlanKey, DEFAULT_RESOURCE_TYPE};
use crate::merge::merge;
use crate::schema::{SchemaError, SchemaValidator};
use crate::store::{CasOutcome, PlanStore, StoredPlan};

/// Member holding a plan's identifier.
pub const OBJECT_ID: &str = "objectId";

/// A plan body together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// The plan document.
    pub body: Value,
    /// Fingerprint of `body`.
    pub etag: ETag,
}

impl From<StoredPlan> for Versioned {
    fn from(plan: StoredPlan) -> Self {
        Self {
            body: plan.body,
            etag: plan.etag,
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Identifier of the new plan.
    pub object_id: String,
    /// Fingerprint of the new plan.
    pub etag: ETag,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The caller's cached copy is current.
    NotModified(ETag),
    /// The current plan.
    Current(Versioned),
}

impl ReadOutcome {
    /// The fingerprint current at read time.
    #[must_use]
    pub const fn etag(&self) -> &ETag {
        match self {
            Self::NotModified(etag) => etag,
            Self::Current(versioned) => &versioned.etag,
        }
    }
}

/// Orchestrates the plan lifecycle against a store and an index publisher.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use planvault_core::fixtures::RecordingPublisher;
/// use planvault_core::{JsonSchemaValidator, MemoryPlanStore, PlanController};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let controller = PlanController::new(
///     Arc::new(MemoryPlanStore::new()),
///     Arc::new(RecordingPublisher::new()),
///     Arc::new(JsonSchemaValidator::plan().unwrap()),
/// );
///
/// let created = controller.create(Some(json!({"objectId": "p1"}))).await.unwrap();
/// assert_eq!(created.object_id, "p1");
/// # });
/// ```
#[derive(Clone)]
pub struct PlanController {
    resource_type: String,
    store: Arc<dyn PlanStore>,
    publisher: Arc<dyn IndexPublisher>,
    validator: Arc<dyn SchemaValidator>,
}

impl std::fmt::Debug for PlanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanController")
            .field("resource_type", &self.resource_type)
            .finish_non_exhaustive()
    }
}

impl PlanController {
    /// Creates a controller for the default `plan` resource type.
    #[must_use]
    pub fn new(
        store: Arc<dyn PlanStore>,
        publisher: Arc<dyn IndexPublisher>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            store,
            publisher,
            validator,
        }
    }

    /// Sets the resource type tag used in storage keys.
    #[must_use]
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    /// Returns the resource type tag.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Derives the storage key for `object_id`.
    #[must_use]
    pub fn key(&self, object_id: &str) -> PlanKey {
        PlanKey::new(&self.resource_type, object_id)
    }

    /// Creates a plan from a full document.
    pub async fn create(&self, body: Option<Value>) -> PlanResult<Created> {
        let body = require_object(body, None)?;
        self.validate(&body, None)?;

        let object_id = body
            .get(OBJECT_ID)
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| PlanError::invalid_input("objectId must be a string", None))?;

        let key = self.key(&object_id);
        let plan = StoredPlan::new(&key, body);
        let etag = plan.etag.clone();
        let indexed = plan.body.clone();

        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);
        run_to_completion(async move {
            if !store.insert_if_absent(&key, plan).await? {
                tracing::info!(%key, "create rejected, plan already exists");
                return Err(PlanError::already_exists(object_id));
            }

            publisher.publish(IndexIntent::store(indexed));
            tracing::info!(%key, %etag, "plan created");

            Ok(Created { object_id, etag })
        })
        .await
    }

    /// Reads a plan, honoring an `If-None-Match` token.
    pub async fn read(&self, object_id: &str, if_none_match: Option<&str>) -> PlanResult<ReadOutcome> {
        let key = self.key(object_id);
        let current = self.load(&key, object_id).await?;

        if let Some(token) = if_none_match {
            if current.etag.matches(token) {
                tracing::debug!(%key, etag = %current.etag, "etag match, not modified");
                return Ok(ReadOutcome::NotModified(current.etag));
            }
        }

        Ok(ReadOutcome::Current(current.into()))
    }

    /// Replaces a plan with a full document.
    pub async fn replace(
        &self,
        object_id: &str,
        body: Option<Value>,
        if_match: Option<&str>,
    ) -> PlanResult<Versioned> {
        let key = self.key(object_id);
        let current = self.load(&key, object_id).await?;

        let body = require_object(body, Some(object_id))?;
        self.validate(&body, Some(object_id))?;
        ensure_identity(&body, object_id)?;
        check_precondition(&current, object_id, if_match)?;

        let next = StoredPlan::new(&key, body);
        self.commit_replace(key, object_id, current, next).await
    }

    /// Merges a partial document into a plan.
    ///
    /// See [`crate::merge::merge`] for the merge rules. The merged document
    /// must satisfy the schema.
    pub async fn merge(
        &self,
        object_id: &str,
        patch: Option<Value>,
        if_match: Option<&str>,
    ) -> PlanResult<Versioned> {
        let key = self.key(object_id);
        let current = self.load(&key, object_id).await?;

        let patch = require_object(patch, Some(object_id))?;
        if patch.get(OBJECT_ID).is_some() {
            ensure_identity(&patch, object_id)?;
        }
        check_precondition(&current, object_id, if_match)?;

        let merged = merge(&current.body, &patch);
        self.validate(&merged, Some(object_id))?;

        let next = StoredPlan::new(&key, merged);
        self.commit_replace(key, object_id, current, next).await
    }

    /// Deletes a plan.
    pub async fn delete(&self, object_id: &str, if_match: Option<&str>) -> PlanResult<()> {
        let key = self.key(object_id);
        let current = self.load(&key, object_id).await?;
        check_precondition(&current, object_id, if_match)?;

        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);
        let object_id = object_id.to_string();
        run_to_completion(async move {
            match store.delete_if_match(&key, &current.etag).await? {
                CasOutcome::Applied => {
                    publisher.publish(IndexIntent::delete(current.body));
                    tracing::info!(%key, "plan deleted");
                    Ok(())
                }
                CasOutcome::Missing => Err(PlanError::not_found(object_id)),
                CasOutcome::Stale(winner) => {
                    tracing::warn!(%key, etag = %winner, "delete lost to a concurrent write");
                    Err(PlanError::precondition_failed(object_id, winner))
                }
            }
        })
        .await
    }

    async fn load(&self, key: &PlanKey, object_id: &str) -> PlanResult<StoredPlan> {
        match self.store.get(key).await? {
            Some(plan) => Ok(plan),
            None => {
                tracing::debug!(%key, "plan not found");
                Err(PlanError::not_found(object_id))
            }
        }
    }

    async fn commit_replace(
        &self,
        key: PlanKey,
        object_id: &str,
        current: StoredPlan,
        next: StoredPlan,
    ) -> PlanResult<Versioned> {
        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);
        let object_id = object_id.to_string();
        run_to_completion(async move {
            let indexed = next.body.clone();
            match store.replace_if_match(&key, &current.etag, next.clone()).await? {
                CasOutcome::Applied => {
                    publisher.publish(IndexIntent::delete(current.body));
                    publisher.publish(IndexIntent::store(indexed));
                    tracing::info!(%key, etag = %next.etag, previous = %current.etag, "plan updated");
                    Ok(next.into())
                }
                CasOutcome::Missing => Err(PlanError::not_found(object_id)),
                CasOutcome::Stale(winner) => {
                    tracing::warn!(%key, etag = %winner, "update lost to a concurrent write");
                    Err(PlanError::precondition_failed(object_id, winner))
                }
            }
        })
        .await
    }

    fn validate(&self, document: &Value, object_id: Option<&str>) -> PlanResult<()> {
        match self.validator.validate(document) {
            Ok(()) => Ok(()),
            Err(SchemaError::Violations { violations }) => {
                tracing::debug!(?object_id, count = violations.len(), "schema validation failed");
                Err(PlanError::invalid_schema(object_id, violations))
            }
            Err(err @ SchemaError::InvalidSchema { .. }) => {
                Err(PlanError::unexpected("schema validator failure", err))
            }
        }
    }
}

/// Runs `write` on its own task; it finishes even if the caller is dropped.
async fn run_to_completion<T, F>(write: F) -> PlanResult<T>
where
    T: Send + 'static,
    F: Future<Output = PlanResult<T>> + Send + 'static,
{
    tokio::spawn(write)
        .await
        .map_err(|e| PlanError::unexpected("plan write task failed", e))?
}

fn require_object(body: Option<Value>, object_id: Option<&str>) -> PlanResult<Value> {
    match body {
        Some(body @ Value::Object(_)) => Ok(body),
        _ => Err(PlanError::invalid_input("Invalid body!", object_id)),
    }
}

fn ensure_identity(body: &Value, object_id: &str) -> PlanResult<()> {
    match body.get(OBJECT_ID).and_then(Value::as_str) {
        Some(id) if id == object_id => Ok(()),
        _ => Err(PlanError::invalid_input(
            format!("objectId in body does not match {object_id}"),
            Some(object_id),
        )),
    }
}

fn check_precondition(current: &StoredPlan, object_id: &str, if_match: Option<&str>) -> PlanResult<()> {
    let Some(token) = if_match else {
        return Err(PlanError::precondition_missing(object_id));
    };
    if current.etag.matches(token) {
        Ok(())
    } else {
        tracing::info!(object_id, etag = %current.etag, "etag mismatch");
        Err(PlanError::precondition_failed(object_id, current.etag.clone()))
    }
}
