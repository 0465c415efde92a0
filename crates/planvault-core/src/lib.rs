//! # Planvault Core
//!
//! Versioned plan resources with optimistic concurrency.
//!
//! - [`PlanKey`] - storage key derived from resource type and object id
//! - [`ETag`] - content fingerprint and `If-Match` comparison
//! - [`merge()`] - partial-update merge rules
//! - [`PlanStore`] - conditional key-value storage, with [`MemoryPlanStore`]
//! - [`IndexPublisher`] - fire-and-forget index intent delivery
//! - [`PlanController`] - the gated create/read/replace/merge/delete lifecycle
//! - [`PlanError`] - lifecycle failures and their HTTP mapping

#![doc(html_root_url = "https://docs.rs/planvault-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod controller;
mod error;
mod etag;
pub mod fixtures;
mod intent;
mod key;
mod memory;
pub mod merge;
mod schema;
mod store;

pub use context::{RequestContext, RequestId};
pub use controller::{Created, PlanController, ReadOutcome, Versioned, OBJECT_ID};
pub use error::{ErrorDetail, ErrorEnvelope, PlanError, PlanResult};
pub use etag::{Comparison, ETag};
pub use intent::{IndexIntent, IndexPublisher, IntentOperation};
pub use key::{PlanKey, DEFAULT_RESOURCE_TYPE};
pub use memory::MemoryPlanStore;
pub use merge::{merge, LINKED_PLAN_SERVICES};
pub use schema::{JsonSchemaValidator, SchemaError, SchemaValidator, PLAN_SCHEMA};
pub use store::{CasOutcome, PlanStore, StoreError, StoredPlan};
