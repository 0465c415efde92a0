//! Test fixtures shared by the planvault crates.
//!
//! # Example
//!
//! ```
//! use planvault_core::fixtures::{sample_plan, RecordingPublisher};
//! use planvault_core::{IndexIntent, IndexPublisher};
//!
//! let publisher = RecordingPublisher::new();
//! publisher.publish(IndexIntent::store(sample_plan("p1")));
//! assert_eq!(publisher.intents().len(), 1);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::controller::PlanController;
use crate::intent::{IndexIntent, IndexPublisher, IntentOperation};
use crate::memory::MemoryPlanStore;
use crate::schema::JsonSchemaValidator;

/// An [`IndexPublisher`] that records every intent in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    intents: Mutex<Vec<IndexIntent>>,
}

impl RecordingPublisher {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded intents.
    #[must_use]
    pub fn intents(&self) -> Vec<IndexIntent> {
        self.intents.lock().clone()
    }

    /// Returns the recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<IntentOperation> {
        self.intents.lock().iter().map(|i| i.operation).collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.intents.lock().clear();
    }
}

impl IndexPublisher for RecordingPublisher {
    fn publish(&self, intent: IndexIntent) {
        self.intents.lock().push(intent);
    }
}

/// A fully populated plan document with the given identifier.
#[must_use]
pub fn sample_plan(object_id: &str) -> Value {
    json!({
        "planCostShares": {
            "deductible": 2000,
            "_org": "example.com",
            "copay": 23,
            "objectId": format!("{object_id}-cs"),
            "objectType": "membercostshare"
        },
        "linkedPlanServices": [{
            "linkedService": {
                "_org": "example.com",
                "objectId": format!("{object_id}-svc"),
                "objectType": "service",
                "name": "Yearly physical"
            },
            "planserviceCostShares": {
                "deductible": 10,
                "_org": "example.com",
                "copay": 0,
                "objectId": format!("{object_id}-svc-cs"),
                "objectType": "membercostshare"
            },
            "_org": "example.com",
            "objectId": format!("{object_id}-ps"),
            "objectType": "planservice"
        }],
        "_org": "example.com",
        "objectId": object_id,
        "objectType": "plan",
        "planType": "inNetwork",
        "creationDate": "12-12-2017"
    })
}

/// A controller over a fresh [`MemoryPlanStore`] and the bundled schema,
/// with its recording publisher.
///
/// # Panics
///
/// Panics if the bundled schema does not compile.
#[must_use]
pub fn memory_controller() -> (PlanController, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::new());
    let validator = JsonSchemaValidator::plan().expect("bundled plan schema compiles");
    let controller = PlanController::new(
        Arc::new(MemoryPlanStore::new()),
        publisher.clone(),
        Arc::new(validator),
    );
    (controller, publisher)
}
