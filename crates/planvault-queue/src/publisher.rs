//! Channel-backed index publishers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use planvault_core::{IndexIntent, IndexPublisher};
use planvault_telemetry::metrics::{record_index_intent, IntentResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sink::IntentSink;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per intent, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// An [`IndexPublisher`] that delivers through a background task.
///
/// `publish` never blocks: intents are queued on a channel holding at most
/// `capacity` of them and a single task drains it into the sink in order.
/// When the channel is full the new intent is logged, counted and dropped, as
/// is an intent that still fails after the retry budget.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct ChannelPublisher {
    sender: Mutex<Option<mpsc::Sender<IndexIntent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelPublisher {
    /// Default number of intents buffered ahead of delivery.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Starts the delivery task for `sink`, buffering up to `capacity` intents.
    pub fn spawn(sink: Arc<dyn IntentSink>, retry: RetryPolicy, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, retry, receiver));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops accepting intents and waits until everything already queued has
    /// been delivered or given up on.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "index publisher task failed");
            }
        }
    }
}

impl IndexPublisher for ChannelPublisher {
    fn publish(&self, intent: IndexIntent) {
        let operation = intent.operation.as_str();
        let result = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(intent),
            None => Err(mpsc::error::TrySendError::Closed(intent)),
        };
        match result {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(intent)) => {
                tracing::error!(operation, body = %intent.body, "index queue is full, dropping intent");
                record_index_intent(operation, IntentResult::Dropped);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(operation, "index publisher is shut down, dropping intent");
                record_index_intent(operation, IntentResult::Dropped);
            }
        }
    }
}

async fn run_worker(
    sink: Arc<dyn IntentSink>,
    retry: RetryPolicy,
    mut receiver: mpsc::Receiver<IndexIntent>,
) {
    tracing::debug!(sink = sink.name(), "index publisher started");
    while let Some(intent) = receiver.recv().await {
        let result = deliver(sink.as_ref(), &retry, &intent).await;
        record_index_intent(intent.operation.as_str(), result);
    }
    tracing::debug!(sink = sink.name(), "index publisher drained");
}

async fn deliver(sink: &dyn IntentSink, retry: &RetryPolicy, intent: &IndexIntent) -> IntentResult {
    let operation = intent.operation.as_str();
    let max_attempts = retry.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match sink.deliver(intent).await {
            Ok(()) => {
                tracing::debug!(sink = sink.name(), operation, attempt, "index intent delivered");
                return IntentResult::Delivered;
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = retry.backoff(attempt);
                tracing::warn!(
                    sink = sink.name(),
                    operation,
                    attempt,
                    error = %e,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "index intent delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    sink = sink.name(),
                    operation,
                    attempt,
                    error = %e,
                    body = %intent.body,
                    "index intent delivery failed, giving up"
                );
                return IntentResult::Failed;
            }
        }
    }
    IntentResult::Failed
}

/// An [`IndexPublisher`] that discards every intent.
///
/// Used when indexing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardPublisher;

impl IndexPublisher for DiscardPublisher {
    fn publish(&self, intent: IndexIntent) {
        tracing::trace!(operation = intent.operation.as_str(), "indexing disabled, discarding intent");
        record_index_intent(intent.operation.as_str(), IntentResult::Dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use async_trait::async_trait;
    use planvault_core::IntentOperation;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` deliveries, then records.
    #[derive(Default)]
    struct FlakySink {
        failures: AtomicU32,
        attempts: AtomicU32,
        delivered: Mutex<Vec<IndexIntent>>,
        permanent: bool,
    }

    #[async_trait]
    impl IntentSink for FlakySink {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn deliver(&self, intent: &IndexIntent) -> Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(SinkError::Rejected {
                    status: 400,
                    body: "bad request".into(),
                });
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SinkError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            self.delivered.lock().push(intent.clone());
            Ok(())
        }
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
        assert_eq!(RetryPolicy::no_retry().backoff(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_preserves_publication_order() {
        let sink = Arc::new(FlakySink::default());
        let publisher = ChannelPublisher::spawn(sink.clone(), quick_retry(3), 16);

        publisher.publish(IndexIntent::store(json!({"objectId": "p1"})));
        publisher.publish(IndexIntent::delete(json!({"objectId": "p1"})));
        publisher.publish(IndexIntent::store(json!({"objectId": "p1", "v": 2})));
        publisher.shutdown().await;

        let ops: Vec<_> = sink.delivered.lock().iter().map(|i| i.operation).collect();
        assert_eq!(
            ops,
            vec![IntentOperation::Store, IntentOperation::Delete, IntentOperation::Store]
        );
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let sink = Arc::new(FlakySink {
            failures: AtomicU32::new(2),
            ..FlakySink::default()
        });
        let publisher = ChannelPublisher::spawn(sink.clone(), quick_retry(3), 16);

        publisher.publish(IndexIntent::store(json!({"objectId": "p1"})));
        publisher.shutdown().await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(sink.delivered.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget_and_continues() {
        let sink = Arc::new(FlakySink {
            failures: AtomicU32::new(2),
            ..FlakySink::default()
        });
        let publisher = ChannelPublisher::spawn(sink.clone(), quick_retry(2), 16);

        publisher.publish(IndexIntent::store(json!({"objectId": "lost"})));
        publisher.publish(IndexIntent::store(json!({"objectId": "kept"})));
        publisher.shutdown().await;

        let delivered = sink.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].body["objectId"], "kept");
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let sink = Arc::new(FlakySink {
            permanent: true,
            ..FlakySink::default()
        });
        let publisher = ChannelPublisher::spawn(sink.clone(), quick_retry(5), 16);

        publisher.publish(IndexIntent::store(json!({"objectId": "p1"})));
        publisher.shutdown().await;

        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_dropped() {
        let sink = Arc::new(FlakySink::default());
        let publisher = ChannelPublisher::spawn(sink.clone(), RetryPolicy::default(), 4);
        publisher.shutdown().await;
        publisher.shutdown().await;

        publisher.publish(IndexIntent::store(json!({"objectId": "late"})));
        assert!(sink.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = Arc::new(FlakySink::default());
        let publisher = ChannelPublisher::spawn(sink.clone(), quick_retry(1), 2);

        // The worker cannot run until this task yields, so the queue fills.
        for v in 0..5 {
            publisher.publish(IndexIntent::store(json!({"objectId": "p1", "v": v})));
        }
        publisher.shutdown().await;

        let versions: Vec<_> = sink.delivered.lock().iter().map(|i| i.body["v"].clone()).collect();
        assert_eq!(versions, vec![json!(0), json!(1)]);
    }

    #[test]
    fn test_discard_publisher() {
        DiscardPublisher.publish(IndexIntent::store(json!({"objectId": "p1"})));
    }
}
