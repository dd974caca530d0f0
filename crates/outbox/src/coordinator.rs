//! Retry coordinator: drains outboxes, removing only confirmed deliveries.
//!
//! Each job is attempted at most once per pass and stays queued until a
//! delivery is confirmed. There is no backoff and no attempt limit; a job that
//! keeps failing is retried on every pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::queue::OutboxQueue;
use crate::routing::{DestinationRegistry, Route, UnconfiguredPolicy};
use crate::store::PersistentStore;
use crate::submit::{SubmitFailure, SubmitOutcome, Submitter, WebhookRequest};
use crate::types::{JobType, OutboxEntry, PassReport};

/// Result of one delivery attempt for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Attempted(SubmitOutcome),
    Unconfigured(UnconfiguredPolicy),
}

impl Delivery {
    /// Whether the entry should leave the outbox.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Delivery::Attempted(SubmitOutcome::Delivered)
                | Delivery::Unconfigured(UnconfiguredPolicy::TreatAsDelivered)
        )
    }
}

/// Attempt delivery of `entry` once.
///
/// The submission runs in its own task, so a panicking submitter only fails
/// this entry.
pub async fn deliver_once(
    registry: &DestinationRegistry,
    submitter: &Arc<dyn Submitter>,
    entry: &OutboxEntry,
) -> Delivery {
    let destination = match registry.resolve(entry.job.job_type) {
        Route::Ready(dest) => dest.clone(),
        Route::Unconfigured(policy) => return Delivery::Unconfigured(policy),
    };

    let request = WebhookRequest::for_entry(&destination, entry);
    let submitter = Arc::clone(submitter);
    let attempt = tokio::spawn(async move { submitter.submit(&destination, &request).await });

    match attempt.await {
        Ok(outcome) => Delivery::Attempted(outcome),
        Err(err) => Delivery::Attempted(SubmitOutcome::Failed(SubmitFailure::Aborted(err.to_string()))),
    }
}

struct Lane {
    queue: OutboxQueue,
    in_pass: AtomicBool,
}

/// Clears the lane flag when the pass ends, including on cancellation.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct RetryCoordinator {
    lanes: Vec<Lane>,
    registry: Arc<DestinationRegistry>,
    submitter: Arc<dyn Submitter>,
}

impl std::fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("outboxes", &self.lanes.iter().map(|l| l.queue.key()).collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl RetryCoordinator {
    pub fn new(registry: Arc<DestinationRegistry>, submitter: Arc<dyn Submitter>) -> Self {
        Self {
            lanes: Vec::new(),
            registry,
            submitter,
        }
    }

    /// Coordinator over one outbox per known job type.
    pub fn for_all_job_types(
        store: Arc<dyn PersistentStore>,
        registry: Arc<DestinationRegistry>,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        JobType::ALL.into_iter().fold(Self::new(registry, submitter), |c, job_type| {
            c.with_queue(OutboxQueue::for_job_type(Arc::clone(&store), job_type))
        })
    }

    pub fn with_queue(mut self, queue: OutboxQueue) -> Self {
        self.lanes.push(Lane {
            queue,
            in_pass: AtomicBool::new(false),
        });
        self
    }

    pub fn queues(&self) -> impl Iterator<Item = &OutboxQueue> {
        self.lanes.iter().map(|l| &l.queue)
    }

    pub fn registry(&self) -> &Arc<DestinationRegistry> {
        &self.registry
    }

    pub fn submitter(&self) -> &Arc<dyn Submitter> {
        &self.submitter
    }

    /// Run one pass over every outbox, in registration order.
    pub async fn run_pass(&self) -> Vec<PassReport> {
        let mut reports = Vec::with_capacity(self.lanes.len());
        for lane in &self.lanes {
            reports.push(self.drain(lane).await);
        }
        reports
    }

    /// Run one pass over the outbox stored under `key`, if there is one.
    pub async fn run_lane(&self, key: &str) -> Option<PassReport> {
        let lane = self.lanes.iter().find(|l| l.queue.key() == key)?;
        Some(self.drain(lane).await)
    }

    async fn drain(&self, lane: &Lane) -> PassReport {
        let queue = &lane.queue;
        let Some(_guard) = PassGuard::acquire(&lane.in_pass) else {
            tracing::debug!(outbox = %queue.key(), "pass already running; skipping");
            return PassReport::skipped(queue.key());
        };

        let mut report = PassReport::new(queue.key());
        let entries = queue.entries();
        if entries.is_empty() {
            return report;
        }

        for entry in &entries {
            let delivery = deliver_once(&self.registry, &self.submitter, entry).await;
            match &delivery {
                Delivery::Attempted(SubmitOutcome::Delivered) => {
                    report.attempted += 1;
                    report.delivered += 1;
                    tracing::debug!(outbox = %queue.key(), id = %entry.id, "job delivered");
                }
                Delivery::Attempted(SubmitOutcome::Failed(failure)) => {
                    report.attempted += 1;
                    report.failed += 1;
                    tracing::warn!(outbox = %queue.key(), id = %entry.id, error = %failure, "delivery failed; job kept");
                }
                Delivery::Unconfigured(UnconfiguredPolicy::TreatAsDelivered) => {
                    report.dropped_unconfigured += 1;
                    tracing::info!(
                        outbox = %queue.key(),
                        id = %entry.id,
                        job_type = %entry.job.job_type,
                        "no destination configured; job treated as delivered"
                    );
                }
                Delivery::Unconfigured(UnconfiguredPolicy::Hold) => {
                    report.held_unconfigured += 1;
                    tracing::warn!(
                        outbox = %queue.key(),
                        id = %entry.id,
                        job_type = %entry.job.job_type,
                        "no destination configured; job held"
                    );
                }
            }
            if delivery.is_settled() {
                queue.remove(&entry.id);
            }
        }

        report.remaining = queue.len();
        tracing::info!(
            outbox = %report.outbox,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            held = report.held_unconfigured,
            remaining = report.remaining,
            "retry pass complete"
        );
        report
    }
}
