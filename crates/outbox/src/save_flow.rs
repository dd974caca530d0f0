//! Two-phase save: stage into the outbox, then try delivery once.
//!
//! Staging is synchronous and never touches the network, so a save is
//! complete from the user's point of view as soon as [`SaveFlow::stage`]
//! returns. Delivery happens afterwards, and anything it misses is picked up
//! by the retry coordinator.

use std::marker::PhantomData;
use std::sync::Arc;

use motodesk_core::{DomainError, DomainResult, OutboxId};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::coordinator::{Delivery, deliver_once};
use crate::queue::OutboxQueue;
use crate::routing::DestinationRegistry;
use crate::store::PersistentStore;
use crate::submit::Submitter;
use crate::types::{Job, JobType, OutboxEntry};

/// A domain record that is saved through an outbox.
pub trait OutboxPayload: Serialize + Send + Sync + 'static {
    const JOB_TYPE: JobType;

    /// Form-level checks. Invalid payloads never reach the outbox.
    fn validate(&self) -> DomainResult<()>;
}

/// A job that is durably queued but not yet attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedSave {
    pub entry: OutboxEntry,
}

impl StagedSave {
    pub fn id(&self) -> &OutboxId {
        &self.entry.id
    }

    pub fn job(&self) -> &Job {
        &self.entry.job
    }
}

pub struct SaveFlow<P> {
    queue: OutboxQueue,
    registry: Arc<DestinationRegistry>,
    submitter: Arc<dyn Submitter>,
    /// Where delivery attempts run; defaults to the caller's runtime.
    runtime: Option<Handle>,
    _payload: PhantomData<fn(&P)>,
}

impl<P> Clone for SaveFlow<P> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            registry: Arc::clone(&self.registry),
            submitter: Arc::clone(&self.submitter),
            runtime: self.runtime.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> std::fmt::Debug for SaveFlow<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveFlow").field("queue", &self.queue).finish_non_exhaustive()
    }
}

impl<P: OutboxPayload> SaveFlow<P> {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        registry: Arc<DestinationRegistry>,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        Self {
            queue: OutboxQueue::for_job_type(store, P::JOB_TYPE),
            registry,
            submitter,
            runtime: None,
            _payload: PhantomData,
        }
    }

    /// Run delivery attempts on `handle`, so saves can come from threads
    /// outside any runtime.
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn queue(&self) -> &OutboxQueue {
        &self.queue
    }

    /// Phase one: validate, snapshot the payload as plain data and enqueue it.
    pub fn stage(&self, payload: &P) -> DomainResult<StagedSave> {
        payload.validate()?;

        let data = serde_json::to_value(payload).map_err(|e| DomainError::serialization(e.to_string()))?;
        if !data.is_object() {
            return Err(DomainError::invariant(format!(
                "{} payload must serialize to an object",
                P::JOB_TYPE
            )));
        }

        let job = Job::new(P::JOB_TYPE, data);
        let id = self.queue.enqueue(job.clone());
        Ok(StagedSave {
            entry: OutboxEntry { id, job },
        })
    }

    /// Phase two: one immediate delivery attempt in the background.
    ///
    /// The job leaves the outbox only if the attempt settles it. Failures are
    /// logged and left for the next retry pass; nothing is reported back to
    /// the caller beyond the returned [`Delivery`].
    ///
    /// # Panics
    ///
    /// Panics when no runtime was set with [`SaveFlow::with_runtime`] and the
    /// caller is not inside a tokio runtime.
    pub fn confirm(&self, staged: StagedSave) -> JoinHandle<Delivery> {
        let handle = self.runtime.clone().unwrap_or_else(Handle::current);
        self.attempt(&handle, staged)
    }

    /// Stage and fire the delivery attempt without waiting for it.
    ///
    /// Without a runtime to run the attempt on, the job is only queued and
    /// the next retry pass delivers it.
    pub fn save(&self, payload: &P) -> DomainResult<OutboxId> {
        let staged = self.stage(payload)?;
        let id = staged.id().clone();
        match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            // Detached; the outcome is only visible through the outbox.
            Some(handle) => drop(self.attempt(&handle, staged)),
            None => tracing::warn!(
                outbox = %self.queue.key(),
                %id,
                "no async runtime for the immediate attempt; job queued for the next retry pass"
            ),
        }
        Ok(id)
    }

    fn attempt(&self, handle: &Handle, staged: StagedSave) -> JoinHandle<Delivery> {
        let queue = self.queue.clone();
        let registry = Arc::clone(&self.registry);
        let submitter = Arc::clone(&self.submitter);

        handle.spawn(async move {
            let entry = staged.entry;
            let delivery = deliver_once(&registry, &submitter, &entry).await;
            if delivery.is_settled() {
                queue.remove(&entry.id);
            } else {
                tracing::info!(
                    outbox = %queue.key(),
                    id = %entry.id,
                    ?delivery,
                    "immediate delivery did not complete; job stays queued"
                );
            }
            delivery
        })
    }
}
