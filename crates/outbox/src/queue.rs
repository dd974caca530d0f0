//! Outbox queue over a [`PersistentStore`].
//!
//! Every operation works against the latest persisted state rather than an
//! in-memory copy, so a queue can be rebuilt from the store alone at any time.

use std::sync::Arc;

use motodesk_core::{OutboxId, OutboxIdGenerator};

use crate::store::PersistentStore;
use crate::types::{Job, JobType, OutboxEntry};

/// Durable FIFO of jobs awaiting delivery, stored under one key.
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct OutboxQueue {
    store: Arc<dyn PersistentStore>,
    key: String,
    ids: &'static OutboxIdGenerator,
}

impl std::fmt::Debug for OutboxQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxQueue").field("key", &self.key).finish_non_exhaustive()
    }
}

impl OutboxQueue {
    pub fn new(store: Arc<dyn PersistentStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            ids: OutboxIdGenerator::global(),
        }
    }

    /// Queue stored under the job type's own outbox key.
    pub fn for_job_type(store: Arc<dyn PersistentStore>, job_type: JobType) -> Self {
        Self::new(store, job_type.outbox_key())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist `job` and return its id. Synchronous; never touches the network.
    pub fn enqueue(&self, job: Job) -> OutboxId {
        let id = self.ids.next_id();
        let entry = OutboxEntry { id: id.clone(), job };
        self.store.append(&self.key, &entry);
        tracing::debug!(outbox = %self.key, %id, job_type = %entry.job.job_type, "job enqueued");
        id
    }

    /// Drop the job with `id`. Unknown ids are a no-op.
    pub fn remove(&self, id: &OutboxId) {
        self.store.delete(&self.key, id);
        tracing::debug!(outbox = %self.key, %id, "job removed");
    }

    /// Current persisted entries, oldest first.
    pub fn entries(&self) -> Vec<OutboxEntry> {
        self.store.read_list(&self.key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every job in this outbox.
    pub fn clear(&self) {
        let dropped = self.len();
        self.store.write_list(&self.key, &[]);
        tracing::info!(outbox = %self.key, dropped, "outbox cleared");
    }
}
