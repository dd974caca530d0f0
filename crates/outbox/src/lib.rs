//! `motodesk-outbox`
//!
//! **Responsibility:** durable offline outbox for dealership saves.
//!
//! This crate provides:
//! - Per-outbox durable storage (`store`) and the FIFO queue over it (`queue`)
//! - Webhook routing and one-shot submission (`routing`, `submit`)
//! - The retry coordinator and the background worker that triggers it
//! - Two-phase save flows for quotations and minor sales (`save_flow`, `callers`)
//!
//! A save is complete once its job is in the outbox; delivery to the webhook
//! happens afterwards and is retried until it is confirmed.

pub mod callers;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod queue;
pub mod routing;
pub mod save_flow;
pub mod store;
pub mod submit;
pub mod types;
pub mod worker;

pub use callers::{MinorSaleSaves, QuotationSaves, SaveFlows};
pub use config::OutboxConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use coordinator::{Delivery, RetryCoordinator};
pub use queue::OutboxQueue;
pub use routing::{Destination, DestinationRegistry, Route, UnconfiguredPolicy};
pub use save_flow::{OutboxPayload, SaveFlow, StagedSave};
pub use store::{FileStore, InMemoryStore, PersistentStore};
pub use submit::{HttpSubmitter, SubmitFailure, SubmitOutcome, Submitter, WebhookRequest};
pub use types::{Job, JobType, OutboxEntry, PassReport};
pub use worker::{SyncEvent, SyncTrigger, SyncWorker, SyncWorkerHandle};
