//! Shared outbox types.
//!
//! Everything here is plain data: it is what gets persisted between enqueue and
//! delivery, so it must survive a process restart unchanged.

use core::str::FromStr;

use motodesk_core::{DomainError, OutboxId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which submission route a job takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "quotation-save")]
    QuotationSave,
    #[serde(rename = "minor-sale-save")]
    MinorSaleSave,
}

impl JobType {
    pub const ALL: [JobType; 2] = [JobType::QuotationSave, JobType::MinorSaleSave];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::QuotationSave => "quotation-save",
            JobType::MinorSaleSave => "minor-sale-save",
        }
    }

    /// Store key of the outbox holding jobs of this type.
    pub fn outbox_key(&self) -> &'static str {
        match self {
            JobType::QuotationSave => "outbox:quotations",
            JobType::MinorSaleSave => "outbox:minor-sales",
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown job type {s:?}")))
    }
}

/// A unit of deferred submission work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub data: Value,
}

impl Job {
    pub fn new(job_type: JobType, data: Value) -> Self {
        Self { job_type, data }
    }
}

/// One persisted outbox record: `{ "id": ..., "job": { "type": ..., "data": ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub job: Job,
}

/// Connectivity state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Online and able to reach the webhooks.
    Online,
    /// Offline (network unreachable or health probe failing).
    Offline,
}

/// What one retry pass over one outbox did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub outbox: String,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Jobs kept because their destination is not configured.
    pub held_unconfigured: usize,
    /// Jobs dropped as local successes because their destination is not configured.
    pub dropped_unconfigured: usize,
    /// Another pass over the same outbox was already running.
    pub skipped: bool,
    pub remaining: usize,
}

impl PassReport {
    pub fn new(outbox: impl Into<String>) -> Self {
        Self {
            outbox: outbox.into(),
            ..Default::default()
        }
    }

    pub fn skipped(outbox: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::new(outbox)
        }
    }
}
