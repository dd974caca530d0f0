//! Job type to destination routing.

use std::collections::HashMap;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::types::JobType;

/// What to do with a job whose destination URL is not configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnconfiguredPolicy {
    /// Demo mode: count the job as delivered and drop it.
    TreatAsDelivered,
    /// Keep the job until a destination is configured.
    Hold,
}

/// Where and how jobs of one type are submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: Option<Url>,
    pub method: Method,
    /// Webhook `action` field identifying the operation.
    pub action: String,
    pub unconfigured: UnconfiguredPolicy,
}

impl Destination {
    pub fn new(url: Option<Url>, action: impl Into<String>, unconfigured: UnconfiguredPolicy) -> Self {
        Self {
            url,
            method: Method::POST,
            action: action.into(),
            unconfigured,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Ready(&'a Destination),
    Unconfigured(UnconfiguredPolicy),
}

#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    destinations: HashMap<JobType, Destination>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the dealership's two routes.
    pub fn defaults(quotation_url: Option<Url>, minor_sale_url: Option<Url>) -> Self {
        let mut registry = Self::new();
        registry.register(
            JobType::QuotationSave,
            Destination::new(quotation_url, "saveQuotation", UnconfiguredPolicy::Hold),
        );
        registry.register(
            JobType::MinorSaleSave,
            Destination::new(minor_sale_url, "saveMinorSale", UnconfiguredPolicy::TreatAsDelivered),
        );
        registry
    }

    pub fn register(&mut self, job_type: JobType, destination: Destination) -> &mut Self {
        self.destinations.insert(job_type, destination);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&Destination> {
        self.destinations.get(&job_type)
    }

    /// Route for `job_type`. Types with no registration are held.
    pub fn resolve(&self, job_type: JobType) -> Route<'_> {
        match self.destinations.get(&job_type) {
            Some(dest) if dest.url.is_some() => Route::Ready(dest),
            Some(dest) => Route::Unconfigured(dest.unconfigured),
            None => Route::Unconfigured(UnconfiguredPolicy::Hold),
        }
    }
}
