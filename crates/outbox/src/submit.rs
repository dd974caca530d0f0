//! Webhook submission: one attempt per call, normalized to delivered/failed.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::routing::Destination;
use crate::types::OutboxEntry;

/// Body posted to a webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookRequest {
    pub action: String,
    pub data: Value,
}

impl WebhookRequest {
    /// Build the request for an outbox entry. `data.outboxId` carries the job
    /// id so the receiver can deduplicate repeated deliveries.
    pub fn for_entry(destination: &Destination, entry: &OutboxEntry) -> Self {
        let outbox_id = Value::String(entry.id.to_string());
        let data = match entry.job.data.clone() {
            Value::Object(mut fields) => {
                fields.insert("outboxId".to_string(), outbox_id);
                Value::Object(fields)
            }
            other => {
                let mut fields = Map::new();
                fields.insert("payload".to_string(), other);
                fields.insert("outboxId".to_string(), outbox_id);
                Value::Object(fields)
            }
        };
        Self {
            action: destination.action.clone(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("webhook answered with status {0}")]
    Status(u16),
    #[error("webhook rejected the submission: {0}")]
    Rejected(String),
    #[error("destination is not configured")]
    Unconfigured,
    #[error("submission task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Delivered,
    Failed(SubmitFailure),
}

impl SubmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered)
    }
}

/// Sends one request to a destination.
///
/// Implementations never return errors or panic outward on network problems;
/// every problem is a [`SubmitOutcome::Failed`].
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, destination: &Destination, request: &WebhookRequest) -> SubmitOutcome;
}

/// Decide the outcome from a webhook response.
///
/// A JSON body with a `success` (or `ok`) field decides on its own; any other
/// body falls back to the HTTP status.
pub fn interpret_response(status: u16, body: &str) -> SubmitOutcome {
    let verdict = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        let flag = json.get("success").or_else(|| json.get("ok"))?;
        Some((truthy(flag), json))
    });

    match verdict {
        Some((true, _)) => SubmitOutcome::Delivered,
        Some((false, json)) => {
            let reason = json
                .get("error")
                .or_else(|| json.get("message"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| format!("status {status}"));
            SubmitOutcome::Failed(SubmitFailure::Rejected(reason))
        }
        None if (200..300).contains(&status) => SubmitOutcome::Delivered,
        None => SubmitOutcome::Failed(SubmitFailure::Status(status)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "ok" | "1" | "yes"),
        _ => false,
    }
}

/// [`Submitter`] over HTTP with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
}

impl HttpSubmitter {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for webhook submissions")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, destination: &Destination, request: &WebhookRequest) -> SubmitOutcome {
        let Some(url) = destination.url.clone() else {
            return SubmitOutcome::Failed(SubmitFailure::Unconfigured);
        };

        let resp = match self
            .client
            .request(destination.method.clone(), url)
            .json(request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => return SubmitOutcome::Failed(SubmitFailure::Transport(err.to_string())),
        };

        let status = resp.status().as_u16();
        match resp.text().await {
            Ok(body) => interpret_response(status, &body),
            Err(err) => SubmitOutcome::Failed(SubmitFailure::Transport(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::UnconfiguredPolicy;
    use crate::types::{Job, JobType};
    use serde_json::json;

    fn destination() -> Destination {
        Destination::new(None, "saveQuotation", UnconfiguredPolicy::Hold)
    }

    #[test]
    fn request_carries_outbox_id() {
        let entry = OutboxEntry {
            id: "1700000000000:0badf00d".parse().unwrap(),
            job: Job::new(JobType::QuotationSave, json!({ "serialNo": "Q-BYD-AB12CD" })),
        };
        let req = WebhookRequest::for_entry(&destination(), &entry);

        assert_eq!(req.action, "saveQuotation");
        assert_eq!(req.data["outboxId"], "1700000000000:0badf00d");
        assert_eq!(req.data["serialNo"], "Q-BYD-AB12CD");
    }

    #[test]
    fn non_object_data_is_wrapped() {
        let entry = OutboxEntry {
            id: "1:aa".parse().unwrap(),
            job: Job::new(JobType::MinorSaleSave, json!([1, 2])),
        };
        let req = WebhookRequest::for_entry(&destination(), &entry);
        assert_eq!(req.data, json!({ "payload": [1, 2], "outboxId": "1:aa" }));
    }

    #[test]
    fn body_flag_decides_before_status() {
        assert_eq!(interpret_response(200, r#"{"success":true}"#), SubmitOutcome::Delivered);
        assert_eq!(interpret_response(200, r#"{"ok":"true"}"#), SubmitOutcome::Delivered);
        assert_eq!(interpret_response(500, r#"{"success":1}"#), SubmitOutcome::Delivered);
        assert_eq!(
            interpret_response(200, r#"{"success":false,"error":"sheet locked"}"#),
            SubmitOutcome::Failed(SubmitFailure::Rejected("sheet locked".to_string()))
        );
        assert!(!interpret_response(200, r#"{"ok":0}"#).is_delivered());
    }

    #[test]
    fn status_decides_without_a_flag() {
        assert_eq!(interpret_response(200, "Saved"), SubmitOutcome::Delivered);
        assert_eq!(interpret_response(204, ""), SubmitOutcome::Delivered);
        assert_eq!(interpret_response(200, r#"{"row":12}"#), SubmitOutcome::Delivered);
        assert_eq!(
            interpret_response(503, "<html>busy</html>"),
            SubmitOutcome::Failed(SubmitFailure::Status(503))
        );
    }

    #[tokio::test]
    async fn unconfigured_destination_fails_without_a_request() {
        let submitter = HttpSubmitter::new(Duration::from_secs(1)).unwrap();
        let req = WebhookRequest {
            action: "saveQuotation".to_string(),
            data: json!({}),
        };
        assert_eq!(
            submitter.submit(&destination(), &req).await,
            SubmitOutcome::Failed(SubmitFailure::Unconfigured)
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_failure() {
        let submitter = HttpSubmitter::new(Duration::from_millis(500)).unwrap();
        let dest = Destination::new(
            Some("http://127.0.0.1:9/exec".parse().unwrap()),
            "saveQuotation",
            UnconfiguredPolicy::Hold,
        );
        let req = WebhookRequest {
            action: dest.action.clone(),
            data: json!({}),
        };
        assert!(matches!(
            submitter.submit(&dest, &req).await,
            SubmitOutcome::Failed(SubmitFailure::Transport(_))
        ));
    }
}
