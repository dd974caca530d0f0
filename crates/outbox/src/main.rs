//! Outbox daemon: drains the dealership outboxes in the background.
//!
//! `motodesk-outbox status` prints pending counts and exits.

use std::sync::Arc;

use anyhow::Context;
use motodesk_outbox::{
    ConnectivityMonitor, HttpSubmitter, OutboxConfig, PersistentStore, RetryCoordinator, SyncWorker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    motodesk_observability::init();

    let config = OutboxConfig::from_env().context("invalid outbox configuration")?;
    let file_store = config.open_store()?;
    tracing::info!(root = ?file_store.root(), "outbox store opened");
    let store: Arc<dyn PersistentStore> = Arc::new(file_store);

    let submitter = Arc::new(HttpSubmitter::new(config.request_timeout)?);
    let coordinator = Arc::new(RetryCoordinator::for_all_job_types(
        store,
        Arc::new(config.registry()),
        submitter,
    ));

    if std::env::args().nth(1).as_deref() == Some("status") {
        let counts: serde_json::Map<String, serde_json::Value> = coordinator
            .queues()
            .map(|q| (q.key().to_string(), q.len().into()))
            .collect();
        println!("{}", serde_json::Value::Object(counts));
        return Ok(());
    }

    if config.quotation_webhook.is_none() {
        tracing::warn!("MOTODESK_QUOTATION_WEBHOOK_URL not set; quotations will be held");
    }
    if config.minor_sale_webhook.is_none() {
        tracing::warn!("MOTODESK_MINOR_SALE_WEBHOOK_URL not set; minor sales will be treated as delivered");
    }

    let monitor = Arc::new(ConnectivityMonitor::default());
    let probe_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build HTTP client for connectivity probes")?;
    let worker = SyncWorker::new(Arc::clone(&coordinator), monitor.subscribe());
    let worker = worker.start();
    let probes = Arc::clone(&monitor).spawn(probe_client, config.health_url.clone(), config.probe_interval);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown requested");

    probes.shutdown_and_join().await;
    worker.shutdown_and_join().await;
    Ok(())
}
