//! Connectivity detection.
//!
//! The monitor publishes [`ConnectivityState`] on a watch channel. The sync
//! worker reacts to `Offline -> Online` transitions.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

pub use crate::types::ConnectivityState;

#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("client is offline; operation requires network connection")]
    Offline,
}

#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.state() == ConnectivityState::Offline
    }

    pub fn set_online(&self) {
        self.set(ConnectivityState::Online);
    }

    pub fn set_offline(&self) {
        self.set(ConnectivityState::Offline);
    }

    /// Publish `state`; subscribers are only woken on an actual change.
    pub fn set(&self, state: ConnectivityState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            tracing::info!(?state, "connectivity changed");
        }
    }

    pub fn require_online(&self) -> Result<(), OfflineError> {
        if self.is_offline() {
            Err(OfflineError::Offline)
        } else {
            Ok(())
        }
    }

    /// Probe `health_url` every `interval` until shut down.
    ///
    /// Without a health URL there is nothing to probe and the monitor stays
    /// online.
    pub fn spawn(
        self: Arc<Self>,
        client: reqwest::Client,
        health_url: Option<Url>,
        interval: Duration,
    ) -> MonitorHandle {
        let shutdown = Arc::new(Notify::new());
        let stop = Arc::clone(&shutdown);

        let join = tokio::spawn(async move {
            let Some(url) = health_url else {
                self.set_online();
                stop.notified().await;
                return;
            };

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop.notified() => break,
                    _ = ticker.tick() => {
                        self.set(probe(&client, &url).await);
                    }
                }
            }
            tracing::debug!("connectivity monitor stopped");
        });

        MonitorHandle { shutdown, join }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

/// One probe. Any HTTP response means the network is reachable.
pub async fn probe(client: &reqwest::Client, url: &Url) -> ConnectivityState {
    match client.get(url.clone()).send().await {
        Ok(_) => ConnectivityState::Online,
        Err(err) => {
            tracing::debug!(error = %err, "connectivity probe failed");
            ConnectivityState::Offline
        }
    }
}

pub struct MonitorHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn shutdown_and_join(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            tracing::warn!(error = %err, "connectivity monitor task failed");
        }
    }
}
