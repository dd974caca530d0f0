//! Background sync worker.
//!
//! Runs one retry pass at startup and one on every `Offline -> Online`
//! transition published by the connectivity monitor.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;

use crate::coordinator::RetryCoordinator;
use crate::types::{ConnectivityState, PassReport};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Startup,
    Reconnected,
}

/// Emitted after every completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    PassCompleted {
        trigger: SyncTrigger,
        reports: Vec<PassReport>,
    },
}

pub struct SyncWorker {
    coordinator: Arc<RetryCoordinator>,
    connectivity: watch::Receiver<ConnectivityState>,
    events: broadcast::Sender<SyncEvent>,
    shutdown: Arc<Notify>,
}

impl SyncWorker {
    pub fn new(
        coordinator: Arc<RetryCoordinator>,
        connectivity: watch::Receiver<ConnectivityState>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            coordinator,
            connectivity,
            events,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to pass events. Subscribe before [`SyncWorker::start`] to see
    /// the startup pass.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn start(self) -> SyncWorkerHandle {
        let shutdown = Arc::clone(&self.shutdown);
        let join = tokio::spawn(self.run());
        SyncWorkerHandle { shutdown, join }
    }

    async fn run(mut self) {
        tracing::info!("background sync worker started");

        // Let the caller finish wiring up before the first pass.
        tokio::task::yield_now().await;
        let mut last = *self.connectivity.borrow_and_update();
        let mut sender_alive = true;
        let mut next = Some(SyncTrigger::Startup);

        loop {
            if let Some(trigger) = next.take() {
                let Some(saw_offline) = self.pass(trigger, &mut sender_alive).await else {
                    return;
                };
                if saw_offline {
                    last = ConnectivityState::Offline;
                }
                // Transitions during the pass were consumed by it; settle them here.
                let now = *self.connectivity.borrow_and_update();
                if is_reconnect(last, now) {
                    next = Some(SyncTrigger::Reconnected);
                }
                last = now;
                continue;
            }

            tokio::select! {
                _ = self.shutdown.notified() => break,
                changed = self.connectivity.changed(), if sender_alive => {
                    if changed.is_err() {
                        sender_alive = false;
                        continue;
                    }
                    let now = *self.connectivity.borrow_and_update();
                    if is_reconnect(last, now) {
                        next = Some(SyncTrigger::Reconnected);
                    }
                    last = now;
                }
            }
        }

        tracing::info!("background sync worker stopped");
    }

    /// Run one pass unless shutdown arrives first.
    ///
    /// Returns `None` on shutdown, otherwise whether the client went offline
    /// at any point while the pass was running.
    async fn pass(&mut self, trigger: SyncTrigger, sender_alive: &mut bool) -> Option<bool> {
        tracing::debug!(?trigger, "starting retry pass");
        let coordinator = Arc::clone(&self.coordinator);
        let shutdown = Arc::clone(&self.shutdown);
        let run = coordinator.run_pass();
        tokio::pin!(run);

        let mut saw_offline = false;
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("background sync worker stopped mid-pass");
                    return None;
                }
                changed = self.connectivity.changed(), if *sender_alive => {
                    if changed.is_err() {
                        *sender_alive = false;
                    } else if *self.connectivity.borrow_and_update() == ConnectivityState::Offline {
                        saw_offline = true;
                    }
                }
                reports = &mut run => {
                    // No subscribers is fine.
                    let _ = self.events.send(SyncEvent::PassCompleted { trigger, reports });
                    return Some(saw_offline);
                }
            }
        }
    }
}

fn is_reconnect(last: ConnectivityState, now: ConnectivityState) -> bool {
    last == ConnectivityState::Offline && now == ConnectivityState::Online
}

pub struct SyncWorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl SyncWorkerHandle {
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn shutdown_and_join(self) {
        self.shutdown();
        if let Err(err) = self.join.await {
            tracing::warn!(error = %err, "background sync worker task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use crate::coordinator::tests::{ScriptedSubmitter, configured_registry};
    use crate::queue::OutboxQueue;
    use crate::store::{InMemoryStore, PersistentStore};
    use crate::types::{Job, JobType};
    use serde_json::json;
    use std::time::Duration;

    async fn next_pass(rx: &mut broadcast::Receiver<SyncEvent>) -> (SyncTrigger, Vec<PassReport>) {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("pass event in time")
            .unwrap();
        let SyncEvent::PassCompleted { trigger, reports } = event;
        (trigger, reports)
    }

    #[tokio::test]
    async fn startup_pass_then_pass_on_reconnect() {
        let store: Arc<dyn PersistentStore> = InMemoryStore::arc();
        let queue = OutboxQueue::for_job_type(store.clone(), JobType::QuotationSave);
        let submitter = ScriptedSubmitter::failing(&[1]);
        let coordinator = Arc::new(RetryCoordinator::for_all_job_types(
            store,
            configured_registry(),
            submitter.clone(),
        ));
        queue.enqueue(Job::new(JobType::QuotationSave, json!({ "n": 1 })));

        let monitor = ConnectivityMonitor::default();
        let worker = SyncWorker::new(coordinator, monitor.subscribe());
        let mut events = worker.subscribe();
        let handle = worker.start();

        let (trigger, reports) = next_pass(&mut events).await;
        assert_eq!(trigger, SyncTrigger::Startup);
        assert_eq!(reports[0].failed, 1);

        // Online -> Online is not a reconnect.
        monitor.set_online();
        monitor.set_offline();
        tokio::time::sleep(Duration::from_millis(20)).await;
        submitter.fail.lock().unwrap().clear();
        monitor.set_online();

        let (trigger, reports) = next_pass(&mut events).await;
        assert_eq!(trigger, SyncTrigger::Reconnected);
        assert_eq!(reports[0].delivered, 1);
        assert!(queue.is_empty());

        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn connectivity_flap_during_a_pass_triggers_a_reconnect_pass() {
        let store: Arc<dyn PersistentStore> = InMemoryStore::arc();
        let queue = OutboxQueue::for_job_type(store.clone(), JobType::QuotationSave);
        let submitter = ScriptedSubmitter::failing(&[1]);
        submitter.delay_ms.store(300, std::sync::atomic::Ordering::SeqCst);
        let coordinator = Arc::new(RetryCoordinator::for_all_job_types(
            store,
            configured_registry(),
            submitter.clone(),
        ));
        queue.enqueue(Job::new(JobType::QuotationSave, json!({ "n": 1 })));

        let monitor = ConnectivityMonitor::default();
        let worker = SyncWorker::new(coordinator, monitor.subscribe());
        let mut events = worker.subscribe();
        let handle = worker.start();

        // The network drops and comes back while the startup pass is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.set_offline();
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.set_online();
        submitter.fail.lock().unwrap().clear();

        let (trigger, reports) = next_pass(&mut events).await;
        assert_eq!(trigger, SyncTrigger::Startup);
        assert_eq!(reports[0].failed, 1);

        let (trigger, reports) = next_pass(&mut events).await;
        assert_eq!(trigger, SyncTrigger::Reconnected);
        assert_eq!(reports[0].delivered, 1);
        assert!(queue.is_empty());

        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn going_offline_during_a_pass_waits_for_the_next_online() {
        let store: Arc<dyn PersistentStore> = InMemoryStore::arc();
        let queue = OutboxQueue::for_job_type(store.clone(), JobType::QuotationSave);
        let submitter = ScriptedSubmitter::failing(&[1]);
        submitter.delay_ms.store(200, std::sync::atomic::Ordering::SeqCst);
        let coordinator = Arc::new(RetryCoordinator::for_all_job_types(
            store,
            configured_registry(),
            submitter.clone(),
        ));
        queue.enqueue(Job::new(JobType::QuotationSave, json!({ "n": 1 })));

        let monitor = ConnectivityMonitor::default();
        let worker = SyncWorker::new(coordinator, monitor.subscribe());
        let mut events = worker.subscribe();
        let handle = worker.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.set_offline();
        assert_eq!(next_pass(&mut events).await.0, SyncTrigger::Startup);

        // Still offline after the pass: no extra pass until the network is back.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());

        submitter.fail.lock().unwrap().clear();
        monitor.set_online();
        let (trigger, reports) = next_pass(&mut events).await;
        assert_eq!(trigger, SyncTrigger::Reconnected);
        assert_eq!(reports[0].delivered, 1);

        handle.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn shutdown_works_after_monitor_is_dropped() {
        let coordinator = Arc::new(RetryCoordinator::for_all_job_types(
            InMemoryStore::arc(),
            configured_registry(),
            Arc::new(ScriptedSubmitter::default()),
        ));
        let monitor = ConnectivityMonitor::default();
        let worker = SyncWorker::new(coordinator, monitor.subscribe());
        let mut events = worker.subscribe();
        let handle = worker.start();

        next_pass(&mut events).await;
        drop(monitor);
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown_and_join())
            .await
            .unwrap();
    }
}
