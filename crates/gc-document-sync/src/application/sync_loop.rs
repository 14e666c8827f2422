//! # Sync Loop
//!
//! Keeps the published [`DocumentSnapshot`] consistent with the contract.
//!
//! One task owns every trigger:
//!
//! | Trigger | Effect |
//! |---------|--------|
//! | Viewer connects or changes | Subscribe to contract events, rescan |
//! | Viewer disconnects | Drop the subscription, disarm the timer, clear the snapshot |
//! | Contract event | Notice (completions once per token), rescan |
//! | Subscription lagged | Notice that updates were missed, rescan |
//! | Poll tick | Rescan; armed only while transfers or actions are pending |
//! | Refresh request | Rescan |
//! | Shutdown | Stop, releasing the subscription |
//!
//! Scans run inside the task, so they never overlap. Triggers that arrive
//! while a scan runs wait in their channels and collapse into one follow-up
//! scan.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use shared_bus::{EventFilter, InMemoryEventBus, RegistryEvent, Subscription, SubscriptionError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::gateway::InFlightActions;
use super::notifications::{notice_for_event, NotificationLedger, Notifier};
use super::session::{ActiveSession, SessionState};
use crate::algorithms::scan_documents;
use crate::config::SyncConfig;
use crate::domain::{DocumentSnapshot, DocumentView, Notice, RefreshReason, ScanView};
use crate::metrics;
use crate::ports::RegistryReader;

/// Requests rescans from the sync loop.
#[derive(Clone, Debug)]
pub struct Refresher {
    sender: mpsc::UnboundedSender<RefreshReason>,
}

impl Refresher {
    /// A refresher and the receiving end the sync loop consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RefreshReason>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Ask for a rescan. Ignored once the loop has stopped.
    pub fn request(&self, reason: RefreshReason) {
        let _ = self.sender.send(reason);
    }
}

/// Everything the sync loop reads from.
pub struct SyncInputs {
    /// Contract reads.
    pub reader: Arc<dyn RegistryReader>,
    /// Session state.
    pub session: watch::Receiver<SessionState>,
    /// Contract event bus; `None` leaves the loop on polling and refresh requests.
    pub bus: Option<Arc<InMemoryEventBus>>,
    /// Gateway in-flight markers.
    pub in_flight: InFlightActions,
    /// Where notices go.
    pub notifier: Notifier,
    /// Rescan requests.
    pub refresher: Refresher,
    /// Receiving end of `refresher`.
    pub refresh_rx: mpsc::UnboundedReceiver<RefreshReason>,
}

/// Handle to a running sync loop. Dropping it stops the loop.
pub struct SyncHandle {
    snapshot_rx: watch::Receiver<DocumentSnapshot>,
    notifier: Notifier,
    refresher: Refresher,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Document list as of the last scan.
    pub fn snapshot(&self) -> DocumentSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch snapshot updates.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<DocumentSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Receive notices.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    /// Ask for a rescan.
    pub fn refresh(&self) {
        self.refresher.request(RefreshReason::Manual);
    }

    /// A refresher for other components.
    pub fn refresher(&self) -> Refresher {
        self.refresher.clone()
    }

    /// True while the loop task is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Start the sync loop on the current runtime.
pub fn spawn_sync_loop(inputs: SyncInputs, config: SyncConfig) -> SyncHandle {
    let (snapshot_tx, snapshot_rx) = watch::channel(DocumentSnapshot::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let notifier = inputs.notifier.clone();
    let refresher = inputs.refresher.clone();

    let worker = SyncWorker {
        reader: inputs.reader,
        session_rx: inputs.session,
        bus: inputs.bus,
        in_flight_rx: inputs.in_flight.watch(),
        in_flight: inputs.in_flight,
        notifier: inputs.notifier,
        refresh_rx: inputs.refresh_rx,
        snapshot_tx,
        shutdown_rx,
        config,
        viewer: None,
        subscription: None,
        ledger: NotificationLedger::default(),
        generation: 0,
    };
    let task = tokio::spawn(worker.run());

    SyncHandle {
        snapshot_rx,
        notifier,
        refresher,
        shutdown_tx,
        task: Some(task),
    }
}

struct SyncWorker {
    reader: Arc<dyn RegistryReader>,
    session_rx: watch::Receiver<SessionState>,
    bus: Option<Arc<InMemoryEventBus>>,
    in_flight: InFlightActions,
    in_flight_rx: watch::Receiver<usize>,
    notifier: Notifier,
    refresh_rx: mpsc::UnboundedReceiver<RefreshReason>,
    snapshot_tx: watch::Sender<DocumentSnapshot>,
    shutdown_rx: watch::Receiver<bool>,
    config: SyncConfig,
    viewer: Option<ActiveSession>,
    subscription: Option<Subscription>,
    ledger: NotificationLedger,
    generation: u64,
}

impl SyncWorker {
    async fn run(mut self) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut pending = self.apply_session().then_some(RefreshReason::ViewerChanged);
        info!(poll_ms = self.config.poll_interval.as_millis() as u64, "Sync loop started");

        loop {
            if let Some(reason) = pending.take() {
                // Anything already queued is covered by this scan.
                self.drain_events();
                self.drain_refreshes();
                if !self.scan(reason).await {
                    break;
                }
                ticker.reset();
            }

            let poll_armed = self.poll_armed();
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => break,

                changed = self.session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if self.apply_session() {
                        pending = Some(RefreshReason::ViewerChanged);
                    }
                }

                Some(reason) = self.refresh_rx.recv() => {
                    debug!(?reason, "Refresh requested");
                    if self.viewer.is_some() {
                        pending = Some(reason);
                    }
                }

                event = next_event(&mut self.subscription) => match event {
                    Ok(event) => {
                        self.handle_event(&event);
                        pending = Some(RefreshReason::ContractEvent);
                    }
                    Err(SubscriptionError::Lagged(dropped)) => {
                        self.handle_lag(dropped);
                        pending = Some(RefreshReason::EventsMissed);
                    }
                    Err(SubscriptionError::Closed) => self.subscription = None,
                },

                _ = self.in_flight_rx.changed() => {}

                _ = ticker.tick(), if poll_armed => {
                    pending = Some(RefreshReason::PendingPoll);
                }
            }
        }

        self.subscription = None;
        info!("Sync loop stopped");
    }

    fn poll_armed(&self) -> bool {
        self.viewer.is_some()
            && (self.snapshot_tx.borrow().has_pending_transfers() || !self.in_flight.is_empty())
    }

    fn drain_events(&mut self) {
        while let Some(subscription) = self.subscription.as_mut() {
            match subscription.try_recv() {
                Ok(Some(event)) => self.handle_event(&event),
                Ok(None) => break,
                // A scan follows the drain either way.
                Err(SubscriptionError::Lagged(dropped)) => self.handle_lag(dropped),
                Err(SubscriptionError::Closed) => {
                    self.subscription = None;
                    break;
                }
            }
        }
    }

    fn drain_refreshes(&mut self) -> usize {
        let mut drained = 0;
        while self.refresh_rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    /// Pick up the current session state. Returns true if a rescan is due.
    fn apply_session(&mut self) -> bool {
        let next = self.session_rx.borrow_and_update().active().copied();
        if next == self.viewer {
            return false;
        }

        match next {
            None => {
                if let Some(previous) = self.viewer.take() {
                    info!(viewer = %previous.account, "Viewer disconnected, releasing listeners");
                }
                self.subscription = None;
                self.ledger.reset();
                self.generation += 1;
                self.snapshot_tx.send_replace(DocumentSnapshot {
                    generation: self.generation,
                    ..DocumentSnapshot::default()
                });
                metrics::set_documents_visible(0);
                false
            }
            Some(active) => {
                let account_changed = self.viewer.map(|v| v.account) != Some(active.account);
                if account_changed {
                    self.ledger.reset();
                }
                if self.subscription.is_none() {
                    self.subscription = self
                        .bus
                        .as_ref()
                        .map(|bus| bus.subscribe(EventFilter::all()));
                }
                info!(viewer = %active.account, roles = %active.roles, "Viewer active");
                self.viewer = Some(active);
                self.generation += 1;
                self.snapshot_tx.send_replace(DocumentSnapshot {
                    viewer: Some(active.account),
                    roles: active.roles,
                    generation: self.generation,
                    refreshing: true,
                    ..DocumentSnapshot::default()
                });
                true
            }
        }
    }

    fn handle_event(&mut self, event: &RegistryEvent) {
        metrics::record_contract_event(event.event.name());
        debug!(
            event = event.event.name(),
            token_id = event.event.token_id().0,
            block = event.meta.map(|meta| meta.block_number),
            "Contract event"
        );
        if let Some(notice) = notice_for_event(&event.event, &mut self.ledger) {
            self.notifier.notify(notice);
        }
    }

    /// Lost events may include a completion whose notice can no longer be
    /// sent. The rescan that follows still shows the outcome.
    fn handle_lag(&mut self, dropped: u64) {
        warn!(dropped, "Contract events missed, forcing a rescan");
        self.notifier.notify(Notice::info(
            None,
            format!("Missed {dropped} registry updates; refreshing the document list."),
        ));
    }

    /// Run one scan. Returns false if shutdown arrived meanwhile.
    async fn scan(&mut self, reason: RefreshReason) -> bool {
        let Some(active) = self.viewer else {
            return true;
        };
        self.snapshot_tx.send_modify(|snapshot| snapshot.refreshing = true);
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = self.shutdown_rx.changed() => return false,
            outcome = scan_documents(
                self.reader.as_ref(),
                &active.account,
                active.roles,
                &ScanView::Visible,
                &self.config.bounds,
            ) => outcome,
        };
        let elapsed = started.elapsed();

        // The viewer changed mid-scan; the session branch rescans for the new one.
        let current = self.session_rx.borrow().active().copied();
        if current != Some(active) {
            debug!(viewer = %active.account, "Discarding scan for previous viewer");
            return true;
        }

        let documents: Vec<DocumentView> = outcome
            .records
            .into_iter()
            .map(|record| DocumentView::new(record, &active.account, active.roles))
            .collect();
        metrics::record_scan(&outcome.report, elapsed.as_secs_f64());
        metrics::set_documents_visible(documents.len());
        info!(
            viewer = %active.account,
            ?reason,
            documents = documents.len(),
            probes = outcome.report.probe_count(),
            misses = outcome.report.misses,
            errors = outcome.report.errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scan complete"
        );

        self.generation += 1;
        self.snapshot_tx.send_replace(DocumentSnapshot {
            viewer: Some(active.account),
            roles: active.roles,
            documents,
            generation: self.generation,
            scanned_at: Some(Utc::now()),
            refreshing: false,
        });
        true
    }
}

async fn next_event(
    subscription: &mut Option<Subscription>,
) -> Result<RegistryEvent, SubscriptionError> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
