//! The report queue state machine.
//!
//! All state lives behind one `tokio::sync::Mutex`. A mutation and its
//! persistence happen under the same lock acquisition, so no reader ever
//! sees a report in both collections or in neither. Network calls are made
//! without the lock held.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use clean592_report_models::{
    Report, ReportDraft, ReportFilter, ReportStatus, ScoringPolicy, UserProfile,
};
use clean592_storage::{HISTORY_REPORTS, PENDING_REPORTS, ReportStore, load_reports, save_reports};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::{SubmissionAck, SubmissionClient, SubmissionError};
use crate::config::EngineConfig;
use crate::progress::{SyncProgress, UploadResult, null_progress};
use crate::retry::submit_with_retry;
use crate::{QueueError, SyncError};

/// An immutable view of the queue at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    /// Reports waiting for upload, in submission order.
    pub pending: Vec<Report>,
    /// Acknowledged reports, most recent first.
    pub history: Vec<Report>,
    /// Connectivity flag.
    pub online: bool,
    /// Whether a sync is in flight.
    pub syncing: bool,
    /// Points and rank over the history.
    pub profile: UserProfile,
    /// Set when the last persist failed; in-memory state is still
    /// authoritative.
    pub storage_warning: Option<String>,
}

impl QueueSnapshot {
    /// Pending reports followed by the history.
    pub fn reports(&self) -> impl Iterator<Item = &Report> {
        self.pending.iter().chain(&self.history)
    }

    /// Reports matching `filter`, pending first.
    #[must_use]
    pub fn filtered(&self, filter: &ReportFilter) -> Vec<&Report> {
        filter.apply(self.reports())
    }

    /// Looks up a report by id in either collection.
    #[must_use]
    pub fn find(&self, id: i64) -> Option<&Report> {
        self.reports().find(|r| r.id == id)
    }
}

/// What happened during one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Ids moved into the history, in submission order.
    pub synced: Vec<i64>,
    /// Reports that stayed pending because their upload failed.
    pub failed: Vec<SyncError>,
    /// Pending reports skipped because they used up their retries.
    pub parked: usize,
    /// Connectivity dropped before every report was attempted.
    pub interrupted: bool,
}

/// Result of [`ReportQueue::on_connectivity_restored`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No eligible pending reports.
    NothingToSync,
    /// Another sync was already in flight; nothing was done.
    AlreadySyncing,
    /// A sync ran to completion (possibly with per-report failures).
    Completed(SyncSummary),
}

struct QueueState {
    pending: Vec<Report>,
    history: Vec<Report>,
    profile: UserProfile,
    last_id: i64,
    dirty: BTreeSet<&'static str>,
    storage_warning: Option<String>,
}

impl QueueState {
    /// Time-based id, bumped past the last one handed out.
    fn next_id(&mut self, now: DateTime<Utc>) -> i64 {
        let id = now.timestamp_millis().max(self.last_id.saturating_add(1));
        self.last_id = id;
        id
    }

    fn recompute(&mut self, policy: &ScoringPolicy) -> UserProfile {
        self.profile = policy.profile_for(&self.history);
        self.profile
    }
}

/// Clears the syncing flag when dropped.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Holds the pending queue and history and moves reports between them.
pub struct ReportQueue {
    store: Arc<dyn ReportStore>,
    client: Arc<dyn SubmissionClient>,
    config: EngineConfig,
    progress: Arc<dyn SyncProgress>,
    state: Mutex<QueueState>,
    online: AtomicBool,
    syncing: AtomicBool,
    updates: watch::Sender<QueueSnapshot>,
}

impl ReportQueue {
    /// Loads both collections from `store` and builds the queue.
    ///
    /// A report found in both collections (left behind by a crash between
    /// the two writes of a sync) is kept in the history only.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if either collection cannot be read
    /// after one retry or is not valid report JSON.
    pub async fn open(
        store: Arc<dyn ReportStore>,
        client: Arc<dyn SubmissionClient>,
        config: EngineConfig,
        online: bool,
    ) -> Result<Self, QueueError> {
        let mut pending = load_reports(store.as_ref(), PENDING_REPORTS).await?;
        let history = load_reports(store.as_ref(), HISTORY_REPORTS).await?;

        let committed: BTreeSet<i64> = history.iter().map(|r| r.id).collect();
        let before = pending.len();
        pending.retain(|r| !committed.contains(&r.id));

        let mut dirty = BTreeSet::new();
        if pending.len() != before {
            log::warn!(
                "Dropped {} pending report(s) already present in history",
                before - pending.len()
            );
            dirty.insert(PENDING_REPORTS);
        }

        let last_id = pending
            .iter()
            .chain(&history)
            .map(|r| r.id)
            .max()
            .unwrap_or(0);
        let profile = config.scoring.profile_for(&history);

        log::info!(
            "Opened report queue: {} pending, {} in history",
            pending.len(),
            history.len()
        );

        let state = QueueState {
            pending,
            history,
            profile,
            last_id,
            dirty,
            storage_warning: None,
        };
        let initial = snapshot_of(&state, online, false);
        let (updates, _) = watch::channel(initial);

        let queue = Self {
            store,
            client,
            config,
            progress: null_progress(),
            state: Mutex::new(state),
            online: AtomicBool::new(online),
            syncing: AtomicBool::new(false),
            updates,
        };

        {
            let mut state = queue.state.lock().await;
            if !state.dirty.is_empty() {
                queue.persist(&mut state, &[]).await;
            }
        }

        Ok(queue)
    }

    /// Replaces the progress sink used during sync.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn SyncProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Connectivity flag.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether a sync is in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Current state of both collections.
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        self.snapshot_locked(&state)
    }

    /// Receives a new snapshot after every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.updates.subscribe()
    }

    /// Creates a report from `draft`.
    ///
    /// Online, the report is uploaded right away and lands in the history
    /// as [`ReportStatus::Received`]. If that upload fails, or the device is
    /// offline, the report is appended to the pending queue as
    /// [`ReportStatus::PendingUpload`] with no points.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Validation`] if the draft is incomplete; the
    /// queue is left untouched.
    pub async fn submit(&self, draft: ReportDraft) -> Result<Report, QueueError> {
        draft.validate()?;

        let now = Utc::now();
        let id = self.state.lock().await.next_id(now);
        let mut report = Report::from_draft(draft, id, Uuid::new_v4(), now)?;

        let upload = if self.is_online() {
            Some(self.client.submit(&report).await)
        } else {
            None
        };

        let mut state = self.state.lock().await;
        match upload {
            Some(Ok(ack)) => {
                self.acknowledge(&mut report, ack, None);
                state.history.insert(0, report.clone());
                self.persist(&mut state, &[HISTORY_REPORTS]).await;
                log::info!("Report {} received as {:?}", report.id, report.server_id);
            }
            Some(Err(e)) if e != SubmissionError::Offline => {
                log::warn!("Report {} upload failed, queued for sync: {e}", report.id);
                report.record_failure(e.to_string());
                state.pending.push(report.clone());
                self.persist(&mut state, &[PENDING_REPORTS]).await;
            }
            Some(Err(_)) | None => {
                log::info!("Report {} queued while offline", report.id);
                state.pending.push(report.clone());
                self.persist(&mut state, &[PENDING_REPORTS]).await;
            }
        }
        state.recompute(&self.config.scoring);
        self.publish(&state);

        Ok(report)
    }

    /// Marks the device online and uploads the pending queue.
    ///
    /// Only one sync runs at a time; a call made while another sync is in
    /// flight returns [`SyncOutcome::AlreadySyncing`] without touching
    /// state. Reports are uploaded in submission order. Acknowledged ones
    /// move to the front of the history as one block, in submission order;
    /// failed ones stay pending with their retry count incremented. If
    /// connectivity drops mid-sync, reports not yet attempted stay pending
    /// unchanged.
    pub async fn on_connectivity_restored(&self) -> SyncOutcome {
        if !self.online.swap(true, Ordering::SeqCst) {
            log::info!("Connectivity restored");
        }

        let Some(guard) = SyncGuard::acquire(&self.syncing) else {
            log::debug!("Sync already in flight, ignoring connectivity event");
            return SyncOutcome::AlreadySyncing;
        };

        let (batch, parked) = {
            let state = self.state.lock().await;
            let (parked, batch): (Vec<&Report>, Vec<&Report>) = state
                .pending
                .iter()
                .partition(|r| self.config.retry.is_parked(r));
            let batch: Vec<Report> = batch.into_iter().cloned().collect();
            if !batch.is_empty() {
                self.publish(&state);
            }
            (batch, parked.len())
        };

        if batch.is_empty() {
            drop(guard);
            if parked > 0 {
                log::warn!("{parked} parked report(s) skipped; reset their retries to sync");
            }
            let state = self.state.lock().await;
            self.publish(&state);
            return SyncOutcome::NothingToSync;
        }

        log::info!("Syncing {} pending report(s)", batch.len());
        self.progress.started(u64::try_from(batch.len()).unwrap_or(u64::MAX));

        let mut summary = SyncSummary {
            parked,
            ..SyncSummary::default()
        };
        let mut acked = Vec::with_capacity(batch.len());

        for report in &batch {
            if !self.is_online() {
                summary.interrupted = true;
                break;
            }
            self.progress.uploading(report);
            let result = match submit_with_retry(
                self.client.as_ref(),
                report,
                &self.config.retry,
                &self.online,
            )
            .await
            {
                Ok(ack) => {
                    acked.push((report.id, ack));
                    UploadResult::Acknowledged
                }
                Err(SubmissionError::Offline) => {
                    summary.interrupted = true;
                    break;
                }
                Err(source) => {
                    summary.failed.push(SyncError::Submission {
                        report_id: report.id,
                        source,
                    });
                    UploadResult::Failed
                }
            };
            self.progress.uploaded(report, result);
        }

        self.commit(acked, &mut summary).await;
        drop(guard);

        {
            let state = self.state.lock().await;
            self.publish(&state);
        }

        self.progress.finished(&summary);

        SyncOutcome::Completed(summary)
    }

    /// Marks the device offline. An in-flight sync stops before its next
    /// upload.
    pub async fn on_connectivity_lost(&self) {
        if self.online.swap(false, Ordering::SeqCst) {
            log::info!("Connectivity lost");
        }
        let state = self.state.lock().await;
        self.publish(&state);
    }

    /// Updates the connectivity flag, running a sync when the device comes
    /// back online. Returns the sync outcome if one was attempted.
    pub async fn set_online(&self, online: bool) -> Option<SyncOutcome> {
        match (self.is_online(), online) {
            (false, true) => Some(self.on_connectivity_restored().await),
            (true, false) => {
                self.on_connectivity_lost().await;
                None
            }
            _ => None,
        }
    }

    /// Runs [`Self::on_connectivity_restored`] on a background task.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<SyncOutcome> {
        let queue = Arc::clone(self);
        tokio::spawn(async move { queue.on_connectivity_restored().await })
    }

    /// Recomputes points and rank from the history.
    pub async fn recompute_profile(&self) -> UserProfile {
        self.state.lock().await.recompute(&self.config.scoring)
    }

    /// Applies a moderation status update to a synced report.
    ///
    /// # Errors
    ///
    /// * [`QueueError::NotInHistory`] if the report is still pending
    /// * [`QueueError::ReportNotFound`] if no report has this id
    /// * [`QueueError::InvalidTransition`] if the status would not move
    ///   forward
    pub async fn update_status(&self, id: i64, status: ReportStatus) -> Result<Report, QueueError> {
        let mut state = self.state.lock().await;

        if state.pending.iter().any(|r| r.id == id) {
            return Err(QueueError::NotInHistory { id });
        }

        let report = state
            .history
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(QueueError::ReportNotFound { id })?;

        let from = report.status;
        if !report.advance_status(status, &self.config.scoring) {
            return Err(QueueError::InvalidTransition {
                id,
                from,
                to: status,
            });
        }
        let updated = report.clone();

        log::info!("Report {id} moved from {from} to {status}");
        self.persist(&mut state, &[HISTORY_REPORTS]).await;
        state.recompute(&self.config.scoring);
        self.publish(&state);

        Ok(updated)
    }

    /// Makes a parked pending report eligible for automatic sync again.
    ///
    /// # Errors
    ///
    /// * [`QueueError::NotPending`] if the report has already been synced
    /// * [`QueueError::ReportNotFound`] if no report has this id
    pub async fn reset_retries(&self, id: i64) -> Result<Report, QueueError> {
        let mut state = self.state.lock().await;

        if state.history.iter().any(|r| r.id == id) {
            return Err(QueueError::NotPending { id });
        }

        let report = state
            .pending
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(QueueError::ReportNotFound { id })?;
        report.retry_count = 0;
        report.last_error = None;
        let updated = report.clone();

        self.persist(&mut state, &[PENDING_REPORTS]).await;
        self.publish(&state);

        Ok(updated)
    }

    fn acknowledge(
        &self,
        report: &mut Report,
        ack: SubmissionAck,
        sync_time: Option<DateTime<Utc>>,
    ) {
        report.mark_received(&self.config.scoring, ack.server_id);
        if ack.status > ReportStatus::Received {
            report.advance_status(ack.status, &self.config.scoring);
        }
        report.sync_time = sync_time;
    }

    /// Applies the results of a sync run as one state transition.
    async fn commit(&self, acked: Vec<(i64, SubmissionAck)>, summary: &mut SyncSummary) {
        let mut state = self.state.lock().await;
        let sync_time = Utc::now();

        let mut moved = Vec::with_capacity(acked.len());
        for (id, ack) in acked {
            let Some(pos) = state.pending.iter().position(|r| r.id == id) else {
                continue;
            };
            let mut report = state.pending.remove(pos);
            self.acknowledge(&mut report, ack, Some(sync_time));
            summary.synced.push(id);
            moved.push(report);
        }

        for failure in &summary.failed {
            let SyncError::Submission { report_id, source } = failure;
            if let Some(report) = state.pending.iter_mut().find(|r| r.id == *report_id) {
                report.record_failure(source.to_string());
            }
        }

        let mut keys = Vec::with_capacity(2);
        if !moved.is_empty() {
            moved.append(&mut state.history);
            state.history = moved;
            keys.push(HISTORY_REPORTS);
        }
        if !summary.synced.is_empty() || !summary.failed.is_empty() {
            keys.push(PENDING_REPORTS);
        }

        self.persist(&mut state, &keys).await;
        let profile = state.recompute(&self.config.scoring);

        log::info!(
            "Sync committed: {} synced, {} failed, {} still pending (points={}, rank={})",
            summary.synced.len(),
            summary.failed.len(),
            state.pending.len(),
            profile.points,
            profile.rank
        );
    }

    /// Writes `keys` plus any key whose last write failed.
    ///
    /// History is always written before the pending queue, so a crash in
    /// between leaves a duplicate that [`Self::open`] repairs rather than a
    /// lost report. While history is unsaved the pending queue is not
    /// written either, so no report leaves the stored pending queue before
    /// it is in the stored history. Failures are logged and kept as a
    /// warning; the key stays dirty for the next persist.
    async fn persist(&self, state: &mut QueueState, keys: &[&'static str]) {
        state.dirty.extend(keys.iter().copied());

        let mut failures = Vec::new();
        for key in [HISTORY_REPORTS, PENDING_REPORTS] {
            if !state.dirty.contains(key) {
                continue;
            }
            if key == PENDING_REPORTS && state.dirty.contains(HISTORY_REPORTS) {
                log::warn!("Deferring '{key}' until '{HISTORY_REPORTS}' is saved");
                failures.push(format!("{key}: deferred until {HISTORY_REPORTS} is saved"));
                continue;
            }
            let reports = if key == HISTORY_REPORTS {
                &state.history
            } else {
                &state.pending
            };
            match save_reports(self.store.as_ref(), key, reports).await {
                Ok(()) => {
                    state.dirty.remove(key);
                }
                Err(e) => {
                    log::warn!("Failed to persist '{key}', keeping in-memory state: {e}");
                    failures.push(format!("{key}: {e}"));
                }
            }
        }

        state.storage_warning = if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        };
    }

    fn snapshot_locked(&self, state: &QueueState) -> QueueSnapshot {
        snapshot_of(state, self.is_online(), self.is_syncing())
    }

    fn publish(&self, state: &QueueState) {
        self.updates.send_replace(self.snapshot_locked(state));
    }
}

fn snapshot_of(state: &QueueState, online: bool, syncing: bool) -> QueueSnapshot {
    QueueSnapshot {
        pending: state.pending.clone(),
        history: state.history.clone(),
        online,
        syncing,
        profile: state.profile,
        storage_warning: state.storage_warning.clone(),
    }
}
