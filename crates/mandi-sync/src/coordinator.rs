//! # Sync Coordinator
//!
//! Runs sync cycles: one at a time, only when online, with a bounded number
//! of scheduled retries.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         One Sync Cycle                                  │
//! │                                                                         │
//! │  trigger(t), attempt = 0                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  guard taken? ──yes──► AlreadyRunning    (a Retry re-arms itself)      │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  external trigger? ──► abort any pending retry                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  online? ──no──► Offline                  (no retry scheduled)         │
//! │       │ yes                                                             │
//! │       ▼                                                                 │
//! │  get_unsynced() ──empty──► NothingToSync                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  upload(batch) ──ok──► mark_synced(ids) ──► Synced { count }           │
//! │       │ failed                                                          │
//! │       ▼                                                                 │
//! │  attempt < max_retries?                                                │
//! │       ├── yes ──► spawn retry(attempt + 1) after delay                 │
//! │       │           Failed { retry_scheduled: true }                     │
//! │       └── no  ──► Failed { retry_scheduled: false }, idle until the    │
//! │                   next external trigger                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage errors are returned as `Err(SyncError::Database(..))`; transport
//! failures only ever show up as `Failed`.
//!
//! The coordinator also implements [`PostCommitHook`], so
//! [`SyncCoordinator::submit`] pushes a new record right after it is stored
//! when nothing else is syncing and the device is online. The hook holds the
//! same guard as a cycle and marks the record synced before releasing it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use mandi_core::PriceRecord;
use mandi_db::{DbResult, PostCommitHook, PriceRecordRepository};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::PriceUploader;
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkMonitor;

/// Upper bound on any single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(3600);

// =============================================================================
// Triggers & Outcomes
// =============================================================================

/// What started a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Network went from offline to online.
    NetworkAvailable,
    /// App came back to the foreground.
    Foreground,
    /// Periodic timer while in the foreground.
    Periodic,
    /// User asked for a sync.
    Manual,
    /// Shortly after launch.
    Startup,
    /// Scheduled after a failed push.
    Retry,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another cycle holds the guard; nothing was done.
    AlreadyRunning,
    /// Device offline; nothing was done and no retry was scheduled.
    Offline,
    /// No unsynced records.
    NothingToSync,
    /// The whole batch was accepted and marked synced.
    Synced { count: usize },
    /// The push failed.
    Failed { retry_scheduled: bool },
}

impl SyncOutcome {
    /// True when every record is known to be uploaded.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::NothingToSync | SyncOutcome::Synced { .. })
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// How many times and how far apart failed pushes are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first failure. Total attempts = 1 + max_retries.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor between retries. 1.0 keeps the delay fixed.
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            initial_delay: settings.retry_delay(),
            multiplier: settings.retry_multiplier,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: self.multiplier,
            max_interval: MAX_RETRY_DELAY,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut delay = self.initial_delay;
        for _ in 0..attempt.max(1) {
            delay = backoff.next_backoff().unwrap_or(MAX_RETRY_DELAY);
        }
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_settings(&SyncSettings::default())
    }
}

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot for status queries and UI events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    /// A cycle currently holds the guard.
    pub in_progress: bool,

    /// Trigger of the last finished cycle.
    pub last_trigger: Option<SyncTrigger>,

    /// Outcome of the last finished cycle.
    pub last_outcome: Option<SyncOutcome>,

    /// When a cycle last ended with everything uploaded.
    pub last_success_at: Option<DateTime<Utc>>,

    /// Last failure, cleared by the next success.
    pub last_error: Option<String>,

    /// Unsynced records after the last cycle.
    pub pending_count: i64,
}

/// Receives a status snapshot after every finished cycle.
pub trait SyncEventEmitter: Send + Sync {
    fn emit_status(&self, status: &SyncStatus);
}

/// No-op event emitter for headless use and tests.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
}

// =============================================================================
// Guard
// =============================================================================

/// Holds the "cycle in progress" flag; releases it on drop.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// The pending retry, tagged so a superseded task can tell it lost its slot.
#[derive(Default)]
struct RetrySlot {
    next_generation: u64,
    pending: Option<(u64, JoinHandle<()>)>,
}

struct Inner {
    records: PriceRecordRepository,
    uploader: Arc<dyn PriceUploader>,
    network: NetworkMonitor,
    policy: RetryPolicy,
    in_progress: AtomicBool,
    shut_down: AtomicBool,
    retry: Mutex<RetrySlot>,
    status: RwLock<SyncStatus>,
    emitter: Arc<dyn SyncEventEmitter>,
}

/// Decides when and what to push. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    pub fn new(
        records: PriceRecordRepository,
        uploader: Arc<dyn PriceUploader>,
        network: NetworkMonitor,
        policy: RetryPolicy,
    ) -> Self {
        Self::with_emitter(records, uploader, network, policy, Arc::new(NoOpEmitter))
    }

    pub fn with_emitter(
        records: PriceRecordRepository,
        uploader: Arc<dyn PriceUploader>,
        network: NetworkMonitor,
        policy: RetryPolicy,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        SyncCoordinator {
            inner: Arc::new(Inner {
                records,
                uploader,
                network,
                policy,
                in_progress: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                retry: Mutex::new(RetrySlot::default()),
                status: RwLock::new(SyncStatus::default()),
                emitter,
            }),
        }
    }

    /// Runs a cycle for an external trigger.
    ///
    /// The cycle starts at attempt 0 and replaces any scheduled retry. A
    /// trigger that gets `AlreadyRunning` leaves the retry alone.
    pub async fn trigger(&self, trigger: SyncTrigger) -> SyncResult<SyncOutcome> {
        self.run_cycle(trigger, 0).await
    }

    /// Stores a record, then pushes it right away if possible.
    pub async fn submit(
        &self,
        crop_name: &str,
        district_name: &str,
        selling_price: f64,
    ) -> DbResult<PriceRecord> {
        self.inner
            .records
            .insert_with_hook(crop_name, district_name, selling_price, self)
            .await
    }

    /// Cancels the pending retry and refuses further cycles.
    pub fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            info!("Sync coordinator shutting down");
        }
        self.cancel_pending_retry();
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.status.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    pub fn has_pending_retry(&self) -> bool {
        self.lock_retry().pending.is_some()
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    pub fn records(&self) -> &PriceRecordRepository {
        &self.inner.records
    }

    // =========================================================================
    // Cycle
    // =========================================================================

    // Boxed: scheduled retries spawn tasks that call back into this method.
    fn run_cycle(
        &self,
        trigger: SyncTrigger,
        attempt: u32,
    ) -> BoxFuture<'_, SyncResult<SyncOutcome>> {
        Box::pin(async move {
            if self.inner.shut_down.load(Ordering::SeqCst) {
                return Err(SyncError::ShuttingDown);
            }

            let Some(guard) = CycleGuard::try_acquire(&self.inner.in_progress) else {
                debug!(?trigger, "Sync already in progress");
                if trigger == SyncTrigger::Retry {
                    self.rearm_retry(attempt);
                }
                return Ok(SyncOutcome::AlreadyRunning);
            };

            if trigger != SyncTrigger::Retry {
                self.cancel_pending_retry();
            }

            self.inner.status.write().await.in_progress = true;
            debug!(?trigger, attempt, "Sync cycle started");

            let result = self.cycle(attempt).await;
            self.record(trigger, &result).await;
            drop(guard);

            match &result {
                Ok(outcome) => info!(?trigger, attempt, ?outcome, "Sync cycle finished"),
                Err(e) => error!(?trigger, attempt, error = %e, "Sync cycle failed"),
            }
            result
        })
    }

    async fn cycle(&self, attempt: u32) -> SyncResult<SyncOutcome> {
        if !self.inner.network.is_online() {
            debug!("Offline, skipping sync");
            return Ok(SyncOutcome::Offline);
        }

        let records = self.inner.records.get_unsynced().await?;
        if records.is_empty() {
            return Ok(SyncOutcome::NothingToSync);
        }

        if self.inner.uploader.upload(&records).await {
            let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
            self.inner.records.mark_synced(&ids).await?;
            return Ok(SyncOutcome::Synced {
                count: records.len(),
            });
        }

        if attempt < self.inner.policy.max_retries && self.schedule_retry(attempt + 1) {
            Ok(SyncOutcome::Failed {
                retry_scheduled: true,
            })
        } else {
            warn!(
                attempts = attempt + 1,
                pending = records.len(),
                "Push failed, waiting for the next trigger"
            );
            Ok(SyncOutcome::Failed {
                retry_scheduled: false,
            })
        }
    }

    /// Updates the shared status and notifies the emitter.
    async fn record(&self, trigger: SyncTrigger, result: &SyncResult<SyncOutcome>) {
        let pending = match self.inner.records.count_unsynced().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Could not count pending records");
                None
            }
        };

        let snapshot = {
            let mut status = self.inner.status.write().await;
            status.in_progress = false;
            status.last_trigger = Some(trigger);

            match result {
                Ok(outcome) => {
                    if outcome.is_success() {
                        status.last_success_at = Some(Utc::now());
                        status.last_error = None;
                    } else if matches!(outcome, SyncOutcome::Failed { .. }) {
                        status.last_error = Some("Remote endpoint did not accept the batch".into());
                    }
                    status.last_outcome = Some(outcome.clone());
                }
                Err(e) => status.last_error = Some(e.to_string()),
            }

            if let Some(count) = pending {
                status.pending_count = count;
            }
            status.clone()
        };

        self.inner.emitter.emit_status(&snapshot);
    }

    // =========================================================================
    // Retry Slot
    // =========================================================================

    fn lock_retry(&self) -> std::sync::MutexGuard<'_, RetrySlot> {
        self.inner
            .retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the retry task, replacing any pending one. Returns false after
    /// shutdown.
    fn schedule_retry(&self, attempt: u32) -> bool {
        self.arm_retry(attempt, true)
    }

    /// Puts a retry that found the guard taken back in the slot, unless a
    /// newer retry got there first.
    fn rearm_retry(&self, attempt: u32) {
        if self.arm_retry(attempt, false) {
            debug!(attempt, "Retry re-armed");
        }
    }

    fn arm_retry(&self, attempt: u32, replace: bool) -> bool {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return false;
        }

        let delay = self.inner.policy.delay_for(attempt);
        let mut slot = self.lock_retry();
        if !replace && slot.pending.is_some() {
            return false;
        }
        let generation = slot.next_generation;
        slot.next_generation += 1;

        let coordinator = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !coordinator.claim_retry(generation) {
                return;
            }
            if let Err(e) = coordinator.run_cycle(SyncTrigger::Retry, attempt).await {
                error!(attempt, error = %e, "Scheduled retry failed");
            }
        });

        if let Some((_, stale)) = slot.pending.replace((generation, handle)) {
            stale.abort();
        }

        info!(attempt, delay_ms = delay.as_millis() as u64, "Retry scheduled");
        true
    }

    /// Removes the retry with this generation from the slot, if still there.
    fn claim_retry(&self, generation: u64) -> bool {
        let mut slot = self.lock_retry();
        if matches!(slot.pending, Some((current, _)) if current == generation) {
            slot.pending = None;
            true
        } else {
            false
        }
    }

    fn cancel_pending_retry(&self) {
        if let Some((_, handle)) = self.lock_retry().pending.take() {
            handle.abort();
            debug!("Pending retry cancelled");
        }
    }
}

// =============================================================================
// Opportunistic Sync
// =============================================================================

impl PostCommitHook for SyncCoordinator {
    fn on_committed<'a>(&'a self, record: &'a PriceRecord) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if self.inner.shut_down.load(Ordering::SeqCst) {
                return false;
            }

            let Some(_guard) = CycleGuard::try_acquire(&self.inner.in_progress) else {
                debug!(id = record.id, "Sync in progress, leaving record for the next cycle");
                return false;
            };

            if !self.inner.network.is_online() {
                debug!(id = record.id, "Offline, record stays pending");
                return false;
            }

            if !self
                .inner
                .uploader
                .upload(std::slice::from_ref(record))
                .await
            {
                return false;
            }

            // Still under the guard, so no cycle can pick the record up again
            match self.inner.records.mark_synced(&[record.id]).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(id = record.id, error = %e, "Pushed record could not be marked synced");
                    false
                }
            }
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
