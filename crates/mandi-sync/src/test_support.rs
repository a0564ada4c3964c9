//! Fakes shared by the coordinator and agent tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;
use mandi_core::PriceRecord;
use tokio::sync::Notify;

use crate::client::PriceUploader;
use crate::coordinator::{SyncEventEmitter, SyncStatus};

/// Which uploads wait for [`FakeUploader::release`].
#[derive(Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    Every,
    SingleRecord,
}

/// Uploader that counts calls and answers with a switchable result.
pub struct FakeUploader {
    calls: AtomicUsize,
    succeed: AtomicBool,
    gate: Gate,
    released: Notify,
    batches: Mutex<Vec<usize>>,
}

impl FakeUploader {
    fn build(succeed: bool, gate: Gate) -> Self {
        FakeUploader {
            calls: AtomicUsize::new(0),
            succeed: AtomicBool::new(succeed),
            gate,
            released: Notify::new(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::build(true, Gate::Open)
    }

    pub fn failing() -> Self {
        Self::build(false, Gate::Open)
    }

    /// Succeeds, but each upload blocks until [`FakeUploader::release`].
    pub fn gated() -> Self {
        Self::build(true, Gate::Every)
    }

    /// Blocks single-record pushes (the post-commit hook) until released;
    /// larger batches answer at once.
    pub fn gated_single_pushes(succeed: bool) -> Self {
        Self::build(succeed, Gate::SingleRecord)
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn set_succeed(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    /// Pushes of more than one record, i.e. those made by sync cycles.
    pub fn batch_pushes(&self) -> usize {
        self.batches().iter().filter(|&&len| len > 1).count()
    }
}

impl PriceUploader for FakeUploader {
    fn upload<'a>(&'a self, records: &'a [PriceRecord]) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.batches.lock().unwrap().push(records.len());
            self.calls.fetch_add(1, Ordering::SeqCst);
            let blocked = match self.gate {
                Gate::Open => false,
                Gate::Every => true,
                Gate::SingleRecord => records.len() == 1,
            };
            if blocked {
                self.released.notified().await;
            }
            self.succeed.load(Ordering::SeqCst)
        })
    }
}

/// Keeps every emitted status.
#[derive(Default)]
pub struct RecordingEmitter {
    seen: Mutex<Vec<SyncStatus>>,
}

impl RecordingEmitter {
    pub fn snapshots(&self) -> Vec<SyncStatus> {
        self.seen.lock().unwrap().clone()
    }
}

impl SyncEventEmitter for RecordingEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        self.seen.lock().unwrap().push(status.clone());
    }
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}
