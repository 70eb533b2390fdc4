//! Status registry
//!
//! Every worker owns exactly one [`WorkerStatus`] entry and is its only
//! writer; the overseer owns the [`OverseerStatus`]. Readers (the status
//! screen, the end-of-run summary) only ever see immutable snapshots.
//!
//! ```text
//!  worker 0 ──writes──▶ WorkerStatus[0] ─┐
//!  worker 1 ──writes──▶ WorkerStatus[1] ─┤
//!  ...                                   ├──snapshot()──▶ StatusSnapshot
//!  overseer ──writes──▶ OverseerStatus  ─┘
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle phase of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Staggering,
    WaitingForWork,
    LoggingIn,
    Scanning,
    Retrying,
    Cooldown,
    Restarting,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerPhase::Staggering => "staggering",
            WorkerPhase::WaitingForWork => "waiting",
            WorkerPhase::LoggingIn => "login",
            WorkerPhase::Scanning => "scanning",
            WorkerPhase::Retrying => "retrying",
            WorkerPhase::Cooldown => "cooldown",
            WorkerPhase::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

/// Live status of one worker
#[derive(Debug)]
pub struct WorkerStatus {
    id: usize,
    username: String,
    track_skipped: bool,

    /// Jobs scanned with at least one result
    success: AtomicU64,

    /// Failed fetch attempts
    fail: AtomicU64,

    /// Jobs scanned with no results
    no_items: AtomicU64,

    /// Stale spawn jobs dropped without scanning
    skipped: AtomicU64,

    state: Mutex<(WorkerPhase, String)>,
}

impl WorkerStatus {
    pub fn new(id: usize, username: impl Into<String>, track_skipped: bool) -> Self {
        Self {
            id,
            username: username.into(),
            track_skipped,
            success: AtomicU64::new(0),
            fail: AtomicU64::new(0),
            no_items: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            state: Mutex::new((WorkerPhase::Staggering, String::new())),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fail(&self) {
        self.fail.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_items(&self) {
        self.no_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Update phase and message together
    pub fn set(&self, phase: WorkerPhase, message: impl Into<String>) {
        *self.state.lock() = (phase, message.into());
    }

    pub fn phase(&self) -> WorkerPhase {
        self.state.lock().0
    }

    pub fn message(&self) -> String {
        self.state.lock().1.clone()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let (phase, message) = self.state.lock().clone();
        WorkerSnapshot {
            id: self.id,
            username: self.username.clone(),
            phase,
            message,
            success: self.success.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
            no_items: self.no_items.load(Ordering::Relaxed),
            skipped: self
                .track_skipped
                .then(|| self.skipped.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of a worker's status
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub id: usize,
    pub username: String,
    pub phase: WorkerPhase,
    pub message: String,
    pub success: u64,
    pub fail: u64,
    pub no_items: u64,

    /// Only present in spawn-scan mode
    pub skipped: Option<u64>,
}

/// Status line of the overseer
#[derive(Debug)]
pub struct OverseerStatus {
    method: &'static str,
    message: Mutex<String>,
}

impl OverseerStatus {
    pub fn new(method: &'static str) -> Self {
        Self {
            method,
            message: Mutex::new(String::new()),
        }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn set_message(&self, message: impl Into<String>) {
        *self.message.lock() = message.into();
    }

    pub fn message(&self) -> String {
        self.message.lock().clone()
    }
}

/// All status entries of one run
#[derive(Debug)]
pub struct StatusRegistry {
    overseer: OverseerStatus,
    workers: Vec<Arc<WorkerStatus>>,
}

impl StatusRegistry {
    /// Create one worker entry per username
    pub fn new<I, S>(method: &'static str, usernames: I, track_skipped: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let workers = usernames
            .into_iter()
            .enumerate()
            .map(|(id, name)| Arc::new(WorkerStatus::new(id, name, track_skipped)))
            .collect();

        Self {
            overseer: OverseerStatus::new(method),
            workers,
        }
    }

    pub fn overseer(&self) -> &OverseerStatus {
        &self.overseer
    }

    /// Handle to a worker's entry, for the worker that owns it
    pub fn worker(&self, id: usize) -> Option<Arc<WorkerStatus>> {
        self.workers.get(id).cloned()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            method: self.overseer.method,
            message: self.overseer.message(),
            workers: self.workers.iter().map(|w| w.snapshot()).collect(),
        }
    }
}

/// Immutable copy of the whole registry
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub method: &'static str,
    pub message: String,
    pub workers: Vec<WorkerSnapshot>,
}

impl StatusSnapshot {
    pub fn total_success(&self) -> u64 {
        self.workers.iter().map(|w| w.success).sum()
    }

    pub fn total_fail(&self) -> u64 {
        self.workers.iter().map(|w| w.fail).sum()
    }

    pub fn total_no_items(&self) -> u64 {
        self.workers.iter().map(|w| w.no_items).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.workers.iter().filter_map(|w| w.skipped).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_status_counters() {
        let status = WorkerStatus::new(3, "ash", true);
        status.record_success();
        status.record_success();
        status.record_fail();
        status.record_no_items();
        status.record_skipped();
        status.set(WorkerPhase::Scanning, "step 4");

        let snap = status.snapshot();
        assert_eq!(snap.id, 3);
        assert_eq!(snap.success, 2);
        assert_eq!(snap.fail, 1);
        assert_eq!(snap.no_items, 1);
        assert_eq!(snap.skipped, Some(1));
        assert_eq!(snap.phase, WorkerPhase::Scanning);
        assert_eq!(snap.message, "step 4");
    }

    #[test]
    fn test_skipped_hidden_in_grid_mode() {
        let status = WorkerStatus::new(0, "misty", false);
        status.record_skipped();
        assert_eq!(status.snapshot().skipped, None);
    }

    #[test]
    fn test_registry_snapshot_is_a_copy() {
        let registry = StatusRegistry::new("Hex Grid", ["a", "b"], false);
        let worker = registry.worker(1).unwrap();
        worker.record_success();

        let before = registry.snapshot();
        worker.record_success();
        registry.overseer().set_message("Queuing 7 steps");

        assert_eq!(before.total_success(), 1);
        assert_eq!(before.message, "");

        let after = registry.snapshot();
        assert_eq!(after.total_success(), 2);
        assert_eq!(after.method, "Hex Grid");
        assert_eq!(after.message, "Queuing 7 steps");
        assert!(registry.worker(2).is_none());
    }
}
