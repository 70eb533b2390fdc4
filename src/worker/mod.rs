//! Worker threads
//!
//! Each worker:
//! - Owns one account and one session (never shared between threads)
//! - Pulls scan jobs one at a time from its [`JobSource`]
//! - Retries, backs off and cools down on its own
//! - Reports through its own status registry entry

pub mod queue;
pub mod session;

pub use queue::{JobQueue, JobQueueReceiver, JobQueueSender, JobSource, ScanJob};
pub use session::{stagger_delay, ScanMode, WorkerContext, WorkerSession, WorkerSettings};

use crate::error::WorkerError;
use crate::session::SessionCredentials;
use crate::status::WorkerStatus;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Handle to a spawned worker thread
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker thread running a supervised [`WorkerSession`]
    pub fn spawn<S>(
        id: usize,
        credentials: SessionCredentials,
        source: S,
        status: Arc<WorkerStatus>,
        ctx: WorkerContext,
    ) -> Result<Self, WorkerError>
    where
        S: JobSource + 'static,
    {
        let prefix = match ctx.settings.mode {
            ScanMode::Grid => "search-worker",
            ScanMode::SpawnScan => "ss-worker",
        };
        let session = WorkerSession::new(id, credentials, source, status, ctx);

        let handle = thread::Builder::new()
            .name(format!("{}-{:03}", prefix, id))
            .spawn(move || session.run())
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
        })
    }

    /// Check whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the worker to finish
    ///
    /// Only returns once the job source has closed; workers blocked on an
    /// open queue are left running.
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Worker thread panicked".into(),
            }),
            None => Ok(()),
        }
    }
}
