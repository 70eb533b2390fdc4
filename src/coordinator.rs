//! Scan coordinator - wires workers, queues and the overseer together
//!
//! The coordinator is responsible for:
//! - Creating the status registry, the parse lock and the job queue(s)
//! - Spawning one worker thread per account
//! - Building the spawn schedule (spawn-scan mode)
//! - Running the overseer on the calling thread until shutdown
//! - Collecting the final counters
//!
//! ```text
//!             grid mode                           spawn-scan mode
//!   GridOverseer ──▶ [shared queue]      SpawnOverseer ──▶ [queue 0] ──▶ worker 0
//!                     │  │  │                          └──▶ [queue 1] ──▶ worker 1
//!               worker 0 1 2 ...                       └──▶ ...
//! ```
//!
//! Workers are never cancelled mid-scan. On shutdown the queues are dropped:
//! idle workers exit, busy ones finish their job first.

use crate::clock::Clock;
use crate::config::ScanConfig;
use crate::error::{Result, ScanError, ScheduleError, WorkerError};
use crate::geo::Location;
use crate::overseer::{GridOverseer, SpawnOverseer};
use crate::progress::{LogSwitch, StatusPrinter};
use crate::schedule::{assign_spawns, load_schedule, SpawnPoint};
use crate::session::{MapParser, SessionFactory, SpawnStore};
use crate::status::{StatusRegistry, StatusSnapshot, WorkerPhase};
use crate::worker::{JobQueue, JobQueueReceiver, ScanMode, Worker, WorkerContext};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// External collaborators of a run
#[derive(Clone)]
pub struct Collaborators {
    pub factory: Arc<dyn SessionFactory>,
    pub parser: Arc<dyn MapParser>,
    pub store: Arc<dyn SpawnStore>,
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: ScanMode,
    pub workers: usize,

    /// Jobs scanned with results
    pub success: u64,

    /// Failed fetch attempts
    pub fail: u64,

    /// Jobs scanned without results
    pub no_items: u64,

    /// Stale spawn jobs dropped (spawn-scan mode only)
    pub skipped: Option<u64>,

    /// Spawn points in the schedule (spawn-scan mode only)
    pub spawns_tracked: Option<usize>,

    pub duration: Duration,
}

impl RunSummary {
    fn from_snapshot(
        snapshot: &StatusSnapshot,
        mode: ScanMode,
        spawns_tracked: Option<usize>,
        duration: Duration,
    ) -> Self {
        Self {
            mode,
            workers: snapshot.workers.len(),
            success: snapshot.total_success(),
            fail: snapshot.total_fail(),
            no_items: snapshot.total_no_items(),
            skipped: (mode == ScanMode::SpawnScan).then(|| snapshot.total_skipped()),
            spawns_tracked,
            duration,
        }
    }

    /// Jobs that completed a fetch and parse
    pub fn scanned(&self) -> u64 {
        self.success + self.no_items
    }
}

/// Coordinates one scanning run
pub struct ScanCoordinator {
    config: Arc<ScanConfig>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    registry: Arc<StatusRegistry>,
    parse_lock: Arc<Mutex<()>>,
    shutdown: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
    relocate_tx: Sender<Location>,
    relocate_rx: Receiver<Location>,
    workers: Vec<Worker>,
    log_switch: Option<LogSwitch>,
}

impl ScanCoordinator {
    pub fn new(config: ScanConfig, collaborators: Collaborators, clock: Arc<dyn Clock>) -> Self {
        let method = match config.mode() {
            ScanMode::Grid => "Hex Grid",
            ScanMode::SpawnScan => "Spawn Scan",
        };
        let registry = Arc::new(StatusRegistry::new(
            method,
            config.accounts.iter().map(|a| a.username.clone()),
            config.mode() == ScanMode::SpawnScan,
        ));
        registry.overseer().set_message("Initializing");
        let (relocate_tx, relocate_rx) = unbounded();

        Self {
            config: Arc::new(config),
            collaborators,
            clock,
            registry,
            parse_lock: Arc::new(Mutex::new(())),
            shutdown: Arc::new(AtomicBool::new(false)),
            pause: Arc::new(AtomicBool::new(false)),
            relocate_tx,
            relocate_rx,
            workers: Vec::new(),
            log_switch: None,
        }
    }

    /// Let the status screen's log toggle drive the global log filter
    pub fn with_log_switch(mut self, switch: LogSwitch) -> Self {
        self.log_switch = Some(switch);
        self
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Pausing drains the grid queue until cleared
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pause)
    }

    /// Channel that moves the grid to a new center
    pub fn relocation_sender(&self) -> Sender<Location> {
        self.relocate_tx.clone()
    }

    pub fn registry(&self) -> Arc<StatusRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run until the shutdown flag is raised or the overseer fails
    pub fn run(mut self) -> Result<RunSummary> {
        let start = Instant::now();
        let mode = self.config.mode();

        info!(
            workers = self.config.worker_count(),
            mode = ?mode,
            "Starting scan"
        );

        if let Some(location) = self.config.location {
            self.relocate_tx
                .send(location)
                .map_err(|_| ScanError::ChannelClosed)?;
        }

        let result = match mode {
            ScanMode::Grid => self.run_grid().map(|()| None),
            ScanMode::SpawnScan => self.run_spawn_scan().map(Some),
        };

        // Workers see the flag before their next job
        self.shutdown.store(true, Ordering::SeqCst);
        let spawns_tracked = result?;

        let finished = self.workers.iter().filter(|w| w.is_finished()).count();
        debug!(finished, total = self.workers.len(), "Leaving busy workers to finish their job");

        let summary = RunSummary::from_snapshot(
            &self.registry.snapshot(),
            mode,
            spawns_tracked,
            start.elapsed(),
        );
        info!(
            success = summary.success,
            fail = summary.fail,
            no_items = summary.no_items,
            duration_secs = summary.duration.as_secs(),
            "Scan stopped"
        );
        Ok(summary)
    }

    fn run_grid(&mut self) -> Result<()> {
        let queue = JobQueue::new();
        for id in 0..self.config.worker_count() {
            self.spawn_worker(id, &queue)?;
        }
        info!(count = self.workers.len(), "Search workers spawned");

        let printer = self.start_printer(vec![queue.receiver()])?;

        let mut overseer = GridOverseer::new(
            self.config.grid_settings(),
            queue,
            self.relocate_rx.clone(),
            Arc::clone(&self.pause),
            Arc::clone(&self.registry),
            Arc::clone(&self.clock),
        )
        .with_store(Arc::clone(&self.collaborators.store));

        let result = overseer.run(&self.shutdown);
        if let Some(printer) = printer {
            printer.stop();
        }
        result
    }

    fn run_spawn_scan(&mut self) -> Result<usize> {
        let queues: Vec<JobQueue> = (0..self.config.worker_count())
            .map(|_| JobQueue::new())
            .collect();
        for (id, queue) in queues.iter().enumerate() {
            self.spawn_worker(id, queue)?;
        }
        info!(count = self.workers.len(), "Spawn scan workers spawned");

        let printer = self.start_printer(queues.iter().map(|q| q.receiver()).collect())?;

        let result = self.build_schedule().and_then(|schedule| {
            let tracked = schedule.len();
            let senders = queues.iter().map(|q| q.sender()).collect();
            let mut overseer = SpawnOverseer::new(
                schedule,
                senders,
                Arc::clone(&self.registry),
                Arc::clone(&self.clock),
            )?;
            overseer.run(&self.shutdown)?;
            Ok(tracked)
        });

        if let Some(printer) = printer {
            printer.stop();
        }
        result
    }

    /// Load the schedule file if present, else query the store around the
    /// first location, then pack the points onto workers
    fn build_schedule(&self) -> Result<Vec<SpawnPoint>> {
        let status = self.registry.overseer();

        let spawns = match self.config.spawn_schedule.as_deref().filter(|p| p.is_file()) {
            Some(path) => {
                status.set_message("Getting spawnpoints from file");
                info!(path = %path.display(), "Loading spawn points from file");
                load_schedule(path)?
            }
            None => {
                status.set_message("Getting spawnpoints from database");
                let Some(center) = self.wait_for_location() else {
                    return Err(ScanError::Interrupted);
                };
                self.collaborators
                    .store
                    .spawn_points_in_hex(center, self.config.step_limit)?
            }
        };

        if spawns.is_empty() {
            return Err(ScheduleError::Empty.into());
        }

        let assignment = assign_spawns(spawns, &self.config.assign_params());
        if assignment.schedule.is_empty() {
            return Err(ScheduleError::Empty.into());
        }
        info!(spawns = assignment.schedule.len(), "Total spawns to track");
        Ok(assignment.schedule)
    }

    fn wait_for_location(&self) -> Option<Location> {
        loop {
            match self.relocate_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(location) => return Some(location),
                Err(RecvTimeoutError::Timeout) if !self.shutdown.load(Ordering::Relaxed) => continue,
                Err(_) => return None,
            }
        }
    }

    fn spawn_worker(&mut self, id: usize, queue: &JobQueue) -> Result<()> {
        let credentials = self.config.accounts[id].clone();
        let status = self.registry.worker(id).ok_or_else(|| WorkerError::InitFailed {
            id,
            reason: "no status entry".into(),
        })?;
        status.set(WorkerPhase::Staggering, "Creating thread...");
        debug!(worker = id, username = %credentials.username, "Starting search worker thread");

        let worker = Worker::spawn(
            id,
            credentials,
            queue.receiver(),
            status,
            self.worker_context(),
        )?;
        self.workers.push(worker);
        Ok(())
    }

    fn worker_context(&self) -> WorkerContext {
        WorkerContext {
            settings: Arc::new(self.config.worker_settings()),
            factory: Arc::clone(&self.collaborators.factory),
            parser: Arc::clone(&self.collaborators.parser),
            parse_lock: Arc::clone(&self.parse_lock),
            clock: Arc::clone(&self.clock),
            shutdown: Arc::clone(&self.shutdown),
            worker_count: self.config.worker_count(),
        }
    }

    fn start_printer(&self, queues: Vec<JobQueueReceiver>) -> Result<Option<StatusPrinter>> {
        if !self.config.print_status {
            return Ok(None);
        }
        match StatusPrinter::spawn(Arc::clone(&self.registry), queues, self.log_switch.clone()) {
            Ok(printer) => Ok(Some(printer)),
            Err(e) => {
                warn!(error = %e, "Failed to start status printer");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_snapshot() {
        let registry = StatusRegistry::new("Spawn Scan", ["a", "b"], true);
        registry.worker(0).unwrap().record_success();
        registry.worker(1).unwrap().record_no_items();
        registry.worker(1).unwrap().record_skipped();

        let summary = RunSummary::from_snapshot(
            &registry.snapshot(),
            ScanMode::SpawnScan,
            Some(12),
            Duration::from_secs(3),
        );
        assert_eq!(summary.workers, 2);
        assert_eq!(summary.scanned(), 2);
        assert_eq!(summary.skipped, Some(1));
        assert_eq!(summary.spawns_tracked, Some(12));

        let grid = RunSummary::from_snapshot(&registry.snapshot(), ScanMode::Grid, None, Duration::ZERO);
        assert_eq!(grid.skipped, None);
    }
}
