//! Spawn-scan overseer
//!
//! Walks a cursor over the merged, time-sorted schedule in step with the
//! wall clock and hands each spawn point to the private queue of the worker
//! it was assigned to, one minute after it spawns.
//!
//! ```text
//!   schedule: [t=12 w0] [t=40 w1] [t=95 w0] [t=300 w1] ...
//!                          ▲ pos
//!   now - 60 >= t[pos] ──▶ queue[w1].send(job); pos = (pos + 1) % len
//! ```

use crate::clock::Clock;
use crate::error::{Result, ScheduleError, WorkerError};
use crate::schedule::{first_at_or_after, seconds_past_hour, time_dif, SpawnPoint, HOUR_SECS};
use crate::status::StatusRegistry;
use crate::worker::{JobQueueSender, ScanJob};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seconds a spawn must have been up before it is dispatched
pub const DISPATCH_AGE_SECS: f64 = 60.0;

/// Altitude sent with spawn scans (more reliable than 0)
pub const SPAWN_SCAN_ALTITUDE: f64 = 40.32;

/// Minimum seconds between two dispatches of the same entry
const REDISPATCH_SECS: i64 = 30 * 60;

const POLL: Duration = Duration::from_secs(1);

/// Drives spawn-scan workers through their private queues
pub struct SpawnOverseer {
    schedule: Vec<SpawnPoint>,
    senders: Vec<JobQueueSender>,
    registry: Arc<StatusRegistry>,
    clock: Arc<dyn Clock>,
    pos: usize,
    last_dispatch: Vec<Option<DateTime<Utc>>>,
    dispatched: u64,
}

impl SpawnOverseer {
    /// `schedule` must be the time-sorted output of the assigner
    ///
    /// Entries without a valid worker index are dropped with a warning.
    pub fn new(
        schedule: Vec<SpawnPoint>,
        senders: Vec<JobQueueSender>,
        registry: Arc<StatusRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let total = schedule.len();
        let mut schedule: Vec<SpawnPoint> = schedule
            .into_iter()
            .filter(|sp| matches!(sp.worker, Some(w) if w < senders.len()))
            .collect();
        if schedule.len() < total {
            warn!(dropped = total - schedule.len(), "Dropping spawn points without a valid worker");
        }
        if schedule.is_empty() {
            return Err(ScheduleError::Empty.into());
        }
        schedule.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut overseer = Self {
            last_dispatch: vec![None; schedule.len()],
            schedule,
            senders,
            registry,
            clock,
            pos: 0,
            dispatched: 0,
        };
        overseer.seek();
        Ok(overseer)
    }

    /// Cursor position in the schedule
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn schedule(&self) -> &[SpawnPoint] {
        &self.schedule
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Place the cursor on the first spawn that is at most a minute old
    pub fn seek(&mut self) {
        let now = seconds_past_hour(self.clock.now());
        let target = (now - DISPATCH_AGE_SECS).rem_euclid(HOUR_SECS);
        let pos = first_at_or_after(&self.schedule, target);
        self.pos = if pos == self.schedule.len() { 0 } else { pos };
        debug!(pos = self.pos, target, "Spawn cursor positioned");
    }

    /// Poll once per second until `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!(spawns = self.schedule.len(), "Total spawns to track");
        self.seek();
        while !shutdown.load(Ordering::Relaxed) {
            if self.poll()?.is_none() {
                self.clock.sleep(POLL);
            }
        }
        info!(dispatched = self.dispatched, "Spawn overseer stopping");
        Ok(())
    }

    /// Dispatch the cursor entry if it is due, returning the job sent
    pub fn poll(&mut self) -> Result<Option<ScanJob>> {
        let now = self.clock.now();
        let now_secs = seconds_past_hour(now);
        let len = self.schedule.len();
        let entry = self.schedule[self.pos];
        let status = self.registry.overseer();

        let recently_sent = self.last_dispatch[self.pos]
            .is_some_and(|at| (now - at).num_seconds() < REDISPATCH_SECS);

        if recently_sent || time_dif(now_secs, entry.time) < DISPATCH_AGE_SECS {
            status.set_message(format!(
                "Waiting for spawnpoint {} of {} to spawn at {}",
                self.pos + 1,
                len,
                entry.time
            ));
            return Ok(None);
        }

        status.set_message(format!("Queuing spawnpoint {} of {}", self.pos + 1, len));
        let job = ScanJob::spawn(self.pos + 1, entry.location(SPAWN_SCAN_ALTITUDE), entry.time);
        let worker = entry.worker.unwrap_or_default();
        self.senders[worker]
            .send(job)
            .map_err(|_| WorkerError::QueueSendFailed)?;
        debug!(step = job.step, worker, time = entry.time, "Queued spawn point");

        self.last_dispatch[self.pos] = Some(now);
        self.dispatched += 1;
        self.pos = (self.pos + 1) % len;
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::worker::JobQueue;
    use chrono::TimeZone;

    fn assigned(time: f64, worker: usize) -> SpawnPoint {
        let mut sp = SpawnPoint::new(1.0, 2.0, time);
        sp.worker = Some(worker);
        sp
    }

    fn setup(
        schedule: Vec<SpawnPoint>,
        minute: u32,
        second: u32,
    ) -> (SpawnOverseer, Vec<JobQueue>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 7, minute, second).unwrap(),
        ));
        let queues = vec![JobQueue::new(), JobQueue::new()];
        let senders = queues.iter().map(|q| q.sender()).collect();
        let registry = Arc::new(StatusRegistry::new("Spawn Scan", ["a", "b"], true));
        let overseer = SpawnOverseer::new(schedule, senders, registry, clock.clone()).unwrap();
        (overseer, queues, clock)
    }

    #[test]
    fn test_initial_cursor_near_live_edge() {
        let schedule = vec![assigned(100.0, 0), assigned(500.0, 1), assigned(900.0, 0)];
        // 10:00 past the hour = 600s; first entry at or after 540 is t=900
        let (overseer, _queues, _clock) = setup(schedule.clone(), 10, 0);
        assert_eq!(overseer.position(), 2);

        // 9:20 = 560s; target 500 lands exactly on t=500
        let (overseer, _queues, _clock) = setup(schedule, 9, 20);
        assert_eq!(overseer.position(), 1);
    }

    #[test]
    fn test_cursor_wraps_past_last_entry() {
        let schedule = vec![assigned(100.0, 0), assigned(200.0, 1)];
        let (overseer, _queues, _clock) = setup(schedule, 50, 0);
        assert_eq!(overseer.position(), 0);
    }

    #[test]
    fn test_dispatch_after_one_minute() {
        let schedule = vec![assigned(600.0, 1), assigned(700.0, 0)];
        let (mut overseer, queues, clock) = setup(schedule, 10, 0);
        assert_eq!(overseer.position(), 0);

        // Spawned this instant: not yet
        assert!(overseer.poll().unwrap().is_none());
        clock.advance(Duration::from_secs(59));
        assert!(overseer.poll().unwrap().is_none());

        clock.advance(Duration::from_secs(1));
        let job = overseer.poll().unwrap().unwrap();
        assert_eq!(job.step, 1);
        assert_eq!(job.spawn_time, Some(600.0));
        assert_eq!(job.location.alt, SPAWN_SCAN_ALTITUDE);
        assert_eq!(queues[1].len(), 1);
        assert!(queues[0].is_empty());
        assert_eq!(overseer.position(), 1);

        // Next one is 100s later
        assert!(overseer.poll().unwrap().is_none());
        clock.advance(Duration::from_secs(100));
        assert!(overseer.poll().unwrap().is_some());
        assert_eq!(queues[0].len(), 1);
        assert_eq!(overseer.position(), 0);
    }

    #[test]
    fn test_single_entry_not_redispatched_within_hour() {
        let (mut overseer, queues, clock) = setup(vec![assigned(0.0, 0)], 1, 0);
        assert!(overseer.poll().unwrap().is_some());

        for _ in 0..10 {
            assert!(overseer.poll().unwrap().is_none());
            clock.advance(Duration::from_secs(60));
        }
        assert_eq!(queues[0].len(), 1);

        // Next hour, one minute after the spawn
        clock.set(Utc.with_ymd_and_hms(2024, 1, 1, 8, 1, 0).unwrap());
        assert!(overseer.poll().unwrap().is_some());
        assert_eq!(overseer.dispatched(), 2);
    }

    #[test]
    fn test_rejects_empty_or_unassigned_schedule() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let registry = Arc::new(StatusRegistry::new("Spawn Scan", ["a"], true));
        let queue = JobQueue::new();

        let result = SpawnOverseer::new(
            vec![SpawnPoint::new(0.0, 0.0, 10.0), assigned(20.0, 5)],
            vec![queue.sender()],
            registry,
            clock,
        );
        assert!(result.is_err());
    }
}
