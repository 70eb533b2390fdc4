//! Per-account scan loop
//!
//! A `WorkerSession` owns one set of credentials and drives one
//! [`MapSession`] through this state machine:
//!
//! ```text
//!  Staggering ──▶ WaitingForWork ──job──▶ LoggingIn ──▶ Scanning ──ok──┐
//!                      ▲                                  │ fail       │
//!                      │                                  ▼            │
//!                      │                   Retrying (scan_delay × (1+n))│
//!                      │                                  │ n == retries│
//!                      │                                  ▼            │
//!                      └───────────────────────── Cooldown (2h) ◀──────┘
//! ```
//!
//! The whole loop runs inside a supervision boundary: a login failure, an
//! unexpected collaborator error or a panic is logged, and the loop starts
//! over with a fresh session after a short pause. Nothing a worker does can
//! stop another worker or the overseer.

use crate::clock::Clock;
use crate::error::{ScanOutcome, SessionError, WorkerError};
use crate::geo::{jitter, Location};
use crate::schedule::{seconds_past_hour, time_dif};
use crate::session::{MapParser, MapSession, SessionCredentials, SessionFactory};
use crate::status::{WorkerPhase, WorkerStatus};
use crate::worker::queue::{JobSource, ScanJob};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Length of the rate-limit recovery sleep after an abandoned job
pub const COOLDOWN: Duration = Duration::from_secs(2 * 60 * 60);

/// Interval between cooldown log lines
pub const HEARTBEAT: Duration = Duration::from_secs(5 * 60);

/// Spawn jobs older than this (seconds) are skipped
pub const STALE_AFTER_SECS: f64 = 14.0 * 60.0;

/// Auth tickets with less validity than this are renewed
const TICKET_MARGIN_SECS: i64 = 60;

/// Shortest pause before a failed loop is restarted
pub const MIN_RESTART_PAUSE: Duration = Duration::from_secs(1);

/// How jobs are paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Shared queue, lockstep cadence of one job per `scan_delay`
    Grid,

    /// Private queue of timed spawn points
    SpawnScan,
}

/// Tunables shared by all workers of a run
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub mode: ScanMode,
    pub scan_delay: Duration,
    pub scan_retries: u32,
    pub login_retries: u32,
    pub login_delay: Duration,

    /// Maximum jitter applied to each scan position, in meters
    pub jitter_meters: Option<f64>,
    pub proxy: Option<String>,
    pub cooldown: Duration,
    pub heartbeat: Duration,
    pub stale_after_secs: f64,

    /// Pause before a failed loop is restarted
    pub restart_pause: Duration,
}

impl WorkerSettings {
    pub fn new(mode: ScanMode, scan_delay: Duration) -> Self {
        Self {
            mode,
            scan_delay,
            scan_retries: 5,
            login_retries: 3,
            login_delay: Duration::from_secs(6),
            jitter_meters: None,
            proxy: None,
            cooldown: COOLDOWN,
            heartbeat: HEARTBEAT,
            stale_after_secs: STALE_AFTER_SECS,
            restart_pause: scan_delay.max(MIN_RESTART_PAUSE),
        }
    }
}

/// Collaborators and shared state handed to every worker
#[derive(Clone)]
pub struct WorkerContext {
    pub settings: Arc<WorkerSettings>,
    pub factory: Arc<dyn SessionFactory>,
    pub parser: Arc<dyn MapParser>,

    /// Serializes the parse/ingest path across all workers
    pub parse_lock: Arc<Mutex<()>>,
    pub clock: Arc<dyn Clock>,
    pub shutdown: Arc<AtomicBool>,
    pub worker_count: usize,
}

/// Startup delay that spreads logins evenly over `scan_delay`
///
/// With more workers than seconds in `scan_delay`, workers start roughly
/// one second apart instead.
pub fn stagger_delay<R: Rng + ?Sized>(
    index: usize,
    worker_count: usize,
    scan_delay: Duration,
    rng: &mut R,
) -> Duration {
    if worker_count <= 1 || index == 0 {
        return Duration::ZERO;
    }

    let delay_secs = scan_delay.as_secs_f64();
    let secs = if worker_count as f64 > delay_secs {
        index as f64 + (rng.gen::<f64>() - 0.5) / 2.0
    } else {
        delay_secs / worker_count as f64 * index as f64
    };
    Duration::from_secs_f64(secs.max(0.0))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// One worker: credentials, a job source and the scan loop around them
pub struct WorkerSession<S: JobSource> {
    id: usize,
    credentials: SessionCredentials,
    source: S,
    status: Arc<WorkerStatus>,
    ctx: WorkerContext,
    rng: StdRng,
}

impl<S: JobSource> WorkerSession<S> {
    pub fn new(
        id: usize,
        credentials: SessionCredentials,
        source: S,
        status: Arc<WorkerStatus>,
        ctx: WorkerContext,
    ) -> Self {
        Self {
            id,
            credentials,
            source,
            status,
            ctx,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source used for stagger and jitter
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Supervised loop; returns once the job source closes or shutdown is raised
    pub fn run(mut self) {
        let settings = Arc::clone(&self.ctx.settings);

        let delay = stagger_delay(
            self.id,
            self.ctx.worker_count,
            settings.scan_delay,
            &mut self.rng,
        );
        if !delay.is_zero() {
            debug!(worker = self.id, delay_secs = delay.as_secs_f64(), "Delaying worker startup");
            self.status.set(
                WorkerPhase::Staggering,
                format!("Delaying startup for {:.2} seconds", delay.as_secs_f64()),
            );
            self.ctx.clock.sleep(delay);
        }

        debug!(worker = self.id, username = %self.credentials.username, "Search worker starting");

        loop {
            let failure = match panic::catch_unwind(AssertUnwindSafe(|| self.run_pass())) {
                Ok(Ok(())) => break,
                Ok(Err(e)) => e,
                Err(payload) => WorkerError::Panicked {
                    id: self.id,
                    message: panic_message(payload.as_ref()),
                },
            };

            if self.ctx.shutdown.load(Ordering::Relaxed) {
                break;
            }

            error!(
                worker = self.id,
                username = %self.credentials.username,
                error = %failure,
                "Search worker loop failed, restarting"
            );
            self.status.set(
                WorkerPhase::Restarting,
                format!("Exception in search worker: {}", failure),
            );
            self.ctx.clock.sleep(settings.restart_pause);
        }

        info!(worker = self.id, "Search worker exiting");
    }

    /// One unsupervised pass: fresh session, then jobs until the source closes
    fn run_pass(&mut self) -> Result<(), WorkerError> {
        let settings = Arc::clone(&self.ctx.settings);
        let cadence = chrono::Duration::from_std(settings.scan_delay)
            .unwrap_or_else(|_| chrono::Duration::zero());

        self.status.set(WorkerPhase::WaitingForWork, "Entering search loop");
        let mut session = self
            .ctx
            .factory
            .create(self.id)
            .map_err(|source| WorkerError::Session { id: self.id, source })?;

        let mut next_slot = self.ctx.clock.now();

        loop {
            if self.ctx.shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }

            self.status.set(WorkerPhase::WaitingForWork, "Waiting for item from queue");
            let Some(job) = self.source.next_job() else {
                return Ok(());
            };
            // Slots missed while idle are not made up later
            next_slot = next_slot.max(self.ctx.clock.now());

            info!(
                worker = self.id,
                step = job.step,
                remaining = self.source.pending(),
                "Search step beginning"
            );

            let outcome = self.execute(session.as_mut(), &job)?;
            log_outcome(self.id, &outcome);

            match settings.mode {
                ScanMode::Grid => {
                    // Workers advance in lockstep; a late job eats into the
                    // following slots instead of shifting them.
                    let wait = next_slot + cadence - self.ctx.clock.now();
                    if let Ok(remaining) = wait.to_std() {
                        if !remaining.is_zero() {
                            self.status.set(
                                WorkerPhase::WaitingForWork,
                                format!(
                                    "Waiting {:.1} seconds for scan delay",
                                    remaining.as_secs_f64()
                                ),
                            );
                            self.ctx.clock.sleep(remaining);
                        }
                    }
                    next_slot += cadence;
                }
                ScanMode::SpawnScan => {
                    if !matches!(outcome, ScanOutcome::Skipped { .. }) {
                        self.status.set(
                            WorkerPhase::WaitingForWork,
                            format!(
                                "Waiting {} seconds for scan delay",
                                settings.scan_delay.as_secs_f64()
                            ),
                        );
                        self.ctx.clock.sleep(settings.scan_delay);
                    }
                }
            }
        }
    }

    /// Scan one job under the login/retry/backoff discipline
    ///
    /// Retryable collaborator failures are absorbed here; anything else is
    /// returned and ends the current pass.
    pub fn execute(
        &mut self,
        session: &mut dyn MapSession,
        job: &ScanJob,
    ) -> Result<ScanOutcome, WorkerError> {
        let settings = Arc::clone(&self.ctx.settings);

        if let Some(spawn_time) = job.spawn_time {
            let late = time_dif(seconds_past_hour(self.ctx.clock.now()), spawn_time);
            if late >= settings.stale_after_secs {
                info!(
                    worker = self.id,
                    step = job.step,
                    late_secs = late,
                    "Can't keep up, skipping spawn point"
                );
                self.status.record_skipped();
                self.status
                    .set(WorkerPhase::WaitingForWork, "Skipping spawnpoint - can't keep up.");
                return Ok(ScanOutcome::Skipped { step: job.step });
            }
        }

        let target = job.location;
        self.status.set(
            WorkerPhase::Scanning,
            format!("Searching at {:.6},{:.6}", target.lat, target.lng),
        );
        session.set_position(target);

        let mut failures = 0u32;
        loop {
            if failures >= settings.scan_retries {
                error!(
                    worker = self.id,
                    step = job.step,
                    failures,
                    "Search step went over max scan_retries; abandoning"
                );
                self.cooldown();
                return Ok(ScanOutcome::Abandoned {
                    step: job.step,
                    failures,
                });
            }

            let backoff = settings.scan_delay * (1 + failures);

            self.check_login(session, target)?;

            let location = self.scan_location(target);
            if location != target {
                session.set_position(location);
            }

            let failure = match session.fetch_map_objects(location) {
                Ok(response) if response.is_empty() => SessionError::EmptyResponse,
                Ok(response) => {
                    let parsed = {
                        let _guard = self.ctx.parse_lock.lock();
                        self.ctx.parser.parse_map(&response, location)
                    };
                    match parsed {
                        Ok(found) if found > 0 => {
                            self.status.record_success();
                            return Ok(ScanOutcome::Scanned { step: job.step, found });
                        }
                        Ok(_) => {
                            self.status.record_no_items();
                            return Ok(ScanOutcome::Empty { step: job.step });
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if !failure.is_retryable() {
                return Err(WorkerError::Session {
                    id: self.id,
                    source: failure,
                });
            }

            failures += 1;
            self.status.record_fail();
            warn!(
                worker = self.id,
                step = job.step,
                failures,
                retry_in_secs = backoff.as_secs_f64(),
                error = %failure,
                "Search step failed, retrying"
            );
            self.status.set(
                WorkerPhase::Retrying,
                format!(
                    "Failed {} times to scan {:.6},{:.6} - {} - sleeping {} seconds. Username: {}",
                    failures,
                    target.lat,
                    target.lng,
                    failure,
                    backoff.as_secs_f64(),
                    self.credentials.username
                ),
            );
            self.ctx.clock.sleep(backoff);
        }
    }

    /// Make sure the session holds a ticket valid for at least another minute
    fn check_login(
        &mut self,
        session: &mut dyn MapSession,
        position: Location,
    ) -> Result<(), WorkerError> {
        let settings = Arc::clone(&self.ctx.settings);

        if let Some(expiry) = session.ticket_expiry() {
            let remaining = expiry - self.ctx.clock.now();
            if remaining.num_seconds() > TICKET_MARGIN_SECS {
                trace!(
                    worker = self.id,
                    remaining_secs = remaining.num_seconds(),
                    "Credentials still valid"
                );
                return Ok(());
            }
        }

        self.status.set(
            WorkerPhase::LoggingIn,
            format!("Logging in as {}", self.credentials.username),
        );
        session.set_position(position);

        let attempts = settings.login_retries.max(1);
        for attempt in 1..=attempts {
            match session.authenticate(&self.credentials, settings.proxy.as_deref()) {
                Ok(()) => {
                    debug!(
                        worker = self.id,
                        username = %self.credentials.username,
                        "Login successful"
                    );
                    self.status.set(
                        WorkerPhase::Scanning,
                        format!("Searching at {:.6},{:.6}", position.lat, position.lng),
                    );
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        worker = self.id,
                        username = %self.credentials.username,
                        attempt,
                        error = %e,
                        "Failed to login"
                    );
                    if attempt < attempts {
                        self.ctx.clock.sleep(settings.login_delay);
                    }
                }
            }
        }

        Err(WorkerError::TooManyLoginAttempts {
            id: self.id,
            username: self.credentials.username.clone(),
            attempts,
        })
    }

    fn scan_location(&mut self, location: Location) -> Location {
        match self.ctx.settings.jitter_meters {
            Some(max) if max > 0.0 => jitter(location, max, &mut self.rng),
            _ => location,
        }
    }

    /// Long sleep after an abandoned job, logging a heartbeat along the way
    fn cooldown(&self) {
        let settings = &self.ctx.settings;
        let started = self.ctx.clock.now().format("%H:%M").to_string();
        let minutes = settings.cooldown.as_secs() / 60;

        let mut slept = Duration::ZERO;
        while slept < settings.cooldown {
            error!(
                worker = self.id,
                username = %self.credentials.username,
                started = %started,
                "Worker failed, possibly banned account"
            );
            self.status.set(
                WorkerPhase::Cooldown,
                format!(
                    "Worker {} failed, possibly banned account. Started {} minute sleep at {}",
                    self.credentials.username, minutes, started
                ),
            );

            let nap = settings.heartbeat.min(settings.cooldown - slept);
            if nap.is_zero() {
                break;
            }
            self.ctx.clock.sleep(nap);
            slept += nap;
        }
    }
}

fn log_outcome(worker: usize, outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Scanned { step, found } => {
            debug!(worker, step, found, "Search step completed");
        }
        ScanOutcome::Empty { step } => {
            debug!(worker, step, "Search step completed with no items");
        }
        ScanOutcome::Skipped { step } => {
            trace!(worker, step, "Search step skipped");
        }
        ScanOutcome::Abandoned { step, failures } => {
            warn!(worker, step, failures, "Search step abandoned");
        }
    }
}
