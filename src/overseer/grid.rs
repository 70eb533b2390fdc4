//! Hex grid overseer
//!
//! Keeps one shared queue stocked with a full coverage pass of the grid
//! around the current center. Every tick re-checks, in order:
//!
//! 1. pause flag: drain the queue and do nothing else
//! 2. relocation signal: keep only the newest location, drain, rebuild steps
//! 3. empty queue: enqueue the whole pass again, steps numbered from 1

use crate::clock::Clock;
use crate::error::Result;
use crate::geo::{distance_m, generate_steps, BoundingBox, Location};
use crate::session::SpawnStore;
use crate::status::StatusRegistry;
use crate::worker::{JobQueue, JobQueueSender, ScanJob};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grid spacing when scanning every entity type (km)
pub const STEP_DISTANCE_KM: f64 = 0.07;

/// Grid spacing when only static structures are wanted (km)
pub const STATIC_STEP_DISTANCE_KM: f64 = 0.9;

/// A step is kept by the spawn filter if a spawn point is this close (m)
pub const SPAWN_FILTER_RADIUS_M: f64 = 70.0;

const TICK: Duration = Duration::from_secs(1);

/// Grid shape options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSettings {
    pub ring_count: usize,

    /// Only static structures: coarser grid at visibility range
    pub static_only: bool,

    /// Drop steps with no known spawn point nearby
    pub spawnpoints_only: bool,
}

impl GridSettings {
    pub fn step_distance_km(&self) -> f64 {
        if self.static_only {
            STATIC_STEP_DISTANCE_KM
        } else {
            STEP_DISTANCE_KM
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridTick {
    /// Paused; `drained` pending jobs were discarded
    Paused { drained: usize },

    /// The queue was empty and a new pass of `queued` steps was enqueued
    Refilled { queued: usize },

    /// Workers are still busy with the current pass
    Processing { pending: usize },
}

/// Drives grid-mode workers through a shared queue
pub struct GridOverseer {
    settings: GridSettings,
    queue: JobQueue,
    sender: JobQueueSender,
    relocations: Receiver<Location>,
    pause: Arc<AtomicBool>,
    store: Option<Arc<dyn SpawnStore>>,
    registry: Arc<StatusRegistry>,
    clock: Arc<dyn Clock>,
    center: Option<Location>,
    steps: Vec<Location>,
    passes: u64,
}

impl GridOverseer {
    pub fn new(
        settings: GridSettings,
        queue: JobQueue,
        relocations: Receiver<Location>,
        pause: Arc<AtomicBool>,
        registry: Arc<StatusRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sender = queue.sender();
        Self {
            settings,
            queue,
            sender,
            relocations,
            pause,
            store: None,
            registry,
            clock,
            center: None,
            steps: Vec::new(),
            passes: 0,
        }
    }

    /// Spawn point store used by the spawn-proximity filter
    pub fn with_store(mut self, store: Arc<dyn SpawnStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn center(&self) -> Option<Location> {
        self.center
    }

    /// Steps of the active pass
    pub fn steps(&self) -> &[Location] {
        &self.steps
    }

    /// Number of passes enqueued so far
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Tick once per second until `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        info!("Search overseer starting");
        while !shutdown.load(Ordering::Relaxed) {
            self.tick()?;
            self.clock.sleep(TICK);
        }
        info!(passes = self.passes, "Search overseer stopping");
        Ok(())
    }

    /// One level-triggered iteration
    pub fn tick(&mut self) -> Result<GridTick> {
        let registry = Arc::clone(&self.registry);
        let status = registry.overseer();

        if self.pause.load(Ordering::Relaxed) {
            let drained = self.queue.drain();
            if drained > 0 {
                debug!(drained, "Cleared search queue for pause");
            }
            status.set_message("Scanning is paused");
            return Ok(GridTick::Paused { drained });
        }

        if let Some(location) = self.relocations.try_iter().last() {
            info!(lat = location.lat, lng = location.lng, "New location caught, moving search grid");
            self.queue.drain();
            self.relocate(location)?;
        }

        if self.queue.is_empty() {
            debug!(steps = self.steps.len(), "Search queue empty, restarting loop");
            status.set_message("Queuing next step");
            let jobs = self
                .steps
                .iter()
                .enumerate()
                .map(|(i, location)| ScanJob::step(i + 1, *location));
            let queued = self.sender.send_all(jobs).unwrap_or(0);
            if queued > 0 {
                self.passes += 1;
            }
            Ok(GridTick::Refilled { queued })
        } else {
            status.set_message("Processing search queue");
            Ok(GridTick::Processing {
                pending: self.queue.len(),
            })
        }
    }

    /// Rebuild the step list around a new center
    fn relocate(&mut self, center: Location) -> Result<()> {
        let step_distance = self.settings.step_distance_km();
        info!(step_distance_km = step_distance, "Scan distance set");

        let mut steps: Vec<Location> =
            generate_steps(center, self.settings.ring_count, step_distance).collect();

        if self.settings.spawnpoints_only {
            let spawns = self.nearby_spawns(center)?;
            if spawns.is_empty() {
                warn!("No spawnpoints found in the specified area (did you forget to run a normal scan here first?)");
            }
            steps.retain(|step| {
                spawns
                    .iter()
                    .any(|&sp| distance_m((step.lat, step.lng), sp) <= SPAWN_FILTER_RADIUS_M)
            });
        }

        if steps.is_empty() {
            warn!("Nothing to scan!");
        }

        self.center = Some(center);
        self.steps = steps;
        Ok(())
    }

    /// Spawn points in a square of side `4 * 0.07 * ring_count` km
    fn nearby_spawns(&self, center: Location) -> Result<Vec<(f64, f64)>> {
        let Some(store) = &self.store else {
            warn!("Spawn point filter enabled without a spawn store");
            return Ok(Vec::new());
        };

        let half_side = STEP_DISTANCE_KM * 2.0 * self.settings.ring_count as f64;
        let bbox = BoundingBox::around(center, half_side);
        debug!(
            south = bbox.south,
            west = bbox.west,
            north = bbox.north,
            east = bbox.east,
            "Searching for spawnpoints"
        );
        Ok(store.spawn_points_in_bbox(bbox)?)
    }
}
