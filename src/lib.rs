//! hexsweep - Fleet Scheduler for Map-Scanning Worker Sessions
//!
//! Runs one worker thread per authenticated account, each polling a map API
//! at positions handed out by an overseer. Designed to keep every account
//! under its request rate while covering an area as evenly as possible.
//!
//! # Modes
//!
//! - **Hex Grid**: a hexagonal grid of scan points is built around a center
//!   location. The overseer refills one shared queue with the whole grid
//!   whenever it runs dry; workers pull from it in lockstep.
//!
//! - **Spawn Scan**: known spawn points (with their second past the hour) are
//!   packed onto workers so that each worker can physically reach each of its
//!   points in time. The overseer hands each point to its worker's private
//!   queue one minute after it spawns.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Map API (MapSession)                       │
//! └─────────────────────────────▲───────────────────────────────────┘
//!                               │ authenticate / fetch
//! ┌─────────────────────────────┴───────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 0 │  │Worker 1 │  │Worker 2 │  ...    │Worker N │     │
//! │  │ session │  │ session │  │ session │         │ session │     │
//! │  └────▲────┘  └────▲────┘  └────▲────┘         └────▲────┘     │
//! │       └────────────┼────────────┼────────────────────┘          │
//! │                    │            │                               │
//! │            ┌───────┴────────────┴─────┐                         │
//! │            │  Job Queue(s)            │                         │
//! │            │  (crossbeam unbounded)   │                         │
//! │            └───────────▲──────────────┘                         │
//! │                        │                                        │
//! │            ┌───────────┴──────────────┐    ┌────────────────┐   │
//! │            │  Overseer                │◀───│ Spawn schedule │   │
//! │            │  (grid or spawn cursor)  │    │ (assigner)     │   │
//! │            └──────────────────────────┘    └────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────┐
//!                    │ Status registry  │──▶ status screen / summary
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Hex grid with two mock accounts
//! hexsweep -m -a ptc:ash:secret -a ptc:misty:secret -l 40.7580,-73.9855
//!
//! # Pack a spawn file onto four workers, then scan it
//! hexsweep plan --spawns spawns.json --workers 4 -o schedule.json
//! hexsweep -m -a ptc:a:pw -a ptc:b:pw --spawnpoint-scanning schedule.json
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod geo;
pub mod overseer;
pub mod progress;
pub mod schedule;
pub mod session;
pub mod status;
pub mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CliArgs, ScanConfig};
pub use coordinator::{Collaborators, RunSummary, ScanCoordinator};
pub use error::{Result, ScanError, ScanOutcome};
pub use geo::Location;
pub use schedule::{assign_spawns, AssignParams, Assignment, SpawnPoint};
