//! Overseers feed scan jobs to workers
//!
//! - [`grid`]: one shared queue holding a full pass over a hex grid
//! - [`spawn`]: per-worker queues fed from the hourly spawn schedule
//!
//! An overseer runs on the coordinator's thread and is not supervised; an
//! error there ends the run.

pub mod grid;
pub mod spawn;

pub use grid::{GridOverseer, GridSettings, GridTick};
pub use spawn::{SpawnOverseer, SPAWN_SCAN_ALTITUDE};
