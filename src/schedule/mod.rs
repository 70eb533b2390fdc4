//! Spawn schedules
//!
//! A spawn point is a location plus a recurring time-of-hour at which a
//! transient entity appears. This module covers:
//! - [`assign`]: packing spawn points onto workers under speed/delay limits
//! - [`cursor`]: time-of-hour arithmetic and schedule lookup
//! - [`file`]: the JSON schedule file format

pub mod assign;
pub mod cursor;
pub mod file;

use crate::geo::{distance_m, Location};
use serde::{Deserialize, Serialize};

pub use assign::{assign_spawns, AssignParams, Assignment, InsertionCost};
pub use cursor::{first_at_or_after, seconds_past_hour, time_dif};
pub use file::{load_schedule, save_schedule};

/// Length of the spawn cycle in seconds
pub const HOUR_SECS: f64 = 3600.0;

/// A recurring hourly spawn event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lng: f64,

    /// Seconds past the hour, in [0, 3600)
    pub time: f64,

    /// Worker index once assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<usize>,
}

impl SpawnPoint {
    /// Create an unassigned spawn point
    pub fn new(lat: f64, lng: f64, time: f64) -> Self {
        Self {
            lat,
            lng,
            time,
            worker: None,
        }
    }

    /// Map location of this spawn at the given altitude
    pub fn location(&self, alt: f64) -> Location {
        Location::new(self.lat, self.lng, alt)
    }

    /// Great-circle distance to another spawn point in meters
    pub fn distance_to(&self, other: &SpawnPoint) -> f64 {
        distance_m((self.lat, self.lng), (other.lat, other.lng))
    }
}

/// Forward distance from `from` to `to` around the hour, in [0, 3600)
pub(crate) fn circular_gap(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(HOUR_SECS)
}
