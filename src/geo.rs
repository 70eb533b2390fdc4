//! Coordinate geometry and scan-step generation
//!
//! Spherical-earth helpers used by the grid overseer and the spawn assigner:
//! - [`destination`]: great-circle projection from a point along a bearing
//! - [`distance_m`]: haversine distance between two points
//! - [`generate_steps`]: hexagonal ring walk of scan points around a center
//! - [`jitter`]: uniform random displacement inside a disk
//!
//! # Ring layout
//!
//! ```text
//!            *   *   *          ring 2 (12 points)
//!          *   o   o   *        ring 1 (6 points)
//!        *   o   C   o   *      C = center
//!          *   o   o   *
//!            *   *   *
//! ```
//!
//! Columns are `sqrt(3) * d` apart and rows `1.5 * d`, so circular scan
//! footprints of radius `d` tile the area without gaps.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Spherical earth radius used for all projections (km)
pub const EARTH_RADIUS_KM: f64 = 6378.1;

const NORTH: f64 = 0.0;
const EAST: f64 = 90.0;
const SOUTH: f64 = 180.0;
const WEST: f64 = 270.0;

/// A position on the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees
    pub lat: f64,

    /// Longitude in degrees
    pub lng: f64,

    /// Altitude in meters
    #[serde(default)]
    pub alt: f64,
}

impl Location {
    /// Create a new location
    pub fn new(lat: f64, lng: f64, alt: f64) -> Self {
        Self { lat, lng, alt }
    }

    /// Same coordinates at a different altitude
    pub fn with_alt(self, alt: f64) -> Self {
        Self { alt, ..self }
    }

    /// Great-circle distance to another location in meters
    pub fn distance_to(&self, other: &Location) -> f64 {
        distance_m((self.lat, self.lng), (other.lat, other.lng))
    }
}

/// Axis-aligned lat/lng box used for spawn store queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Square box whose edge midpoints lie `half_side_km` from `center`
    pub fn around(center: Location, half_side_km: f64) -> Self {
        let south = destination(center, half_side_km, SOUTH);
        let west = destination(center, half_side_km, WEST);
        let north = destination(center, half_side_km, NORTH);
        let east = destination(center, half_side_km, EAST);
        Self {
            south: south.lat,
            west: west.lng,
            north: north.lat,
            east: east.lng,
        }
    }

    /// Check whether a point lies inside the box
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.south && lat <= self.north && lng >= self.west && lng <= self.east
    }
}

/// Project `origin` by `distance_km` along `bearing_deg` on a sphere
///
/// Altitude is carried over unchanged.
pub fn destination(origin: Location, distance_km: f64, bearing_deg: f64) -> Location {
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();
    let angular = distance_km / EARTH_RADIUS_KM;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Location::new(lat2.to_degrees(), lng2.to_degrees(), origin.alt)
}

/// Haversine distance between two (lat, lng) points in meters
pub fn distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let delta_lat = lat2 - lat1;
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * 1000.0 * c
}

/// Number of points `generate_steps` yields for `ring_count` rings
pub fn step_count(ring_count: usize) -> usize {
    if ring_count == 0 {
        1
    } else {
        1 + 3 * ring_count * (ring_count - 1)
    }
}

/// Lazy hexagonal ring walk, see [`generate_steps`]
#[derive(Debug, Clone)]
pub struct LocationSteps {
    center: Location,
    ring_count: usize,
    xdist: f64,
    ydist: f64,
    cursor: Location,
    ring: usize,
    direction: usize,
    leg: usize,
    started: bool,
    remaining: usize,
}

/// Generate scan points spiralling out from `center`
///
/// Yields the center first, then rings `1..ring_count`; ring `k` holds `6k`
/// points. Altitude of every step is 0.
pub fn generate_steps(center: Location, ring_count: usize, step_distance_km: f64) -> LocationSteps {
    let center = center.with_alt(0.0);
    LocationSteps {
        center,
        ring_count,
        xdist: 3f64.sqrt() * step_distance_km,
        ydist: 1.5 * step_distance_km,
        cursor: center,
        ring: 1,
        direction: 0,
        leg: 0,
        started: false,
        remaining: step_count(ring_count),
    }
}

impl LocationSteps {
    fn walk(&self, from: Location) -> Location {
        let (xdist, ydist) = (self.xdist, self.ydist);
        match self.direction {
            // right
            0 => destination(from, xdist, EAST),
            // down + right
            1 => destination(destination(from, ydist, SOUTH), xdist / 2.0, EAST),
            // down + left
            2 => destination(destination(from, ydist, SOUTH), xdist / 2.0, WEST),
            // left
            3 => destination(from, xdist, WEST),
            // up + left
            4 => destination(destination(from, ydist, NORTH), xdist / 2.0, WEST),
            // up + right
            _ => destination(destination(from, ydist, NORTH), xdist / 2.0, EAST),
        }
    }
}

impl Iterator for LocationSteps {
    type Item = Location;

    fn next(&mut self) -> Option<Location> {
        if !self.started {
            self.started = true;
            self.remaining -= 1;
            return Some(self.center);
        }
        if self.ring >= self.ring_count {
            return None;
        }

        if self.direction == 0 && self.leg == 0 {
            // Each ring starts from the top-left corner of the previous one
            self.cursor = destination(self.cursor, self.ydist, NORTH);
            self.cursor = destination(self.cursor, self.xdist / 2.0, WEST);
        }

        self.cursor = self.walk(self.cursor);

        self.leg += 1;
        if self.leg == self.ring {
            self.leg = 0;
            self.direction += 1;
            if self.direction == 6 {
                self.direction = 0;
                self.ring += 1;
            }
        }

        self.remaining -= 1;
        Some(self.cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for LocationSteps {}

/// Displace `location` by a random offset of at most `max_meters`
///
/// The radius is `sqrt(u) * max` so offsets are uniform over the disk.
pub fn jitter<R: Rng + ?Sized>(location: Location, max_meters: f64, rng: &mut R) -> Location {
    let bearing = rng.gen_range(0.0..360.0);
    let distance_km = rng.gen::<f64>().sqrt() * (max_meters / 1000.0);
    destination(location, distance_km, bearing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_destination_north() {
        let origin = Location::new(0.0, 0.0, 0.0);
        let dest = destination(origin, 111.32, 0.0);
        // One degree of latitude on this sphere is ~111.32 km
        assert!((dest.lat - 1.0).abs() < 0.01);
        assert!(dest.lng.abs() < 1e-9);
    }

    #[test]
    fn test_destination_zero_distance() {
        let origin = Location::new(40.7, -74.0, 12.0);
        let dest = destination(origin, 0.0, 123.0);
        assert!((dest.lat - origin.lat).abs() < 1e-12);
        assert!((dest.lng - origin.lng).abs() < 1e-12);
        assert_eq!(dest.alt, 12.0);
    }

    #[test]
    fn test_destination_self_inverts() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let origin = Location::new(rng.gen_range(-70.0..70.0), rng.gen_range(-179.0..179.0), 0.0);
            let distance = rng.gen_range(0.0..5.0);
            let bearing = rng.gen_range(0.0..360.0);

            let out = destination(origin, distance, bearing);
            let back = destination(out, distance, bearing + 180.0);

            // Bearings drift along a great circle, so allow 1% of the hop
            let tolerance = distance * 1000.0 * 0.01 + 0.01;
            assert!(back.distance_to(&origin) < tolerance, "returned {:?} for {:?}", back, origin);
        }
    }

    #[test]
    fn test_destination_reverse_bearing_short_hop() {
        // Forward then back along b + 180 is near-exact for short hops
        let origin = Location::new(51.5, -0.12, 0.0);
        let out = destination(origin, 0.5, 60.0);
        let back = destination(out, 0.5, 240.0);
        assert!(back.distance_to(&origin) < 0.5);
    }

    #[test]
    fn test_distance_symmetry_and_scale() {
        let a = (10.0, 20.0);
        let b = (10.5, 20.5);
        assert!((distance_m(a, b) - distance_m(b, a)).abs() < 1e-6);
        assert_eq!(distance_m(a, a), 0.0);

        let d = distance_m((0.0, 0.0), (1.0, 0.0));
        assert!((d - 111_317.0).abs() < 50.0);
    }

    #[test]
    fn test_step_counts() {
        let center = Location::new(0.0, 0.0, 0.0);
        for k in 1..=8 {
            let steps: Vec<_> = generate_steps(center, k, 0.07).collect();
            assert_eq!(steps.len(), 1 + 3 * k * (k - 1), "ring count {}", k);
            assert_eq!(steps.len(), step_count(k));
            assert_eq!(steps[0], center);
        }
    }

    #[test]
    fn test_first_ring_spacing() {
        let center = Location::new(37.0, -122.0, 0.0);
        let step = 0.07;
        let steps: Vec<_> = generate_steps(center, 2, step).collect();
        assert_eq!(steps.len(), 7);

        let expected_m = 3f64.sqrt() * step * 1000.0;
        for s in &steps[1..] {
            let d = center.distance_to(s);
            assert!((d - expected_m).abs() < 0.5, "distance {} vs {}", d, expected_m);
        }
    }

    #[test]
    fn test_steps_restartable() {
        let center = Location::new(-33.9, 151.2, 5.0);
        let steps = generate_steps(center, 4, 0.07);
        let a: Vec<_> = steps.clone().collect();
        let b: Vec<_> = steps.collect();
        assert_eq!(a, b);
        assert_eq!(a[0].alt, 0.0);
    }

    #[test]
    fn test_steps_exact_size() {
        let mut steps = generate_steps(Location::new(0.0, 0.0, 0.0), 3, 0.07);
        assert_eq!(steps.len(), 19);
        steps.next();
        assert_eq!(steps.len(), 18);
    }

    #[test]
    fn test_jitter_stays_in_disk() {
        let mut rng = StdRng::seed_from_u64(42);
        let origin = Location::new(45.0, 7.0, 40.0);
        for _ in 0..500 {
            let moved = jitter(origin, 10.0, &mut rng);
            assert!(origin.distance_to(&moved) <= 10.01);
            assert_eq!(moved.alt, 40.0);
        }
    }

    #[test]
    fn test_bounding_box_contains_center() {
        let center = Location::new(10.0, 10.0, 0.0);
        let bbox = BoundingBox::around(center, 1.0);
        assert!(bbox.contains(center.lat, center.lng));
        assert!(bbox.south < bbox.north);
        assert!(bbox.west < bbox.east);
        assert!(!bbox.contains(10.5, 10.0));
    }
}
