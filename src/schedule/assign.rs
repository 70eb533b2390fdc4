//! Spawn point assignment
//!
//! Greedy online bin-packing of spawn points onto per-worker circular
//! queues. Points are taken in ascending time order; each one goes to the
//! worker whose queue absorbs it at the lowest [`InsertionCost`]:
//!
//! ```text
//!   worker queue (circular over the hour)
//!
//!   ... pred ──s1──▶ P ──s2──▶ succ ...
//!
//!   s1 = dist(pred, P) / elapsed     approach speed
//!   s2 = dist(P, succ) / elapsed     departure speed
//! ```
//!
//! If only the approach is too fast, the scan of `P` may be pushed later
//! ("wiggled") until the worker can get there at `max_speed`, as long as
//! the push stays within `max_delay` and leaves room before `succ`.
//! Points no worker can absorb are rejected.

use super::{circular_gap, SpawnPoint, HOUR_SECS};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Tuning for the assigner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignParams {
    /// Number of worker queues
    pub workers: usize,

    /// Minimum seconds between two scans by one worker
    pub scan_delay: f64,

    /// Maximum virtual travel speed between consecutive scans (m/s)
    pub max_speed: f64,

    /// Maximum seconds a scan may be pushed past its spawn time
    pub max_delay: f64,
}

/// Cost of inserting a point into one worker queue
///
/// Compared lexicographically: delay first, then peak speed, then the
/// approach and departure speeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsertionCost {
    /// Seconds the scan is pushed back (infinite when infeasible)
    pub delay: f64,

    /// max(approach, departure)
    pub peak_speed: f64,

    /// Speed needed to reach the point from its predecessor
    pub approach_speed: f64,

    /// Speed needed to reach the successor from the point
    pub departure_speed: f64,
}

impl InsertionCost {
    /// Cost of a placement that cannot be made
    pub const INFEASIBLE: InsertionCost = InsertionCost {
        delay: f64::INFINITY,
        peak_speed: 0.0,
        approach_speed: 0.0,
        departure_speed: 0.0,
    };

    fn new(delay: f64, approach_speed: f64, departure_speed: f64) -> Self {
        Self {
            delay,
            peak_speed: approach_speed.max(departure_speed),
            approach_speed,
            departure_speed,
        }
    }

    /// Whether the point can be placed at all
    pub fn is_feasible(&self) -> bool {
        self.delay.is_finite()
    }

    /// Lexicographic ordering over (delay, peak, approach, departure)
    pub fn compare(&self, other: &InsertionCost) -> Ordering {
        self.delay
            .total_cmp(&other.delay)
            .then(self.peak_speed.total_cmp(&other.peak_speed))
            .then(self.approach_speed.total_cmp(&other.approach_speed))
            .then(self.departure_speed.total_cmp(&other.departure_speed))
    }
}

/// Where and when a point would land in a queue
#[derive(Debug, Clone, Copy)]
struct Placement {
    cost: InsertionCost,
    point: SpawnPoint,
}

/// One worker's schedule, kept sorted by time
#[derive(Debug, Clone, Default)]
struct WorkerQueue {
    points: Vec<SpawnPoint>,
}

impl WorkerQueue {
    /// Dry-run insertion of `sp`; the queue is not modified
    fn evaluate(&self, sp: &SpawnPoint, params: &AssignParams) -> Placement {
        if self.points.is_empty() {
            return Placement {
                cost: InsertionCost::new(0.0, params.max_speed, params.max_speed),
                point: *sp,
            };
        }

        let len = self.points.len();
        let k = self.points.partition_point(|q| q.time <= sp.time);
        let i = (k + len - 1) % len;
        let j = k % len;
        let pred = self.points[i];
        let succ = self.points[j];

        let speed = |from: &SpawnPoint, to: &SpawnPoint| {
            let elapsed = circular_gap(from.time, to.time).max(params.scan_delay);
            if elapsed == 0.0 {
                f64::INFINITY
            } else {
                from.distance_to(to) / elapsed
            }
        };

        if i != j && circular_gap(pred.time, succ.time) < 2.0 * params.scan_delay {
            return Placement {
                cost: InsertionCost::INFEASIBLE,
                point: *sp,
            };
        }

        // Scan no sooner than scan_delay after the predecessor
        let mut point = *sp;
        let since_pred = circular_gap(pred.time, point.time);
        if since_pred < params.scan_delay {
            point.time += params.scan_delay - since_pred;
        }

        let room = circular_gap(point.time, succ.time) - params.scan_delay;
        if room < 0.0 {
            return Placement {
                cost: InsertionCost::INFEASIBLE,
                point: *sp,
            };
        }

        let s1 = speed(&pred, &point);
        let s2 = speed(&point, &succ);

        let cost = if s1 <= params.max_speed && s2 <= params.max_speed {
            InsertionCost::new(0.0, s1, s2)
        } else if s2 > params.max_speed {
            InsertionCost::INFEASIBLE
        } else {
            // Wait until the predecessor can reach the point at max_speed
            let time_to_wait =
                pred.distance_to(&point) / params.max_speed - circular_gap(pred.time, point.time);
            if time_to_wait > room {
                InsertionCost::INFEASIBLE
            } else {
                point.time += time_to_wait;
                let s2 = speed(&point, &succ);
                InsertionCost {
                    delay: time_to_wait,
                    peak_speed: params.max_speed.max(s2),
                    approach_speed: params.max_speed,
                    departure_speed: s2,
                }
            }
        };

        Placement { cost, point }
    }

    /// Commit a placement produced by `evaluate`
    fn insert(&mut self, placement: Placement) {
        let mut point = placement.point;
        point.time = point.time.rem_euclid(HOUR_SECS);
        let at = self.points.partition_point(|q| q.time <= point.time);
        self.points.insert(at, point);
    }

    /// Max and mean travel speed around the queue (m/s)
    fn speeds(&self, scan_delay: f64) -> Option<(f64, f64)> {
        let len = self.points.len();
        if len < 2 {
            return None;
        }
        let speeds: Vec<f64> = (0..len)
            .map(|i| {
                let a = &self.points[i];
                let b = &self.points[(i + 1) % len];
                let elapsed = circular_gap(a.time, b.time).max(scan_delay);
                if elapsed == 0.0 {
                    f64::INFINITY
                } else {
                    a.distance_to(b) / elapsed
                }
            })
            .collect();
        let max = speeds.iter().copied().fold(0.0, f64::max);
        let avg = speeds.iter().sum::<f64>() / len as f64;
        Some((max, avg))
    }
}

/// Result of assigning a set of spawn points to workers
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    /// Every scheduled point, tagged with its worker, sorted by time
    pub schedule: Vec<SpawnPoint>,

    /// Points no worker could take within `max_delay`
    pub rejected: Vec<SpawnPoint>,

    /// Non-zero delays that were applied
    pub delays: Vec<f64>,

    /// Number of points per worker
    pub queue_sizes: Vec<usize>,
}

impl Assignment {
    /// Mean of the applied delays
    pub fn average_delay(&self) -> Option<f64> {
        if self.delays.is_empty() {
            None
        } else {
            Some(self.delays.iter().sum::<f64>() / self.delays.len() as f64)
        }
    }

    /// Largest applied delay
    pub fn max_delay(&self) -> Option<f64> {
        self.delays.iter().copied().reduce(f64::max)
    }

    /// Points scheduled for one worker, in time order
    pub fn worker_schedule(&self, worker: usize) -> impl Iterator<Item = &SpawnPoint> {
        self.schedule.iter().filter(move |sp| sp.worker == Some(worker))
    }
}

/// Assign spawn points to `params.workers` workers
///
/// Every input point ends up either in `schedule` (possibly with a later
/// time) or in `rejected`.
pub fn assign_spawns(mut spawns: Vec<SpawnPoint>, params: &AssignParams) -> Assignment {
    info!(
        spawns = spawns.len(),
        workers = params.workers,
        "Assigning spawn points to workers"
    );

    spawns.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut queues = vec![WorkerQueue::default(); params.workers];
    let mut delays = Vec::new();
    let mut rejected = Vec::new();

    for sp in spawns {
        let mut best: Option<(usize, Placement)> = None;
        for (index, queue) in queues.iter().enumerate() {
            let placement = queue.evaluate(&sp, params);
            let better = match &best {
                Some((_, current)) => placement.cost.compare(&current.cost) == Ordering::Less,
                None => true,
            };
            if better {
                best = Some((index, placement));
            }
        }

        match best {
            Some((index, placement))
                if placement.cost.is_feasible() && placement.cost.delay <= params.max_delay =>
            {
                if placement.cost.delay > 0.0 {
                    delays.push(placement.cost.delay);
                }
                queues[index].insert(placement);
            }
            _ => rejected.push(sp),
        }
    }

    let queue_sizes: Vec<usize> = queues.iter().map(|q| q.points.len()).collect();
    for (index, queue) in queues.iter().enumerate() {
        if let Some((max, avg)) = queue.speeds(params.scan_delay) {
            debug!(worker = index, max_speed = max, avg_speed = avg, "Worker travel speeds");
        }
    }

    let mut schedule: Vec<SpawnPoint> = queues
        .into_iter()
        .enumerate()
        .flat_map(|(index, queue)| {
            queue.points.into_iter().map(move |mut sp| {
                sp.worker = Some(index);
                sp
            })
        })
        .collect();
    schedule.sort_by(|a, b| a.time.total_cmp(&b.time));

    let assignment = Assignment {
        schedule,
        rejected,
        delays,
        queue_sizes,
    };
    log_assignment(&assignment, params);
    assignment
}

fn log_assignment(assignment: &Assignment, params: &AssignParams) {
    info!(
        assigned = assignment.schedule.len(),
        workers = params.workers,
        left_out = assignment.rejected.len(),
        "Spawn assignment complete"
    );
    if !assignment.rejected.is_empty() {
        info!(
            dropped = assignment.rejected.len(),
            "Cannot schedule some spawn points under max_delay, dropping"
        );
    }
    info!(sizes = ?assignment.queue_sizes, "Job queue sizes");

    match (assignment.average_delay(), assignment.max_delay()) {
        (Some(avg), Some(max)) => {
            info!(
                count = assignment.delays.len(),
                average_secs = avg,
                max_secs = max,
                "Scan delays applied"
            );
            if max > 60.0 {
                info!("Cannot assign spawn points with delay under a minute; add accounts or drop spawn points");
            }
        }
        _ => info!("No additional delay is added to any spawn point"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn params(workers: usize, scan_delay: f64, max_speed: f64, max_delay: f64) -> AssignParams {
        AssignParams {
            workers,
            scan_delay,
            max_speed,
            max_delay,
        }
    }

    fn random_spawns(rng: &mut StdRng, count: usize, spread_deg: f64) -> Vec<SpawnPoint> {
        (0..count)
            .map(|_| {
                SpawnPoint::new(
                    40.0 + rng.gen_range(0.0..spread_deg),
                    -74.0 + rng.gen_range(0.0..spread_deg),
                    rng.gen_range(0..3600) as f64,
                )
            })
            .collect()
    }

    fn assert_gaps(assignment: &Assignment, workers: usize, scan_delay: f64) {
        for w in 0..workers {
            let times: Vec<f64> = assignment.worker_schedule(w).map(|sp| sp.time).collect();
            if times.len() < 2 {
                continue;
            }
            for (i, t) in times.iter().enumerate() {
                let next = times[(i + 1) % times.len()];
                let gap = circular_gap(*t, next);
                assert!(
                    gap >= scan_delay - 1e-6,
                    "worker {} has gap {} < {} between {} and {}",
                    w,
                    gap,
                    scan_delay,
                    t,
                    next
                );
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let assignment = assign_spawns(Vec::new(), &params(3, 10.0, 10.0, 60.0));
        assert!(assignment.schedule.is_empty());
        assert!(assignment.rejected.is_empty());
        assert_eq!(assignment.queue_sizes, vec![0, 0, 0]);
    }

    #[test]
    fn test_single_point_goes_to_first_worker() {
        let sp = SpawnPoint::new(1.0, 1.0, 500.0);
        let assignment = assign_spawns(vec![sp], &params(4, 10.0, 10.0, 60.0));
        assert_eq!(assignment.schedule.len(), 1);
        assert_eq!(assignment.schedule[0].worker, Some(0));
        assert_eq!(assignment.schedule[0].time, 500.0);
        assert!(assignment.delays.is_empty());
    }

    #[test]
    fn test_unbounded_speed_accepts_everything() {
        let mut rng = StdRng::seed_from_u64(5);
        let spawns = random_spawns(&mut rng, 300, 2.0);
        let assignment = assign_spawns(spawns, &params(2, 0.0, f64::INFINITY, 0.0));

        assert_eq!(assignment.schedule.len(), 300);
        assert!(assignment.rejected.is_empty());
        assert!(assignment.delays.is_empty());
    }

    #[test]
    fn test_partition_is_exact() {
        let mut rng = StdRng::seed_from_u64(9);
        let spawns = random_spawns(&mut rng, 400, 0.05);
        let assignment = assign_spawns(spawns.clone(), &params(3, 10.0, 5.0, 30.0));

        assert_eq!(assignment.schedule.len() + assignment.rejected.len(), spawns.len());
        assert_eq!(assignment.queue_sizes.iter().sum::<usize>(), assignment.schedule.len());

        // Every input location appears exactly once across both outputs
        let mut seen: Vec<(u64, u64)> = assignment
            .schedule
            .iter()
            .chain(assignment.rejected.iter())
            .map(|sp| (sp.lat.to_bits(), sp.lng.to_bits()))
            .collect();
        let mut expected: Vec<(u64, u64)> = spawns
            .iter()
            .map(|sp| (sp.lat.to_bits(), sp.lng.to_bits()))
            .collect();
        seen.sort_unstable();
        expected.sort_unstable();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_scan_delay_respected_per_worker() {
        let mut rng = StdRng::seed_from_u64(21);
        for workers in 1..=4 {
            let spawns = random_spawns(&mut rng, 250, 0.03);
            let assignment = assign_spawns(spawns, &params(workers, 15.0, 8.0, 60.0));
            assert_gaps(&assignment, workers, 15.0);
        }
    }

    #[test]
    fn test_schedule_sorted_and_in_hour() {
        let mut rng = StdRng::seed_from_u64(2);
        let spawns = random_spawns(&mut rng, 200, 0.02);
        let assignment = assign_spawns(spawns, &params(2, 30.0, 20.0, 120.0));

        for pair in assignment.schedule.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
        for sp in &assignment.schedule {
            assert!(sp.time >= 0.0 && sp.time < HOUR_SECS);
            assert!(sp.worker.is_some());
        }
    }

    #[test]
    fn test_late_point_wraps_into_hour() {
        // Second point collides with the first near the end of the hour and
        // gets pushed past the top of the hour
        let a = SpawnPoint::new(0.0, 0.0, 3595.0);
        let b = SpawnPoint::new(0.0, 0.0, 3596.0);
        let assignment = assign_spawns(vec![a, b], &params(1, 10.0, 10.0, 60.0));

        assert_eq!(assignment.schedule.len(), 2);
        assert_eq!(assignment.schedule[0].time, 5.0);
        assert_eq!(assignment.schedule[1].time, 3595.0);
    }

    #[test]
    fn test_duplicate_times_need_separate_workers() {
        let a = SpawnPoint::new(0.0, 0.0, 100.0);
        let b = SpawnPoint::new(0.001, 0.0, 100.0);

        let one = assign_spawns(vec![a, b], &params(1, 0.0, 10.0, 0.0));
        assert_eq!(one.schedule.len(), 1);
        assert_eq!(one.rejected.len(), 1);

        let two = assign_spawns(vec![a, b], &params(2, 0.0, 10.0, 0.0));
        assert_eq!(two.schedule.len(), 2);
        assert_eq!(two.queue_sizes, vec![1, 1]);
    }

    #[test]
    fn test_wiggle_delays_fast_approach() {
        // 1 km apart, 20 s apart, max 10 m/s: needs 100 s of travel
        let a = SpawnPoint::new(0.0, 0.0, 0.0);
        let b = SpawnPoint::new(0.0, 0.008_983, 20.0);
        let assignment = assign_spawns(vec![a, b], &params(1, 10.0, 10.0, 120.0));

        assert_eq!(assignment.schedule.len(), 2);
        assert_eq!(assignment.delays.len(), 1);
        let delay = assignment.delays[0];
        assert!((delay - 80.0).abs() < 1.0, "delay {}", delay);
        assert!((assignment.schedule[1].time - 100.0).abs() < 1.0);

        let strict = assign_spawns(vec![a, b], &params(1, 10.0, 10.0, 30.0));
        assert_eq!(strict.rejected.len(), 1);
    }

    #[test]
    fn test_cost_ordering() {
        let cheap = InsertionCost::new(0.0, 1.0, 2.0);
        let pricey = InsertionCost::new(0.0, 3.0, 1.0);
        let delayed = InsertionCost::new(5.0, 0.0, 0.0);

        assert_eq!(cheap.compare(&pricey), Ordering::Less);
        assert_eq!(pricey.compare(&delayed), Ordering::Less);
        assert_eq!(delayed.compare(&InsertionCost::INFEASIBLE), Ordering::Less);
        assert!(!InsertionCost::INFEASIBLE.is_feasible());
    }
}
