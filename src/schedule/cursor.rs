//! Time-of-hour arithmetic for the spawn-scan dispatch loop

use super::{SpawnPoint, HOUR_SECS};
use chrono::{DateTime, Timelike, Utc};

/// Seconds elapsed since the top of the current UTC hour
pub fn seconds_past_hour(now: DateTime<Utc>) -> f64 {
    f64::from(now.minute() * 60 + now.second())
}

/// Signed circular difference `a - b` folded into (-1800, 1800]
///
/// Positive when `a` is later than `b` within half an hour.
pub fn time_dif(a: f64, b: f64) -> f64 {
    let half = HOUR_SECS / 2.0;
    let mut dif = (a - b).rem_euclid(HOUR_SECS);
    if dif > half {
        dif -= HOUR_SECS;
    }
    dif
}

/// Index of the first entry with `time >= t` in a time-sorted schedule
///
/// Returns `schedule.len()` when every entry is earlier than `t`; callers
/// wrap that to the start of the next hour.
pub fn first_at_or_after(schedule: &[SpawnPoint], t: f64) -> usize {
    schedule.partition_point(|sp| sp.time < t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_seconds_past_hour() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 12, 34).unwrap();
        assert_eq!(seconds_past_hour(at), 754.0);
    }

    #[test]
    fn test_time_dif_basic() {
        assert_eq!(time_dif(100.0, 40.0), 60.0);
        assert_eq!(time_dif(40.0, 100.0), -60.0);
        assert_eq!(time_dif(10.0, 3590.0), 20.0);
        assert_eq!(time_dif(3590.0, 10.0), -20.0);
    }

    #[test]
    fn test_time_dif_boundary() {
        assert_eq!(time_dif(1800.0, 0.0), 1800.0);
        assert_eq!(time_dif(0.0, 1800.0), 1800.0);
        assert_eq!(time_dif(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_time_dif_range_and_antisymmetry() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5_000 {
            let a = rng.gen_range(0.0..HOUR_SECS);
            let b = rng.gen_range(0.0..HOUR_SECS);
            let ab = time_dif(a, b);
            let ba = time_dif(b, a);

            assert!(ab > -1800.0 && ab <= 1800.0, "time_dif({}, {}) = {}", a, b, ab);
            if ab != 1800.0 {
                assert!((ab + ba).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_first_at_or_after_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(3);
        for len in [0usize, 1, 2, 7, 50] {
            let mut schedule: Vec<SpawnPoint> = (0..len)
                .map(|_| SpawnPoint::new(0.0, 0.0, rng.gen_range(0..3600) as f64))
                .collect();
            schedule.sort_by(|a, b| a.time.total_cmp(&b.time));

            for _ in 0..200 {
                let t = rng.gen_range(-10.0..3610.0);
                let expected = schedule
                    .iter()
                    .position(|sp| sp.time >= t)
                    .unwrap_or(schedule.len());
                assert_eq!(first_at_or_after(&schedule, t), expected, "t = {}", t);
            }
        }
    }

    #[test]
    fn test_first_at_or_after_duplicates() {
        let schedule: Vec<_> = [10.0, 20.0, 20.0, 20.0, 30.0]
            .iter()
            .map(|&t| SpawnPoint::new(0.0, 0.0, t))
            .collect();
        assert_eq!(first_at_or_after(&schedule, 20.0), 1);
        assert_eq!(first_at_or_after(&schedule, 20.5), 4);
        assert_eq!(first_at_or_after(&schedule, 31.0), 5);
    }
}
