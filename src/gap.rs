//! Speed estimation and distance-to-time gap conversion
//!
//! Gaps are expressed as the time the trailing rider needs, at its current
//! pace, to reach the point the leading rider occupies now. Speed comes from
//! the trailing rider's last sample delta and is floored so that stopped or
//! noisy riders never produce unbounded gaps.

use serde::{Deserialize, Serialize};

use crate::models::RiderSeries;

/// Speed assumed at race start and for riders without distance telemetry
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Lowest speed an estimate may report
pub const MIN_SPEED_KMH: f64 = 10.0;

/// Race time before which the default speed is used
pub const SPEED_WARMUP_SECONDS: f64 = 3.0;

/// Largest gap between adjacent riders that keeps them in one group
pub const GROUP_GAP_THRESHOLD_SECONDS: i64 = 5;

/// Course length used when no rider has distance telemetry
pub const FALLBACK_DISTANCE_KM: f64 = 42.0;

/// Tunables for the standings, gap and group engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Gap threshold in seconds for splitting groups (default: 5)
    pub gap_threshold_seconds: i64,

    /// Default speed in km/h (default: 40)
    pub default_speed_kmh: f64,

    /// Speed floor in km/h (default: 10)
    pub min_speed_kmh: f64,

    /// Seconds of race time before speed is estimated from telemetry (default: 3)
    pub speed_warmup_seconds: f64,

    /// Course length fallback in km (default: 42)
    pub fallback_distance_km: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            gap_threshold_seconds: GROUP_GAP_THRESHOLD_SECONDS,
            default_speed_kmh: DEFAULT_SPEED_KMH,
            min_speed_kmh: MIN_SPEED_KMH,
            speed_warmup_seconds: SPEED_WARMUP_SECONDS,
            fallback_distance_km: FALLBACK_DISTANCE_KM,
        }
    }
}

/// Anything that can report a rider's distance at a race time
///
/// Implemented for raw series (sample lookup) and for snapshot standings
/// (already projected distance).
pub trait DistanceSource {
    /// Raw telemetry used for speed estimation
    fn series(&self) -> &RiderSeries;

    /// Distance in km at the given race time
    fn distance_km_at(&self, time_seconds: f64) -> f64;
}

impl DistanceSource for RiderSeries {
    fn series(&self) -> &RiderSeries {
        self
    }

    fn distance_km_at(&self, time_seconds: f64) -> f64 {
        self.distance_at_index(self.index_at(time_seconds))
    }
}

/// Converts distance gaps into time gaps
#[derive(Debug, Clone, Default)]
pub struct GapEstimator {
    config: EngineConfig,
}

impl GapEstimator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Estimate a rider's instantaneous speed from the one-sample-back delta
    pub fn estimate_speed_kmh(&self, rider: &RiderSeries, time_seconds: f64) -> f64 {
        if !rider.has_distance() || !(time_seconds >= self.config.speed_warmup_seconds) {
            return self.config.default_speed_kmh.max(self.config.min_speed_kmh);
        }

        let index = rider.index_at(time_seconds);
        let prev_index = index.saturating_sub(1);
        let delta_km = rider.distance_at_index(index) - rider.distance_at_index(prev_index);
        let kmh = (delta_km / rider.interval() as f64) * 3600.0;

        if kmh.is_finite() {
            kmh.max(self.config.min_speed_kmh)
        } else {
            self.config.min_speed_kmh
        }
    }

    /// Time in seconds the trailing rider needs to cover `distance_gap_km`
    pub fn gap_seconds_from_distance(
        &self,
        distance_gap_km: f64,
        trailing: &RiderSeries,
        time_seconds: f64,
    ) -> i64 {
        if !distance_gap_km.is_finite() {
            return 0;
        }
        let speed = self.estimate_speed_kmh(trailing, time_seconds);
        ((distance_gap_km / speed) * 3600.0).round() as i64
    }

    /// Time gap between a leading and a trailing rider; 0 at race start
    pub fn gap_seconds_between<L, T>(&self, lead: &L, trail: &T, time_seconds: f64) -> i64
    where
        L: DistanceSource + ?Sized,
        T: DistanceSource + ?Sized,
    {
        if time_seconds == 0.0 {
            return 0;
        }
        let distance_gap_km =
            lead.distance_km_at(time_seconds) - trail.distance_km_at(time_seconds);
        self.gap_seconds_from_distance(distance_gap_km, trail.series(), time_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiderId;

    fn rider(id: u64, distance: Vec<f64>) -> RiderSeries {
        RiderSeries::new(RiderId(id), format!("Rider {}", id), id as u32).with_distance(distance)
    }

    #[test]
    fn test_default_speed_without_distance() {
        let estimator = GapEstimator::default();
        let no_distance = RiderSeries::new(RiderId(1), "A", 1);
        assert_eq!(estimator.estimate_speed_kmh(&no_distance, 100.0), DEFAULT_SPEED_KMH);
    }

    #[test]
    fn test_default_speed_during_warmup() {
        let estimator = GapEstimator::default();
        let fast = rider(1, (0..10).map(|i| i as f64).collect());
        assert_eq!(estimator.estimate_speed_kmh(&fast, 2.9), DEFAULT_SPEED_KMH);
        assert_eq!(estimator.estimate_speed_kmh(&fast, 3.0), 3600.0);
    }

    #[test]
    fn test_speed_from_last_delta() {
        let estimator = GapEstimator::default();
        // 12.5 m per second = 45 km/h
        let steady = rider(1, (0..100).map(|i| i as f64 * 0.0125).collect());
        let speed = estimator.estimate_speed_kmh(&steady, 50.0);
        assert!((speed - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_respects_interval() {
        let estimator = GapEstimator::default();
        // 0.05 km per 5 s sample = 36 km/h
        let sampled = rider(1, (0..20).map(|i| i as f64 * 0.05).collect()).with_interval(5);
        let speed = estimator.estimate_speed_kmh(&sampled, 27.0);
        assert!((speed - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_floor_for_stopped_and_finished_riders() {
        let estimator = GapEstimator::default();
        let stopped = rider(1, vec![0.0; 20]);
        assert_eq!(estimator.estimate_speed_kmh(&stopped, 10.0), MIN_SPEED_KMH);

        let finished = rider(2, vec![0.0, 1.0, 2.0]);
        assert_eq!(estimator.estimate_speed_kmh(&finished, 100.0), MIN_SPEED_KMH);
    }

    #[test]
    fn test_gap_uses_trailing_rider_pace() {
        let estimator = GapEstimator::default();
        let lead: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let mut trail = vec![0.0];
        trail.extend((0..10).map(|i| i as f64));
        let a = rider(1, lead);
        let b = rider(2, trail);

        assert_eq!(estimator.gap_seconds_between(&a, &b, 10.0), 1);
    }

    #[test]
    fn test_gap_is_zero_at_race_start() {
        let estimator = GapEstimator::default();
        let a = rider(1, vec![5.0, 6.0]);
        let b = rider(2, vec![0.0, 1.0]);
        assert_eq!(estimator.gap_seconds_between(&a, &b, 0.0), 0);
    }

    #[test]
    fn test_gap_from_distance_rounding() {
        let estimator = GapEstimator::default();
        let no_distance = RiderSeries::new(RiderId(1), "A", 1);
        // 100 m at 40 km/h = 9 s
        assert_eq!(estimator.gap_seconds_from_distance(0.1, &no_distance, 60.0), 9);
        assert_eq!(estimator.gap_seconds_from_distance(f64::NAN, &no_distance, 60.0), 0);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_speed_never_below_floor(
            distance in proptest::collection::vec(-5.0f64..5.0, 0..50),
            time in 0.0f64..200.0,
            interval in 0u32..10
        ) {
            let estimator = GapEstimator::default();
            let series = rider(1, distance).with_interval(interval);
            let speed = estimator.estimate_speed_kmh(&series, time);
            prop_assert!(speed >= MIN_SPEED_KMH);
            prop_assert!(speed.is_finite());
        }

        #[test]
        fn test_gap_at_zero_is_zero(
            lead in proptest::collection::vec(0.0f64..100.0, 0..20),
            trail in proptest::collection::vec(0.0f64..100.0, 0..20)
        ) {
            let estimator = GapEstimator::default();
            prop_assert_eq!(estimator.gap_seconds_between(&rider(1, lead), &rider(2, trail), 0.0), 0);
        }
    }
}
