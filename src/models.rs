use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::{effective_interval, time_to_index};

/// Stable rider identity within a race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiderId(pub u64);

impl fmt::Display for RiderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RiderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(RiderId)
            .map_err(|_| format!("Invalid rider id: {}", s))
    }
}

fn default_sample_interval() -> u32 {
    1
}

/// Telemetry recorded for one rider over the whole race
///
/// Immutable once acquired; acquisition may replace it with a longer version
/// while the race is still being fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderSeries {
    /// Race rank at acquisition time (1-based), used as a lookup key only
    pub position: u32,

    /// Rider identity
    pub id: RiderId,

    /// Display name
    pub name: String,

    /// True for the rider whose perspective is shown by default
    #[serde(default)]
    pub is_local_user: bool,

    /// Number of samples collected
    pub duration_samples: u32,

    /// Real seconds represented by one sample
    #[serde(default = "default_sample_interval")]
    pub sample_interval_seconds: u32,

    /// Power in watts per sample
    #[serde(default)]
    pub power: Vec<f64>,

    /// Heart rate in bpm per sample
    #[serde(default)]
    pub heart_rate: Vec<f64>,

    /// Elevation in meters per sample
    #[serde(default)]
    pub elevation: Vec<f64>,

    /// Cumulative distance in kilometers per sample, non-decreasing
    #[serde(default)]
    pub distance: Vec<f64>,
}

impl RiderSeries {
    /// Create an empty series for a rider
    pub fn new(id: RiderId, name: impl Into<String>, position: u32) -> Self {
        Self {
            position,
            id,
            name: name.into(),
            is_local_user: false,
            duration_samples: 0,
            sample_interval_seconds: 1,
            power: Vec::new(),
            heart_rate: Vec::new(),
            elevation: Vec::new(),
            distance: Vec::new(),
        }
    }

    /// Builder-style distance series; also sets the duration when unset
    pub fn with_distance(mut self, distance: Vec<f64>) -> Self {
        if self.duration_samples == 0 {
            self.duration_samples = distance.len() as u32;
        }
        self.distance = distance;
        self
    }

    pub fn with_power(mut self, power: Vec<f64>) -> Self {
        self.power = power;
        self
    }

    pub fn with_interval(mut self, sample_interval_seconds: u32) -> Self {
        self.sample_interval_seconds = sample_interval_seconds;
        self
    }

    pub fn local_user(mut self) -> Self {
        self.is_local_user = true;
        self
    }

    /// Sample interval with the one-second default applied
    pub fn interval(&self) -> u32 {
        effective_interval(self.sample_interval_seconds)
    }

    pub fn has_distance(&self) -> bool {
        !self.distance.is_empty()
    }

    /// Total real elapsed time of this rider's effort
    pub fn total_elapsed_seconds(&self) -> f64 {
        self.duration_samples as f64 * self.interval() as f64
    }

    /// Sample index for a race time
    pub fn index_at(&self, time_seconds: f64) -> usize {
        time_to_index(time_seconds, self.interval())
    }

    /// Distance at a sample index, frozen at the last sample past the end.
    /// Riders without distance telemetry report 0.
    pub fn distance_at_index(&self, index: usize) -> f64 {
        match self.distance.last() {
            Some(&last) => self.distance.get(index).copied().unwrap_or(last),
            None => 0.0,
        }
    }

    /// Last recorded distance, if any distance telemetry exists
    pub fn final_distance_km(&self) -> Option<f64> {
        self.distance.last().copied()
    }

    pub fn power_at_index(&self, index: usize) -> f64 {
        sample_or_zero(&self.power, index)
    }

    pub fn heart_rate_at_index(&self, index: usize) -> f64 {
        sample_or_zero(&self.heart_rate, index)
    }

    pub fn elevation_at_index(&self, index: usize) -> f64 {
        sample_or_zero(&self.elevation, index)
    }
}

fn sample_or_zero(samples: &[f64], index: usize) -> f64 {
    samples.get(index).copied().unwrap_or(0.0)
}

/// Acquisition progress counters supplied while a race is still being fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionProgress {
    /// Riders fetched so far
    pub fetched: u32,

    /// Riders expected in total
    pub total: u32,
}

/// Completeness of the race data backing a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DataStatus {
    /// No rider data at all; renderers show a placeholder
    Empty,
    /// Acquisition still running; views cover the riders fetched so far
    Partial { fetched: u32, total: u32 },
    /// All riders acquired
    Complete,
}

/// A race as handed over by the acquisition/persistence collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    /// Event identifier
    pub event_id: String,

    /// Event display name
    pub event_name: String,

    /// Rider telemetry acquired so far
    #[serde(default)]
    pub riders: Vec<RiderSeries>,

    /// True while acquisition is still populating the record
    #[serde(default)]
    pub in_progress: bool,

    /// Optional fetch counters
    #[serde(default)]
    pub progress: Option<AcquisitionProgress>,

    /// When the record was last updated by acquisition
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RaceRecord {
    pub fn new(event_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_name: event_name.into(),
            riders: Vec::new(),
            in_progress: false,
            progress: None,
            updated_at: None,
        }
    }

    pub fn with_riders(mut self, riders: Vec<RiderSeries>) -> Self {
        self.riders = riders;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.riders.is_empty()
    }

    pub fn rider(&self, id: RiderId) -> Option<&RiderSeries> {
        self.riders.iter().find(|r| r.id == id)
    }

    /// The locally tracked rider, if acquisition flagged one
    pub fn local_user(&self) -> Option<&RiderSeries> {
        self.riders.iter().find(|r| r.is_local_user)
    }

    /// Longest elapsed time over all riders; the playback upper bound
    pub fn max_time_seconds(&self) -> f64 {
        self.riders
            .iter()
            .map(RiderSeries::total_elapsed_seconds)
            .fold(0.0, f64::max)
    }

    /// Insert a rider or replace the existing series with the same identity
    pub fn upsert_rider(&mut self, series: RiderSeries) {
        match self.riders.iter_mut().find(|r| r.id == series.id) {
            Some(existing) => *existing = series,
            None => self.riders.push(series),
        }
        self.updated_at = Some(Utc::now());
    }

    pub fn data_status(&self) -> DataStatus {
        if self.riders.is_empty() {
            return DataStatus::Empty;
        }
        if self.in_progress {
            let fetched = self.riders.len() as u32;
            let (fetched, total) = match self.progress {
                Some(p) => (p.fetched.max(fetched), p.total.max(fetched)),
                None => (fetched, fetched),
            };
            return DataStatus::Partial { fetched, total };
        }
        DataStatus::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_freezes_at_finish() {
        let rider = RiderSeries::new(RiderId(1), "A", 1).with_distance(vec![0.0, 0.5, 1.0]);
        assert_eq!(rider.distance_at_index(1), 0.5);
        assert_eq!(rider.distance_at_index(10), 1.0);
        assert_eq!(rider.final_distance_km(), Some(1.0));
    }

    #[test]
    fn test_missing_samples_default_to_zero() {
        let rider = RiderSeries::new(RiderId(1), "A", 1)
            .with_distance(vec![0.0, 0.5, 1.0])
            .with_power(vec![200.0]);
        assert_eq!(rider.power_at_index(0), 200.0);
        assert_eq!(rider.power_at_index(2), 0.0);
        assert_eq!(rider.heart_rate_at_index(0), 0.0);
        assert_eq!(RiderSeries::new(RiderId(2), "B", 2).distance_at_index(3), 0.0);
    }

    #[test]
    fn test_max_time_and_upsert() {
        let mut race = RaceRecord::new("evt", "Test Race");
        assert_eq!(race.max_time_seconds(), 0.0);
        assert_eq!(race.data_status(), DataStatus::Empty);

        race.upsert_rider(
            RiderSeries::new(RiderId(1), "A", 1)
                .with_distance(vec![0.0; 10])
                .with_interval(5),
        );
        race.upsert_rider(RiderSeries::new(RiderId(2), "B", 2).with_distance(vec![0.0; 30]));
        assert_eq!(race.max_time_seconds(), 50.0);

        race.upsert_rider(RiderSeries::new(RiderId(2), "B", 2).with_distance(vec![0.0; 80]));
        assert_eq!(race.riders.len(), 2);
        assert_eq!(race.max_time_seconds(), 80.0);
    }

    #[test]
    fn test_data_status_partial() {
        let mut race = RaceRecord::new("evt", "Test Race");
        race.in_progress = true;
        race.progress = Some(AcquisitionProgress { fetched: 1, total: 40 });
        race.upsert_rider(RiderSeries::new(RiderId(1), "A", 1));
        assert_eq!(race.data_status(), DataStatus::Partial { fetched: 1, total: 40 });

        race.in_progress = false;
        assert_eq!(race.data_status(), DataStatus::Complete);
    }

    #[test]
    fn test_rider_series_json_defaults() {
        let json = r#"{"position":3,"id":42,"name":"Rider","duration_samples":2,"distance":[0.0,0.01]}"#;
        let rider: RiderSeries = serde_json::from_str(json).unwrap();
        assert_eq!(rider.id, RiderId(42));
        assert_eq!(rider.sample_interval_seconds, 1);
        assert!(!rider.is_local_user);
        assert!(rider.power.is_empty());
    }
}
