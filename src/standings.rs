//! Live standings at a race time
//!
//! Projects every rider's series onto the cursor and orders the field by the
//! distance covered so far. That order is the race position at the cursor.

use serde::Serialize;
use tracing::debug;

use crate::gap::{DistanceSource, EngineConfig};
use crate::models::{RiderId, RiderSeries};

/// One rider's state at the snapshot time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiderStanding<'a> {
    /// Raw telemetry this standing was projected from
    #[serde(skip)]
    pub rider: &'a RiderSeries,

    pub id: RiderId,
    pub name: &'a str,
    pub is_local_user: bool,

    /// Live rank at the snapshot time (1-based)
    pub rank: usize,

    /// Rank at acquisition time, kept as a display key
    pub acquired_position: u32,

    pub current_distance_km: f64,

    /// Fraction of the course covered; may exceed 1 transiently
    pub progress: f64,

    pub current_power: f64,
}

impl DistanceSource for RiderStanding<'_> {
    fn series(&self) -> &RiderSeries {
        self.rider
    }

    fn distance_km_at(&self, _time_seconds: f64) -> f64 {
        self.current_distance_km
    }
}

/// Field ordered by distance covered, leader first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceSnapshot<'a> {
    pub time_seconds: f64,
    pub total_distance_km: f64,
    pub standings: Vec<RiderStanding<'a>>,
}

impl<'a> RaceSnapshot<'a> {
    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.standings.len()
    }

    pub fn leader(&self) -> Option<&RiderStanding<'a>> {
        self.standings.first()
    }

    pub fn find(&self, id: RiderId) -> Option<&RiderStanding<'a>> {
        self.standings.iter().find(|s| s.id == id)
    }

    /// Live rank of a rider (1-based)
    pub fn rank_of(&self, id: RiderId) -> Option<usize> {
        self.find(id).map(|s| s.rank)
    }
}

/// Builds race snapshots from raw rider series
#[derive(Debug, Clone, Default)]
pub struct StandingsProjector {
    config: EngineConfig,
}

impl StandingsProjector {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Course length: the furthest recorded distance rounded up to a whole km,
    /// or the configured fallback when no rider recorded any distance
    pub fn total_distance_km(&self, riders: &[RiderSeries]) -> f64 {
        let furthest = riders
            .iter()
            .filter_map(RiderSeries::final_distance_km)
            .filter(|d| d.is_finite())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

        match furthest {
            Some(km) if km > 0.0 => km.ceil(),
            _ => self.config.fallback_distance_km,
        }
    }

    /// Distance a rider has covered at the given time
    ///
    /// Riders without distance telemetry are modelled at constant average
    /// speed over their whole effort.
    pub fn distance_at(&self, rider: &RiderSeries, time_seconds: f64, total_distance_km: f64) -> f64 {
        if rider.has_distance() {
            return rider.distance_at_index(rider.index_at(time_seconds));
        }

        let elapsed = rider.total_elapsed_seconds();
        if elapsed <= 0.0 {
            return 0.0;
        }
        (time_seconds.max(0.0) / elapsed) * total_distance_km
    }

    /// Project all riders onto `time_seconds` and order them by distance
    pub fn project<'a>(&self, riders: &'a [RiderSeries], time_seconds: f64) -> RaceSnapshot<'a> {
        let total_distance_km = self.total_distance_km(riders);

        let mut standings: Vec<RiderStanding<'a>> = riders
            .iter()
            .map(|rider| {
                let index = rider.index_at(time_seconds);
                let current_distance_km = self.distance_at(rider, time_seconds, total_distance_km);
                RiderStanding {
                    rider,
                    id: rider.id,
                    name: rider.name.as_str(),
                    is_local_user: rider.is_local_user,
                    rank: 0,
                    acquired_position: rider.position,
                    current_distance_km,
                    progress: current_distance_km / total_distance_km,
                    current_power: rider.power_at_index(index),
                }
            })
            .collect();

        // Stable: equal distances keep input order
        standings.sort_by(|a, b| b.current_distance_km.total_cmp(&a.current_distance_km));
        for (i, standing) in standings.iter_mut().enumerate() {
            standing.rank = i + 1;
        }

        debug!(
            riders = standings.len(),
            time_seconds,
            total_distance_km,
            "Projected standings"
        );

        RaceSnapshot {
            time_seconds,
            total_distance_km,
            standings,
        }
    }
}
