//! Course elevation profile
//!
//! Built from the rider with the most distance telemetry, so the profile
//! covers as much of the course as any rider recorded.

use serde::Serialize;

use crate::models::RiderSeries;
use crate::units::{clamp, lerp};

/// Elevation against distance, ordered by distance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationProfile {
    /// `(distance km, elevation m)` points
    pub points: Vec<(f64, f64)>,
}

impl ElevationProfile {
    /// Profile from the rider that recorded the furthest distance.
    /// Returns `None` when no rider has both distance and elevation data.
    pub fn from_riders(riders: &[RiderSeries]) -> Option<Self> {
        let source = riders
            .iter()
            .filter(|r| r.has_distance() && !r.elevation.is_empty())
            .max_by(|a, b| {
                let da = a.final_distance_km().unwrap_or(0.0);
                let db = b.final_distance_km().unwrap_or(0.0);
                da.total_cmp(&db)
            })?;

        let count = source.distance.len().min(source.elevation.len());
        let mut points: Vec<(f64, f64)> = Vec::with_capacity(count);
        for i in 0..count {
            let km = source.distance[i];
            // Collapse stationary samples to one point per distance
            match points.last_mut() {
                Some(last) if last.0 == km => last.1 = source.elevation[i],
                _ => points.push((km, source.elevation[i])),
            }
        }
        Some(Self { points })
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Elevation at a distance, linearly interpolated and held flat past either end
    pub fn elevation_at(&self, km: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if km <= first.0 {
            return first.1;
        }
        if km >= last.0 {
            return last.1;
        }

        let upper = self.points.partition_point(|p| p.0 <= km);
        let (d0, e0) = self.points[upper - 1];
        let (d1, e1) = self.points[upper];
        let t = clamp((km - d0) / (d1 - d0), 0.0, 1.0);
        lerp(e0, e1, t)
    }

    /// Total climbing in meters
    pub fn elevation_gain(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].1 - w[0].1).max(0.0))
            .sum()
    }
}
