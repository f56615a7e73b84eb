//! Dynamic group (pack) detection
//!
//! Walks the distance-ordered standings and opens a new group wherever the
//! time gap between two adjacent riders exceeds the threshold. Only adjacent
//! pairs are compared, so a chain of small gaps keeps riders together even
//! when the chain as a whole is spread out.

use serde::Serialize;
use tracing::debug;

use crate::gap::GapEstimator;
use crate::models::RiderId;
use crate::standings::{RaceSnapshot, RiderStanding};

/// A contiguous run of riders within the gap threshold of each other
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group<'a> {
    /// 0 for the lead group
    pub index: usize,

    /// "Lead Group" or "Group N"
    pub name: String,

    /// Members in standings order
    pub members: Vec<RiderStanding<'a>>,

    /// Mean member power, rounded
    pub average_power: i64,

    /// Time gap from the race leader to this group's first member
    pub gap_to_leader_seconds: i64,

    /// True if the watched rider rides in this group
    pub contains_watched: bool,
}

impl<'a> Group<'a> {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn first_member(&self) -> Option<&RiderStanding<'a>> {
        self.members.first()
    }

    pub fn last_member(&self) -> Option<&RiderStanding<'a>> {
        self.members.last()
    }

    pub fn contains(&self, id: RiderId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }
}

/// Display name for a group index
pub fn group_name(index: usize) -> String {
    if index == 0 {
        "Lead Group".to_string()
    } else {
        format!("Group {}", index + 1)
    }
}

/// Partitions snapshots into groups
#[derive(Debug, Clone, Default)]
pub struct GroupDetector {
    estimator: GapEstimator,
}

impl GroupDetector {
    pub fn new(estimator: GapEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &GapEstimator {
        &self.estimator
    }

    /// Split a snapshot into groups.
    ///
    /// `watched` marks which group holds the rider the viewer follows.
    pub fn detect<'a>(&self, snapshot: &RaceSnapshot<'a>, watched: Option<RiderId>) -> Vec<Group<'a>> {
        let time_seconds = snapshot.time_seconds;
        let threshold = self.estimator.config().gap_threshold_seconds;

        let mut runs: Vec<Vec<RiderStanding<'a>>> = Vec::new();
        let mut current: Vec<RiderStanding<'a>> = Vec::new();

        for standing in &snapshot.standings {
            if let Some(previous) = current.last() {
                let distance_gap_km = previous.current_distance_km - standing.current_distance_km;
                let gap = self
                    .estimator
                    .gap_seconds_from_distance(distance_gap_km, standing.rider, time_seconds);
                if gap > threshold {
                    runs.push(std::mem::take(&mut current));
                }
            }
            current.push(standing.clone());
        }
        if !current.is_empty() {
            runs.push(current);
        }

        let leader = snapshot.leader();
        let groups: Vec<Group<'a>> = runs
            .into_iter()
            .enumerate()
            .map(|(index, members)| {
                let gap_to_leader_seconds = match (index, leader, members.first()) {
                    (0, _, _) => 0,
                    (_, Some(leader), Some(first)) => {
                        self.estimator.gap_seconds_between(leader, first, time_seconds)
                    }
                    _ => 0,
                };
                Group {
                    index,
                    name: group_name(index),
                    average_power: average_power(&members),
                    gap_to_leader_seconds,
                    contains_watched: watched.is_some_and(|id| members.iter().any(|m| m.id == id)),
                    members,
                }
            })
            .collect();

        debug!(
            groups = groups.len(),
            riders = snapshot.len(),
            time_seconds,
            "Detected groups"
        );

        groups
    }
}

fn average_power(members: &[RiderStanding<'_>]) -> i64 {
    if members.is_empty() {
        return 0;
    }
    let total: f64 = members.iter().map(|m| m.current_power).sum();
    (total / members.len() as f64).round() as i64
}

/// Index of the group containing a rider
pub fn group_of(groups: &[Group<'_>], id: RiderId) -> Option<usize> {
    groups.iter().position(|g| g.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiderSeries;
    use crate::standings::StandingsProjector;

    /// Rider riding at a constant 36 km/h (0.01 km/s) offset by `head_start_km`
    fn steady_rider(id: u64, head_start_km: f64, power: f64) -> RiderSeries {
        let distance = (0..120).map(|i| head_start_km + i as f64 * 0.01).collect();
        RiderSeries::new(RiderId(id), format!("Rider {}", id), id as u32)
            .with_distance(distance)
            .with_power(vec![power; 120])
    }

    fn detect(riders: &[RiderSeries], time: f64, watched: Option<RiderId>) -> Vec<Group<'_>> {
        let snapshot = StandingsProjector::default().project(riders, time);
        GroupDetector::default().detect(&snapshot, watched)
    }

    #[test]
    fn test_empty_standings() {
        assert!(detect(&[], 10.0, None).is_empty());
    }

    #[test]
    fn test_single_rider_is_lead_group() {
        let riders = vec![steady_rider(1, 0.0, 200.0)];
        let groups = detect(&riders, 60.0, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Lead Group");
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[0].gap_to_leader_seconds, 0);
    }

    #[test]
    fn test_splits_on_threshold() {
        // At 36 km/h: 0.04 km = 4 s, 0.2 km = 20 s
        let riders = vec![
            steady_rider(1, 0.24, 300.0),
            steady_rider(2, 0.20, 200.0),
            steady_rider(3, 0.0, 250.0),
        ];
        let groups = detect(&riders, 60.0, Some(RiderId(3)));

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Lead Group");
        assert_eq!(groups[1].name, "Group 2");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].average_power, 250);
        assert!(!groups[0].contains_watched);
        assert!(groups[1].contains_watched);
        assert_eq!(groups[1].gap_to_leader_seconds, 24);
        assert_eq!(group_of(&groups, RiderId(2)), Some(0));
    }

    #[test]
    fn test_exact_threshold_stays_together() {
        // 0.05 km at 36 km/h is exactly 5 s
        let riders = vec![steady_rider(1, 0.05, 200.0), steady_rider(2, 0.0, 200.0)];
        assert_eq!(detect(&riders, 60.0, None).len(), 1);
    }

    #[test]
    fn test_adjacent_chain_merges() {
        // Each adjacent gap is 4 s; first to last is 16 s
        let riders: Vec<RiderSeries> = (0..5)
            .map(|i| steady_rider(i + 1, 0.16 - i as f64 * 0.04, 200.0))
            .collect();
        let groups = detect(&riders, 60.0, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 5);
    }

    #[test]
    fn test_average_power_rounds() {
        let riders = vec![steady_rider(1, 0.01, 201.0), steady_rider(2, 0.0, 202.0)];
        assert_eq!(detect(&riders, 60.0, None)[0].average_power, 202);
    }

    #[test]
    fn test_group_names() {
        assert_eq!(group_name(0), "Lead Group");
        assert_eq!(group_name(1), "Group 2");
        assert_eq!(group_name(9), "Group 10");
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_groups_partition_standings(
            offsets in proptest::collection::vec(0.0f64..2.0, 1..40),
            time in 0.0f64..119.0
        ) {
            let riders: Vec<RiderSeries> = offsets
                .iter()
                .enumerate()
                .map(|(i, &offset)| steady_rider(i as u64 + 1, offset, 200.0))
                .collect();
            let snapshot = StandingsProjector::default().project(&riders, time);
            let groups = GroupDetector::default().detect(&snapshot, None);

            let total: usize = groups.iter().map(|g| g.len()).sum();
            prop_assert_eq!(total, riders.len());

            let flattened: Vec<RiderId> = groups
                .iter()
                .flat_map(|g| g.members.iter().map(|m| m.id))
                .collect();
            let ordered: Vec<RiderId> = snapshot.standings.iter().map(|s| s.id).collect();
            prop_assert_eq!(flattened, ordered);

            for (i, group) in groups.iter().enumerate() {
                prop_assert_eq!(group.index, i);
                prop_assert!(!group.is_empty());
            }
        }
    }
}
