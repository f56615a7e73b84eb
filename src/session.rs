//! Replay session state and the derived view handed to renderers
//!
//! `PlaybackSession` owns everything the viewer can change: the clock, the
//! watched rider, the compare target and which groups are expanded. Derived
//! state (snapshot, groups, gaps) is recomputed from the race record on every
//! call to [`PlaybackSession::view`] and never cached.

use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::gap::{EngineConfig, GapEstimator};
use crate::groups::{group_of, Group, GroupDetector};
use crate::models::{DataStatus, RaceRecord, RiderId, RiderSeries};
use crate::playback::{PlaybackClock, PlaybackSpeed, PlaybackState, TickOutcome};
use crate::standings::{RaceSnapshot, RiderStanding, StandingsProjector};
use crate::units::format_optional_gap;

/// What the watched rider is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum CompareTarget {
    #[default]
    None,
    Rider(RiderId),
    Group(usize),
}

/// Viewer commands, as produced by UI event handlers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Toggle,
    Reset,
    Scrub(f64),
    SetSpeed(PlaybackSpeed),
    Faster,
    Slower,
    Watch(RiderId),
    CompareRider(RiderId),
    CompareGroup(usize),
    ClearCompare,
    ToggleGroup(usize),
}

/// Telemetry channel plotted in chart series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Power,
    HeartRate,
    Elevation,
    Distance,
}

impl Metric {
    fn sample(&self, rider: &RiderSeries, index: usize) -> f64 {
        match self {
            Metric::Power => rider.power_at_index(index),
            Metric::HeartRate => rider.heart_rate_at_index(index),
            Metric::Elevation => rider.elevation_at_index(index),
            Metric::Distance => rider.distance_at_index(index),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "power" | "watts" => Ok(Metric::Power),
            "heart_rate" | "heartrate" | "hr" => Ok(Metric::HeartRate),
            "elevation" | "altitude" => Ok(Metric::Elevation),
            "distance" => Ok(Metric::Distance),
            _ => Err(format!("Invalid metric: {}", s)),
        }
    }
}

/// One line of a chart: `(race seconds, value)` points up to the cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub metric: Metric,
    pub source: CompareTarget,
    pub points: Vec<(f64, f64)>,
}

/// Gaps shown for the watched rider; `None` renders as `-`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WatchedGaps {
    pub to_leader_seconds: Option<i64>,
    pub to_group_ahead_seconds: Option<i64>,
}

impl WatchedGaps {
    pub fn to_leader_display(&self) -> String {
        format_optional_gap(self.to_leader_seconds)
    }

    pub fn to_group_ahead_display(&self) -> String {
        format_optional_gap(self.to_group_ahead_seconds)
    }
}

/// Head-to-head numbers for the current compare target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareSummary {
    pub target: CompareTarget,
    pub label: String,
    pub current_power: f64,
    /// Positive when the target is ahead of the watched rider
    pub gap_seconds: i64,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceView<'a> {
    pub event_name: &'a str,
    pub status: DataStatus,
    pub playback: PlaybackState,
    pub snapshot: RaceSnapshot<'a>,
    pub groups: Vec<Group<'a>>,
    pub watched: Option<RiderId>,
    pub watched_rank: Option<usize>,
    pub watched_group: Option<usize>,
    pub watched_gaps: WatchedGaps,
    pub compare: Option<CompareSummary>,
    /// Group indices the viewer expanded to list members
    pub expanded_groups: Vec<usize>,
}

impl RaceView<'_> {
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn is_group_expanded(&self, index: usize) -> bool {
        self.expanded_groups.contains(&index)
    }
}

/// Viewer-controlled replay state
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    clock: PlaybackClock,
    watched: Option<RiderId>,
    compare: CompareTarget,
    expanded_groups: BTreeSet<usize>,
    projector: StandingsProjector,
    detector: GroupDetector,
}

impl PlaybackSession {
    /// Session for a race, watching the local user when acquisition flagged one
    pub fn new(race: &RaceRecord, config: EngineConfig) -> Self {
        let session = Self {
            clock: PlaybackClock::new(race.max_time_seconds()),
            watched: race.local_user().map(|r| r.id),
            compare: CompareTarget::None,
            expanded_groups: BTreeSet::new(),
            projector: StandingsProjector::new(config.clone()),
            detector: GroupDetector::new(GapEstimator::new(config)),
        };
        debug!(
            event = %race.event_id,
            riders = race.riders.len(),
            max_time = session.clock.max_time_seconds(),
            "Playback session created"
        );
        session
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    pub fn cursor_seconds(&self) -> f64 {
        self.clock.cursor_seconds()
    }

    pub fn watched(&self) -> Option<RiderId> {
        self.watched
    }

    pub fn compare_target(&self) -> CompareTarget {
        self.compare
    }

    /// Pick up riders added by acquisition since the last call
    pub fn sync_race(&mut self, race: &RaceRecord) {
        self.clock.set_max_time(race.max_time_seconds());
        if self.watched.is_none() {
            self.watched = race.local_user().map(|r| r.id);
        }
    }

    pub fn watch(&mut self, id: RiderId) {
        self.watched = Some(id);
        if self.compare == CompareTarget::Rider(id) {
            self.compare = CompareTarget::None;
        }
    }

    /// Compare against a rider; clears any group comparison
    pub fn compare_rider(&mut self, id: RiderId) {
        self.compare = CompareTarget::Rider(id);
    }

    /// Compare against a group; clears any rider comparison
    pub fn compare_group(&mut self, index: usize) {
        self.compare = CompareTarget::Group(index);
    }

    pub fn clear_compare(&mut self) {
        self.compare = CompareTarget::None;
    }

    /// Returns whether the group is expanded afterwards
    pub fn toggle_group_expanded(&mut self, index: usize) -> bool {
        if !self.expanded_groups.remove(&index) {
            self.expanded_groups.insert(index);
            true
        } else {
            false
        }
    }

    pub fn is_group_expanded(&self, index: usize) -> bool {
        self.expanded_groups.contains(&index)
    }

    /// Forget expansions for groups that no longer exist
    pub fn retain_expanded(&mut self, group_count: usize) {
        self.expanded_groups.retain(|&i| i < group_count);
    }

    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        self.clock.tick(elapsed)
    }

    pub fn apply(&mut self, command: PlaybackCommand) {
        debug!(?command, "Applying playback command");
        match command {
            PlaybackCommand::Play => {
                self.clock.play();
            }
            PlaybackCommand::Pause => self.clock.pause(),
            PlaybackCommand::Toggle => {
                self.clock.toggle();
            }
            PlaybackCommand::Reset => self.clock.reset(),
            PlaybackCommand::Scrub(time) => self.clock.scrub(time),
            PlaybackCommand::SetSpeed(speed) => self.clock.set_speed(speed),
            PlaybackCommand::Faster => {
                let speed = self.clock.speed().faster();
                self.clock.set_speed(speed);
            }
            PlaybackCommand::Slower => {
                let speed = self.clock.speed().slower();
                self.clock.set_speed(speed);
            }
            PlaybackCommand::Watch(id) => self.watch(id),
            PlaybackCommand::CompareRider(id) => self.compare_rider(id),
            PlaybackCommand::CompareGroup(index) => self.compare_group(index),
            PlaybackCommand::ClearCompare => self.clear_compare(),
            PlaybackCommand::ToggleGroup(index) => {
                self.toggle_group_expanded(index);
            }
        }
    }

    /// Snapshot at the cursor
    pub fn snapshot<'a>(&self, race: &'a RaceRecord) -> RaceSnapshot<'a> {
        self.projector.project(&race.riders, self.clock.cursor_seconds())
    }

    /// Derive the full frame for the current cursor
    pub fn view<'a>(&self, race: &'a RaceRecord) -> RaceView<'a> {
        let snapshot = self.snapshot(race);
        let groups = self.detector.detect(&snapshot, self.watched);
        let watched_standing = self.watched.and_then(|id| snapshot.find(id));
        let watched_group = self.watched.and_then(|id| group_of(&groups, id));
        let watched_rank = watched_standing.map(|s| s.rank);

        let watched_gaps = match watched_standing {
            Some(standing) => self.watched_gaps(&snapshot, &groups, standing, watched_group),
            None => WatchedGaps::default(),
        };
        let compare = watched_standing
            .and_then(|standing| self.compare_summary(&snapshot, &groups, standing));

        RaceView {
            event_name: race.event_name.as_str(),
            status: race.data_status(),
            playback: self.clock.state(),
            watched: self.watched,
            watched_rank,
            watched_group,
            watched_gaps,
            compare,
            expanded_groups: self
                .expanded_groups
                .iter()
                .copied()
                .filter(|&i| i < groups.len())
                .collect(),
            groups,
            snapshot,
        }
    }

    fn watched_gaps(
        &self,
        snapshot: &RaceSnapshot<'_>,
        groups: &[Group<'_>],
        watched: &RiderStanding<'_>,
        watched_group: Option<usize>,
    ) -> WatchedGaps {
        let time = snapshot.time_seconds;
        if time == 0.0 {
            return WatchedGaps::default();
        }
        let estimator = self.detector.estimator();

        let to_leader_seconds = snapshot
            .leader()
            .filter(|leader| leader.id != watched.id)
            .map(|leader| estimator.gap_seconds_between(leader, watched, time));

        let to_group_ahead_seconds = watched_group
            .filter(|&index| index > 0)
            .and_then(|index| groups[index - 1].last_member())
            .map(|back_of_group| estimator.gap_seconds_between(back_of_group, watched, time));

        WatchedGaps {
            to_leader_seconds,
            to_group_ahead_seconds,
        }
    }

    fn compare_summary(
        &self,
        snapshot: &RaceSnapshot<'_>,
        groups: &[Group<'_>],
        watched: &RiderStanding<'_>,
    ) -> Option<CompareSummary> {
        let (label, current_power, reference) = match self.compare {
            CompareTarget::None => return None,
            CompareTarget::Rider(id) => {
                let standing = snapshot.find(id)?;
                (standing.name.to_string(), standing.current_power, standing)
            }
            CompareTarget::Group(index) => {
                let group = groups.get(index)?;
                (
                    group.name.clone(),
                    group.average_power as f64,
                    group.first_member()?,
                )
            }
        };

        let estimator = self.detector.estimator();
        let time = snapshot.time_seconds;
        let gap_seconds = if reference.current_distance_km >= watched.current_distance_km {
            estimator.gap_seconds_between(reference, watched, time)
        } else {
            -estimator.gap_seconds_between(watched, reference, time)
        };

        Some(CompareSummary {
            target: self.compare,
            label,
            current_power,
            gap_seconds,
        })
    }

    /// Chart lines for the watched rider and the compare target up to the cursor
    pub fn chart_series(&self, race: &RaceRecord, metric: Metric) -> Vec<ChartSeries> {
        let cursor = self.clock.cursor_seconds();
        let mut series = Vec::new();

        if let Some(rider) = self.watched.and_then(|id| race.rider(id)) {
            series.push(ChartSeries {
                label: rider.name.clone(),
                metric,
                source: CompareTarget::Rider(rider.id),
                points: rider_points(rider, metric, cursor),
            });
        }

        match self.compare {
            CompareTarget::None => {}
            CompareTarget::Rider(id) => {
                if let Some(rider) = race.rider(id) {
                    series.push(ChartSeries {
                        label: rider.name.clone(),
                        metric,
                        source: self.compare,
                        points: rider_points(rider, metric, cursor),
                    });
                }
            }
            CompareTarget::Group(index) => {
                let snapshot = self.snapshot(race);
                let groups = self.detector.detect(&snapshot, self.watched);
                if let Some(group) = groups.get(index) {
                    let members: Vec<&RiderSeries> = group.members.iter().map(|m| m.rider).collect();
                    series.push(ChartSeries {
                        label: group.name.clone(),
                        metric,
                        source: self.compare,
                        points: group_points(&members, metric, cursor),
                    });
                }
            }
        }

        series
    }
}

fn sample_count(rider: &RiderSeries) -> usize {
    [
        rider.duration_samples as usize,
        rider.distance.len(),
        rider.power.len(),
        rider.heart_rate.len(),
        rider.elevation.len(),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

fn rider_points(rider: &RiderSeries, metric: Metric, cursor: f64) -> Vec<(f64, f64)> {
    let count = sample_count(rider);
    if count == 0 {
        return Vec::new();
    }
    let last = rider.index_at(cursor).min(count - 1);
    let interval = rider.interval() as f64;
    (0..=last)
        .map(|i| (i as f64 * interval, metric.sample(rider, i)))
        .collect()
}

/// Per-sample mean over the members of a group
fn group_points(members: &[&RiderSeries], metric: Metric, cursor: f64) -> Vec<(f64, f64)> {
    let Some(first) = members.first() else {
        return Vec::new();
    };
    let count = members.iter().map(|m| sample_count(m)).max().unwrap_or(0);
    if count == 0 {
        return Vec::new();
    }
    let last = first.index_at(cursor).min(count - 1);
    let interval = first.interval() as f64;
    (0..=last)
        .map(|i| {
            let total: f64 = members.iter().map(|m| metric.sample(m, i)).sum();
            (i as f64 * interval, total / members.len() as f64)
        })
        .collect()
}
