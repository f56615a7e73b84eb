use pelotrs::models::{AcquisitionProgress, DataStatus, RaceRecord, RiderId, RiderSeries};
use pelotrs::playback::{PlaybackClock, PlaybackSpeed, TickOutcome};
use pelotrs::session::{CompareTarget, PlaybackCommand, PlaybackSession};
use pelotrs::units::{format_clock, format_gap, time_to_index};
use pelotrs::{EngineConfig, GapEstimator, GroupDetector, StandingsProjector};
use std::time::Duration;

/// Integration tests that run whole replay workflows through the public API

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Rider covering `km_per_sample` every second for `samples` samples
    fn steady_rider(id: u64, name: &str, km_per_sample: f64, samples: usize) -> RiderSeries {
        let distance = (0..samples).map(|i| i as f64 * km_per_sample).collect();
        let power = (0..samples).map(|_| 200.0 + id as f64).collect();
        RiderSeries::new(RiderId(id), name, id as u32)
            .with_distance(distance)
            .with_power(power)
    }

    /// Breakaway of two, a chasing trio and a dropped rider
    fn create_test_race() -> RaceRecord {
        RaceRecord::new("evt-1", "Mountain Mayhem").with_riders(vec![
            steady_rider(1, "Breakaway A", 0.0125, 601),
            steady_rider(2, "Breakaway B", 0.0125, 601),
            steady_rider(3, "Chaser A", 0.0111, 601),
            steady_rider(4, "Chaser B", 0.0111, 601).local_user(),
            steady_rider(5, "Chaser C", 0.0110, 601),
            steady_rider(6, "Dropped", 0.0090, 601),
        ])
    }

    #[test]
    fn test_formatting_properties() {
        assert_eq!(format_clock(90.0), "1:30");
        assert_eq!(format_gap(0), "-");
        assert_eq!(format_gap(-3), "-");
        assert_eq!(format_gap(5), "+5s");
        assert_eq!(format_gap(90), "+1:30");
        assert_eq!(time_to_index(27.0, 5), 5);
        assert_eq!(time_to_index(10.9, 1), 10);
    }

    #[test]
    fn test_one_second_gap_scenario() {
        let leader = RiderSeries::new(RiderId(1), "A", 1)
            .with_distance((0..=10).map(|i| i as f64).collect());
        let trailer = RiderSeries::new(RiderId(2), "B", 2)
            .with_distance((0..=10).map(|i| (i as f64 - 1.0).max(0.0)).collect());

        let estimator = GapEstimator::default();
        assert_eq!(estimator.estimate_speed_kmh(&trailer, 10.0), 3600.0);
        assert_eq!(estimator.gap_seconds_between(&leader, &trailer, 10.0), 1);
        assert_eq!(estimator.gap_seconds_between(&leader, &trailer, 0.0), 0);
    }

    #[test]
    fn test_race_splits_into_groups() {
        let race = create_test_race();
        let mut session = PlaybackSession::new(&race, EngineConfig::default());
        session.apply(PlaybackCommand::Scrub(600.0));

        let view = session.view(&race);
        assert_eq!(view.snapshot.len(), 6);
        assert_eq!(view.snapshot.leader().map(|s| s.id), Some(RiderId(1)));

        let names: Vec<&str> = view.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Lead Group", "Group 2", "Group 3"]);
        assert_eq!(view.groups[0].len(), 2);
        assert_eq!(view.groups[1].len(), 3);
        assert_eq!(view.groups[2].len(), 1);

        // Partition: nobody lost, nobody counted twice
        let total: usize = view.groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, view.snapshot.len());

        // Local user is watched by default and sits in the chase
        assert_eq!(view.watched, Some(RiderId(4)));
        assert_eq!(view.watched_group, Some(1));
        assert!(view.groups[1].contains_watched);
        assert!(view.watched_gaps.to_leader_seconds.unwrap() > 5);
        assert_eq!(
            view.watched_gaps.to_leader_seconds,
            view.watched_gaps.to_group_ahead_seconds
        );
    }

    #[test]
    fn test_gaps_undefined_for_leader_and_race_start() {
        let race = create_test_race();
        let mut session = PlaybackSession::new(&race, EngineConfig::default());

        let at_start = session.view(&race);
        assert_eq!(at_start.watched_gaps.to_leader_display(), "-");
        assert_eq!(at_start.watched_gaps.to_group_ahead_display(), "-");

        session.apply(PlaybackCommand::Scrub(300.0));
        session.apply(PlaybackCommand::Watch(RiderId(1)));
        let leading = session.view(&race);
        assert_eq!(leading.watched_rank, Some(1));
        assert_eq!(leading.watched_gaps.to_leader_seconds, None);
        assert_eq!(leading.watched_gaps.to_group_ahead_seconds, None);
    }

    #[test]
    fn test_compare_targets_are_exclusive() {
        let race = create_test_race();
        let mut session = PlaybackSession::new(&race, EngineConfig::default());
        session.apply(PlaybackCommand::Scrub(600.0));

        session.apply(PlaybackCommand::CompareRider(RiderId(1)));
        assert_eq!(session.compare_target(), CompareTarget::Rider(RiderId(1)));
        let view = session.view(&race);
        let compare = view.compare.expect("rider compare summary");
        assert!(compare.gap_seconds > 0);

        session.apply(PlaybackCommand::CompareGroup(2));
        assert_eq!(session.compare_target(), CompareTarget::Group(2));
        let view = session.view(&race);
        let compare = view.compare.expect("group compare summary");
        assert_eq!(compare.label, "Group 3");
        assert!(compare.gap_seconds < 0);

        session.apply(PlaybackCommand::ClearCompare);
        assert_eq!(session.compare_target(), CompareTarget::None);
        assert!(session.view(&race).compare.is_none());
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let race = create_test_race();
        let before = race.clone();
        let projector = StandingsProjector::new(EngineConfig::default());
        let detector = GroupDetector::default();

        let first = projector.project(&race.riders, 420.0);
        let second = projector.project(&race.riders, 420.0);
        assert_eq!(first, second);
        assert_eq!(
            detector.detect(&first, Some(RiderId(4))),
            detector.detect(&second, Some(RiderId(4)))
        );
        assert_eq!(race, before);
    }

    #[test]
    fn test_ranking_ignores_input_order_except_ties() {
        let race = create_test_race();
        let mut reversed = race.clone();
        reversed.riders.reverse();

        let projector = StandingsProjector::default();
        let ids = |r: &RaceRecord| -> Vec<u64> {
            projector
                .project(&r.riders, 500.0)
                .standings
                .iter()
                .map(|s| s.id.0)
                .collect()
        };
        assert_eq!(ids(&race), vec![1, 2, 3, 4, 5, 6]);
        // Riders level on distance keep their input order
        assert_eq!(ids(&reversed), vec![2, 1, 4, 3, 5, 6]);
    }

    #[test]
    fn test_playback_speed_scenario() {
        let mut clock = PlaybackClock::new(25.0).with_speed(PlaybackSpeed::Ten);
        assert!(clock.play());
        assert_eq!(clock.tick(Duration::from_secs(1)), TickOutcome::Advanced);
        assert_eq!(clock.cursor_seconds(), 10.0);
        assert_eq!(clock.tick(Duration::from_secs(1)), TickOutcome::Advanced);
        assert_eq!(clock.tick(Duration::from_secs(1)), TickOutcome::Finished);
        assert_eq!(clock.cursor_seconds(), 25.0);
        assert!(!clock.is_playing());
        assert!(!clock.play());
    }

    #[test]
    fn test_partial_acquisition_grows_mid_playback() {
        let mut race = RaceRecord::new("evt-2", "Live Crit");
        race.in_progress = true;
        race.progress = Some(AcquisitionProgress { fetched: 0, total: 3 });

        let mut session = PlaybackSession::new(&race, EngineConfig::default());
        assert_eq!(session.view(&race).status, DataStatus::Empty);
        assert!(session.view(&race).is_empty());

        // Commands on an empty race are accepted without effect
        session.apply(PlaybackCommand::Play);
        assert!(!session.clock().is_playing());
        assert_eq!(session.tick(Duration::from_secs(1)), TickOutcome::Idle);

        race.upsert_rider(steady_rider(1, "First", 0.011, 121));
        session.sync_race(&race);
        session.apply(PlaybackCommand::Play);
        assert!(session.clock().is_playing());
        session.tick(Duration::from_secs(30));
        assert_eq!(session.cursor_seconds(), 30.0);

        race.upsert_rider(steady_rider(2, "Second", 0.012, 121));
        session.sync_race(&race);
        let view = session.view(&race);
        assert!(session.clock().is_playing());
        assert_eq!(view.snapshot.len(), 2);
        assert_eq!(view.status, DataStatus::Partial { fetched: 2, total: 3 });
        assert_eq!(view.groups.iter().map(|g| g.len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_riders_without_distance_use_linear_model() {
        let mut rider = RiderSeries::new(RiderId(1), "No GPS", 1);
        rider.duration_samples = 100;
        let race = RaceRecord::new("e", "Indoor").with_riders(vec![rider]);

        let projector = StandingsProjector::default();
        let snapshot = projector.project(&race.riders, 50.0);
        assert_eq!(snapshot.total_distance_km, 42.0);
        assert!((snapshot.standings[0].current_distance_km - 21.0).abs() < 1e-9);
        assert!((snapshot.standings[0].progress - 0.5).abs() < 1e-9);

        let groups = GroupDetector::default().detect(&snapshot, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Lead Group");
    }
}
