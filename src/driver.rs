//! Frame-paced replay loop
//!
//! Runs on the tokio runtime: each frame waits for the next interval tick,
//! applies pending viewer commands, advances the clock by the measured
//! wall-clock delta and hands a freshly derived [`RaceView`] to the renderer.
//! The race record arrives over a `watch` channel and is re-read whenever the
//! sender publishes a new version, so riders added by acquisition show up
//! without restarting playback. The loop returns as soon as the clock stops,
//! so nothing stays scheduled while paused.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::RaceRecord;
use crate::playback::TickOutcome;
use crate::session::{PlaybackCommand, PlaybackSession, RaceView};

/// Default frame cadence (~60 Hz)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// How a replay run ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplaySummary {
    /// Frames rendered during this run
    pub frames: u64,
    /// Cursor when the loop stopped
    pub final_cursor_seconds: f64,
    /// True when the run ended because the race finished
    pub reached_end: bool,
}

/// Drives a [`PlaybackSession`] at a fixed frame cadence
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    frame_interval: Duration,
}

impl Default for ReplayDriver {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl ReplayDriver {
    pub fn new(frame_interval: Duration) -> Self {
        let frame_interval = if frame_interval.is_zero() {
            DEFAULT_FRAME_INTERVAL
        } else {
            frame_interval
        };
        Self { frame_interval }
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Play until the clock stops (pause, reset or end of race).
    ///
    /// Returns immediately when the session is not playing once pending
    /// commands have been applied.
    pub async fn run<F>(
        &self,
        session: &mut PlaybackSession,
        mut race: watch::Receiver<RaceRecord>,
        commands: &mut mpsc::UnboundedReceiver<PlaybackCommand>,
        mut on_frame: F,
    ) -> ReplaySummary
    where
        F: FnMut(&RaceView<'_>),
    {
        // Owned copy so no channel lock is held while rendering
        let mut current = (*race.borrow_and_update()).clone();
        drain_commands(session, commands);
        session.sync_race(&current);

        let mut summary = ReplaySummary {
            frames: 0,
            final_cursor_seconds: session.cursor_seconds(),
            reached_end: false,
        };
        if !session.clock().is_playing() {
            debug!("Replay not started: session is stopped");
            return summary;
        }

        info!(
            cursor = session.cursor_seconds(),
            speed = %session.clock().speed(),
            frame_ms = self.frame_interval.as_millis() as u64,
            "Replay loop started"
        );

        let mut interval = time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            interval.tick().await;
            drain_commands(session, commands);

            let now = Instant::now();
            let elapsed = now.duration_since(last_frame);
            last_frame = now;

            if race.has_changed().unwrap_or(false) {
                current = (*race.borrow_and_update()).clone();
                debug!(riders = current.riders.len(), "Race data updated");
            }
            session.sync_race(&current);
            if session.tick(elapsed) == TickOutcome::Finished {
                summary.reached_end = true;
            }
            let group_count = {
                let view = session.view(&current);
                on_frame(&view);
                view.groups.len()
            };
            session.retain_expanded(group_count);
            summary.frames += 1;

            if !session.clock().is_playing() {
                break;
            }
        }

        summary.final_cursor_seconds = session.cursor_seconds();
        info!(
            frames = summary.frames,
            cursor = summary.final_cursor_seconds,
            reached_end = summary.reached_end,
            "Replay loop stopped"
        );
        summary
    }
}

fn drain_commands(session: &mut PlaybackSession, commands: &mut mpsc::UnboundedReceiver<PlaybackCommand>) {
    while let Ok(command) = commands.try_recv() {
        session.apply(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::EngineConfig;
    use crate::models::{RiderId, RiderSeries};
    use crate::playback::PlaybackSpeed;

    fn race_of(seconds: usize) -> RaceRecord {
        RaceRecord::new("evt", "Loop Race").with_riders(vec![
            RiderSeries::new(RiderId(1), "A", 1)
                .with_distance((0..seconds).map(|i| i as f64 * 0.011).collect())
                .local_user(),
            RiderSeries::new(RiderId(2), "B", 2)
                .with_distance((0..seconds).map(|i| i as f64 * 0.01).collect()),
        ])
    }

    fn fast_session(race: &RaceRecord) -> PlaybackSession {
        let mut session = PlaybackSession::new(race, EngineConfig::default());
        session.apply(PlaybackCommand::SetSpeed(PlaybackSpeed::Sixty));
        session
    }

    #[tokio::test]
    async fn test_runs_to_end_of_race() {
        let race = race_of(3);
        let mut session = fast_session(&race);
        let (_tx, rx) = watch::channel(race);
        let (command_tx, mut commands) = mpsc::unbounded_channel();
        command_tx.send(PlaybackCommand::Play).unwrap();

        let mut seen = 0;
        let summary = ReplayDriver::new(Duration::from_millis(5))
            .run(&mut session, rx, &mut commands, |view| {
                assert_eq!(view.snapshot.len(), 2);
                seen += 1;
            })
            .await;

        assert!(summary.reached_end);
        assert_eq!(summary.final_cursor_seconds, 3.0);
        assert_eq!(summary.frames, seen);
        assert!(!session.clock().is_playing());
    }

    #[tokio::test]
    async fn test_stopped_session_schedules_nothing() {
        let race = race_of(10);
        let mut session = fast_session(&race);
        let (_tx, rx) = watch::channel(race);
        let (_command_tx, mut commands) = mpsc::unbounded_channel();

        let summary = ReplayDriver::default()
            .run(&mut session, rx, &mut commands, |_| panic!("no frame expected"))
            .await;
        assert_eq!(summary.frames, 0);
        assert!(!summary.reached_end);
    }

    #[tokio::test]
    async fn test_pause_stops_loop() {
        let race = race_of(1000);
        let mut session = fast_session(&race);
        let (_tx, rx) = watch::channel(race);
        let (command_tx, mut commands) = mpsc::unbounded_channel();
        command_tx.send(PlaybackCommand::Play).unwrap();

        let summary = ReplayDriver::new(Duration::from_millis(5))
            .run(&mut session, rx, &mut commands, |view| {
                if view.playback.is_playing {
                    command_tx.send(PlaybackCommand::Pause).unwrap();
                }
            })
            .await;

        assert_eq!(summary.frames, 2);
        assert!(!summary.reached_end);
        assert!(summary.final_cursor_seconds < 1000.0);
    }

    #[tokio::test]
    async fn test_picks_up_new_riders() {
        let race = race_of(2);
        let mut session = fast_session(&race);
        let (tx, rx) = watch::channel(race);
        let (command_tx, mut commands) = mpsc::unbounded_channel();
        command_tx.send(PlaybackCommand::Play).unwrap();

        let mut max_riders = 0;
        let summary = ReplayDriver::new(Duration::from_millis(5))
            .run(&mut session, rx, &mut commands, |view| {
                max_riders = max_riders.max(view.snapshot.len());
                if view.snapshot.len() == 2 {
                    let mut grown = race_of(4);
                    grown.upsert_rider(
                        RiderSeries::new(RiderId(3), "C", 3)
                            .with_distance((0..4).map(|i| i as f64 * 0.012).collect()),
                    );
                    tx.send(grown).unwrap();
                }
            })
            .await;

        assert!(summary.reached_end);
        assert_eq!(max_riders, 3);
        assert_eq!(session.clock().max_time_seconds(), 4.0);
        assert_eq!(summary.final_cursor_seconds, 4.0);
    }
}
