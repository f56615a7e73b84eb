//! Virtual race clock for replay
//!
//! The cursor advances by wall-clock delta times the speed multiplier on every
//! tick, so irregular tick intervals are fine. Reaching the end of the race
//! stops playback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

use crate::units::clamp;

/// Allowed replay speed multipliers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackSpeed {
    Half,
    Normal,
    Double,
    Five,
    Ten,
    Thirty,
    Sixty,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 7] = [
        PlaybackSpeed::Half,
        PlaybackSpeed::Normal,
        PlaybackSpeed::Double,
        PlaybackSpeed::Five,
        PlaybackSpeed::Ten,
        PlaybackSpeed::Thirty,
        PlaybackSpeed::Sixty,
    ];

    pub fn multiplier(&self) -> f64 {
        match self {
            PlaybackSpeed::Half => 0.5,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::Double => 2.0,
            PlaybackSpeed::Five => 5.0,
            PlaybackSpeed::Ten => 10.0,
            PlaybackSpeed::Thirty => 30.0,
            PlaybackSpeed::Sixty => 60.0,
        }
    }

    /// Next faster speed, saturating at the fastest
    pub fn faster(&self) -> Self {
        let i = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[(i + 1).min(Self::ALL.len() - 1)]
    }

    /// Next slower speed, saturating at the slowest
    pub fn slower(&self) -> Self {
        let i = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[i.saturating_sub(1)]
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        PlaybackSpeed::Normal
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

impl std::str::FromStr for PlaybackSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let number = lowered.strip_suffix('x').unwrap_or(&lowered);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("Invalid playback speed: {}", s))?;
        Self::ALL
            .iter()
            .copied()
            .find(|speed| speed.multiplier() == value)
            .ok_or_else(|| {
                let allowed: Vec<String> = Self::ALL.iter().map(|s| s.to_string()).collect();
                format!("Unsupported playback speed {} (allowed: {})", s, allowed.join(", "))
            })
    }
}

/// Result of advancing the clock by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock is stopped; nothing changed
    Idle,
    /// Cursor moved forward
    Advanced,
    /// Cursor reached the end of the race and playback stopped
    Finished,
}

/// Clock state exposed to slider and button bindings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub cursor_seconds: f64,
    pub max_time_seconds: f64,
    pub is_playing: bool,
    pub speed: PlaybackSpeed,
}

/// Replay clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackClock {
    cursor_seconds: f64,
    max_time_seconds: f64,
    is_playing: bool,
    speed: PlaybackSpeed,
}

impl PlaybackClock {
    pub fn new(max_time_seconds: f64) -> Self {
        Self {
            cursor_seconds: 0.0,
            max_time_seconds: sanitize_time(max_time_seconds),
            is_playing: false,
            speed: PlaybackSpeed::default(),
        }
    }

    pub fn with_speed(mut self, speed: PlaybackSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn cursor_seconds(&self) -> f64 {
        self.cursor_seconds
    }

    pub fn max_time_seconds(&self) -> f64 {
        self.max_time_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            cursor_seconds: self.cursor_seconds,
            max_time_seconds: self.max_time_seconds,
            is_playing: self.is_playing,
            speed: self.speed,
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor_seconds >= self.max_time_seconds
    }

    /// Start playing; returns false (and stays stopped) when already at the end
    pub fn play(&mut self) -> bool {
        if self.is_at_end() {
            self.is_playing = false;
            return false;
        }
        if !self.is_playing {
            debug!(cursor = self.cursor_seconds, speed = %self.speed, "Playback started");
        }
        self.is_playing = true;
        true
    }

    pub fn pause(&mut self) {
        if self.is_playing {
            debug!(cursor = self.cursor_seconds, "Playback paused");
        }
        self.is_playing = false;
    }

    /// Toggle between playing and stopped; returns the new playing flag
    pub fn toggle(&mut self) -> bool {
        if self.is_playing {
            self.pause();
            false
        } else {
            self.play()
        }
    }

    /// Stop and rewind to the start
    pub fn reset(&mut self) {
        self.is_playing = false;
        self.cursor_seconds = 0.0;
    }

    /// Jump to a race time; does not change the playing state
    pub fn scrub(&mut self, time_seconds: f64) {
        self.cursor_seconds = clamp(sanitize_time(time_seconds), 0.0, self.max_time_seconds);
    }

    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
    }

    /// Update the end of the race as more rider data arrives
    pub fn set_max_time(&mut self, max_time_seconds: f64) {
        self.max_time_seconds = sanitize_time(max_time_seconds);
        if self.cursor_seconds > self.max_time_seconds {
            self.cursor_seconds = self.max_time_seconds;
        }
        if self.is_playing && self.is_at_end() {
            self.is_playing = false;
        }
    }

    /// Advance by the real time elapsed since the previous tick
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        if !self.is_playing {
            return TickOutcome::Idle;
        }

        let advanced = elapsed.as_secs_f64() * self.speed.multiplier();
        self.cursor_seconds = clamp(self.cursor_seconds + advanced, 0.0, self.max_time_seconds);
        trace!(cursor = self.cursor_seconds, advanced, "Playback tick");

        if self.is_at_end() {
            self.is_playing = false;
            debug!(cursor = self.cursor_seconds, "Playback reached end of race");
            return TickOutcome::Finished;
        }
        TickOutcome::Advanced
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn sanitize_time(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}
