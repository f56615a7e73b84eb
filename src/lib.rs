// Library interface for pelotrs modules
// This allows integration tests and the CLI to share the replay engine

pub mod config;
pub mod course;
pub mod database;
pub mod display;
pub mod driver;
pub mod error;
pub mod gap;
pub mod groups;
pub mod import;
pub mod logging;
pub mod models;
pub mod playback;
pub mod session;
pub mod standings;
pub mod units;

// Re-export commonly used types for convenience
pub use models::*;
pub use gap::{DistanceSource, EngineConfig, GapEstimator};
pub use groups::{Group, GroupDetector};
pub use standings::{RaceSnapshot, RiderStanding, StandingsProjector};
pub use playback::{PlaybackClock, PlaybackSpeed, PlaybackState, TickOutcome};
pub use session::{CompareTarget, Metric, PlaybackCommand, PlaybackSession, RaceView};
pub use driver::{ReplayDriver, ReplaySummary};
pub use database::{RaceStore, StorageError};
pub use error::{PelotrsError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};
