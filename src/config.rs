use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gap::EngineConfig;
use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::playback::PlaybackSpeed;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Standings, gap and group engine tunables
    #[serde(default)]
    pub engine: EngineConfig,

    /// Replay preferences
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Race store location
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging setup
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Replay preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Speed used when a replay starts
    pub default_speed: PlaybackSpeed,

    /// Frame cadence of the replay loop in milliseconds
    pub frame_interval_ms: u64,

    /// Render every Nth frame in the terminal replay
    pub render_every_frames: u32,
}

/// Race store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database path
    pub database_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            engine: EngineConfig::default(),
            playback: PlaybackSettings::default(),
            storage: StorageSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        PlaybackSettings {
            default_speed: PlaybackSpeed::Ten,
            frame_interval_ms: 16,
            render_every_frames: 30,
        }
    }
}

impl PlaybackSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: AppConfig::default_data_dir().join("races.db"),
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        // Update modification timestamp
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pelotrs")
            .join("config.toml")
    }

    /// Default directory for the race store
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pelotrs")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(_) => {
                eprintln!("Config file not found, using defaults: {}", config_path.display());
                Self::default()
            }
        }
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.gap_threshold_seconds < 0 {
            return Err(anyhow!("engine.gap_threshold_seconds must not be negative"));
        }
        if !(engine.min_speed_kmh > 0.0) {
            return Err(anyhow!("engine.min_speed_kmh must be positive"));
        }
        if !(engine.default_speed_kmh > 0.0) {
            return Err(anyhow!("engine.default_speed_kmh must be positive"));
        }
        if !(engine.fallback_distance_km > 0.0) {
            return Err(anyhow!("engine.fallback_distance_km must be positive"));
        }
        if engine.speed_warmup_seconds < 0.0 {
            return Err(anyhow!("engine.speed_warmup_seconds must not be negative"));
        }
        Ok(())
    }

    /// All settable keys with their current values
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        Self::KEYS
            .iter()
            .filter_map(|&key| self.get_value(key).map(|value| (key, value)))
            .collect()
    }

    const KEYS: [&'static str; 11] = [
        "engine.gap_threshold_seconds",
        "engine.default_speed_kmh",
        "engine.min_speed_kmh",
        "engine.speed_warmup_seconds",
        "engine.fallback_distance_km",
        "playback.default_speed",
        "playback.frame_interval_ms",
        "playback.render_every_frames",
        "storage.database_path",
        "logging.level",
        "logging.format",
    ];

    /// Read a setting by dotted key
    pub fn get_value(&self, key: &str) -> Option<String> {
        let value = match key {
            "engine.gap_threshold_seconds" => self.engine.gap_threshold_seconds.to_string(),
            "engine.default_speed_kmh" => self.engine.default_speed_kmh.to_string(),
            "engine.min_speed_kmh" => self.engine.min_speed_kmh.to_string(),
            "engine.speed_warmup_seconds" => self.engine.speed_warmup_seconds.to_string(),
            "engine.fallback_distance_km" => self.engine.fallback_distance_km.to_string(),
            "playback.default_speed" => self.playback.default_speed.to_string(),
            "playback.frame_interval_ms" => self.playback.frame_interval_ms.to_string(),
            "playback.render_every_frames" => self.playback.render_every_frames.to_string(),
            "storage.database_path" => self.storage.database_path.display().to_string(),
            "logging.level" => self.logging.level.to_filter(),
            "logging.format" => format!("{:?}", self.logging.format).to_lowercase(),
            _ => return None,
        };
        Some(value)
    }

    /// Update a setting by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))
        }

        let mut updated = self.clone();
        match key {
            "engine.gap_threshold_seconds" => updated.engine.gap_threshold_seconds = parse(key, value)?,
            "engine.default_speed_kmh" => updated.engine.default_speed_kmh = parse(key, value)?,
            "engine.min_speed_kmh" => updated.engine.min_speed_kmh = parse(key, value)?,
            "engine.speed_warmup_seconds" => updated.engine.speed_warmup_seconds = parse(key, value)?,
            "engine.fallback_distance_km" => updated.engine.fallback_distance_km = parse(key, value)?,
            "playback.default_speed" => {
                updated.playback.default_speed = value.parse::<PlaybackSpeed>().map_err(|e| anyhow!(e))?
            }
            "playback.frame_interval_ms" => updated.playback.frame_interval_ms = parse(key, value)?,
            "playback.render_every_frames" => updated.playback.render_every_frames = parse(key, value)?,
            "storage.database_path" => updated.storage.database_path = PathBuf::from(value.trim()),
            "logging.level" => updated.logging.level = value.parse::<LogLevel>().map_err(|e| anyhow!(e))?,
            "logging.format" => updated.logging.format = value.parse::<LogFormat>().map_err(|e| anyhow!(e))?,
            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }

        updated.validate()?;
        *self = updated;
        self.metadata.updated_at = Utc::now();
        Ok(())
    }
}
