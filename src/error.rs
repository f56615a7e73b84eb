//! Unified error hierarchy for pelotrs
//!
//! The derivation engine itself is total and never returns these; they cover
//! the edges: importing race data, the race store, configuration and
//! invalid viewer input.

use std::path::PathBuf;
use thiserror::Error;

use crate::database::StorageError;

/// Top-level error type for all pelotrs operations
#[derive(Debug, Error)]
pub enum PelotrsError {
    /// Race data import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Race store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid playback or selection input
    #[error("Playback error: {0}")]
    Playback(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Race data import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Unsupported format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Format-specific parsing error
    #[error("Parse error in {format}: {reason}")]
    ParseError { format: String, reason: String },

    /// Missing required data
    #[error("Missing required data: {field}")]
    MissingData { field: String },

    /// Invalid data structure
    #[error("Invalid data structure: {reason}")]
    InvalidStructure { reason: String },
}

/// Result type alias for pelotrs operations
pub type Result<T> = std::result::Result<T, PelotrsError>;

impl PelotrsError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PelotrsError::Import(ImportError::FileNotFound { .. }) => ErrorSeverity::Warning,
            PelotrsError::Storage(StorageError::NotFound(_)) => ErrorSeverity::Warning,
            PelotrsError::Playback(_) => ErrorSeverity::Warning,
            PelotrsError::Storage(_) => ErrorSeverity::Error,
            PelotrsError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PelotrsError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find race file: {}", path.display())
            }
            PelotrsError::Import(ImportError::UnsupportedFormat { format }) => {
                format!("Race files in '{}' format are not supported. Use .json or .csv.", format)
            }
            PelotrsError::Storage(StorageError::NotFound(event_id)) => {
                format!("No stored race with event id {}. Import it first.", event_id)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents the operation
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
