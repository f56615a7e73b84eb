use std::path::Path;
use tracing::{info, warn};

use crate::error::{ImportError, Result};
use crate::models::{RaceRecord, RiderSeries};

pub mod csv;
pub mod json;

/// Trait for loading race records from different file formats
pub trait ImportFormat {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Import a race record from the file
    fn import_file(&self, file_path: &Path) -> Result<RaceRecord>;

    /// Get the format name for this importer
    fn get_format_name(&self) -> &'static str;
}

/// Manager for coordinating different import formats
pub struct ImportManager {
    importers: Vec<Box<dyn ImportFormat>>,
}

impl ImportManager {
    /// Create a new import manager with all available importers
    pub fn new() -> Self {
        let importers: Vec<Box<dyn ImportFormat>> = vec![
            Box::new(json::JsonImporter::new()),
            Box::new(csv::CsvImporter::new()),
        ];

        Self { importers }
    }

    /// Import a single file, auto-detecting the format
    pub fn import_file(&self, file_path: &Path) -> Result<RaceRecord> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        let importer = self
            .importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat {
                format: file_path
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })?;

        let mut race = importer.import_file(file_path)?;
        let repaired: usize = race.riders.iter_mut().map(normalize_rider).sum();

        info!(
            file = %file_path.display(),
            format = importer.get_format_name(),
            event = %race.event_id,
            riders = race.riders.len(),
            repaired_samples = repaired,
            "Race imported"
        );
        Ok(race)
    }

    /// Check if this manager can import a given file
    pub fn can_import_file(&self, file_path: &Path) -> bool {
        self.importers.iter().any(|importer| importer.can_import(file_path))
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Bring acquired telemetry in line with the engine's assumptions.
///
/// Distance must be non-decreasing; decreasing samples are raised to the
/// running maximum. A missing sample count is taken from the longest array.
/// Returns the number of repaired distance samples.
pub fn normalize_rider(rider: &mut RiderSeries) -> usize {
    let mut repaired = 0;
    let mut running_max = f64::NEG_INFINITY;
    for value in rider.distance.iter_mut() {
        if !value.is_finite() || *value < running_max {
            *value = running_max.max(0.0);
            repaired += 1;
        }
        running_max = running_max.max(*value);
    }
    if repaired > 0 {
        warn!(rider = %rider.id, repaired, "Repaired non-monotonic distance samples");
    }

    if rider.duration_samples == 0 {
        rider.duration_samples = [
            rider.distance.len(),
            rider.power.len(),
            rider.heart_rate.len(),
            rider.elevation.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0) as u32;
    }
    repaired
}

fn has_extension(file_path: &Path, extensions: &[&str]) -> bool {
    file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}
