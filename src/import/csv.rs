use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::import::{has_extension, ImportFormat};
use crate::models::{RaceRecord, RiderId, RiderSeries};

/// Highest accepted sample index: seven days of 1 Hz telemetry
const MAX_SAMPLE_INDEX: usize = 7 * 24 * 3600;

/// One telemetry sample in long format
#[derive(Debug, Deserialize)]
struct SampleRow {
    rider_id: u64,
    name: String,
    position: u32,
    #[serde(default)]
    is_local_user: Option<String>,
    #[serde(default)]
    sample_interval_seconds: Option<u32>,
    sample: usize,
    #[serde(default)]
    distance_km: Option<f64>,
    #[serde(default)]
    power: Option<f64>,
    #[serde(default)]
    heart_rate: Option<f64>,
    #[serde(default)]
    elevation: Option<f64>,
}

/// CSV importer for long-format race telemetry
///
/// One row per rider and sample:
/// `rider_id,name,position,is_local_user,sample,distance_km,power,heart_rate,elevation`.
/// The event id and name are taken from the file stem.
pub struct CsvImporter;

impl CsvImporter {
    pub fn new() -> Self {
        Self
    }

    /// Parse rows into a race record
    pub fn parse<R: std::io::Read>(reader: R, event_id: &str) -> Result<RaceRecord> {
        let mut csv_reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut riders: Vec<RiderSeries> = Vec::new();
        let mut by_id: HashMap<u64, usize> = HashMap::new();

        for (line, record) in csv_reader.deserialize::<SampleRow>().enumerate() {
            let row = record.map_err(|e| ImportError::ParseError {
                format: "csv".to_string(),
                reason: format!("row {}: {}", line + 2, e),
            })?;
            let duration = sample_count(row.sample).ok_or_else(|| ImportError::InvalidStructure {
                reason: format!("row {}: sample index {} out of range", line + 2, row.sample),
            })?;

            let slot = *by_id.entry(row.rider_id).or_insert_with(|| {
                let mut rider = RiderSeries::new(RiderId(row.rider_id), row.name.clone(), row.position);
                rider.sample_interval_seconds = row.sample_interval_seconds.unwrap_or(1);
                riders.push(rider);
                riders.len() - 1
            });
            let rider = &mut riders[slot];

            if row.is_local_user.as_deref().map(parse_flag).unwrap_or(false) {
                rider.is_local_user = true;
            }
            if let Some(distance) = row.distance_km {
                set_sample(&mut rider.distance, row.sample, distance, true);
            }
            if let Some(power) = row.power {
                set_sample(&mut rider.power, row.sample, power, false);
            }
            if let Some(heart_rate) = row.heart_rate {
                set_sample(&mut rider.heart_rate, row.sample, heart_rate, false);
            }
            if let Some(elevation) = row.elevation {
                set_sample(&mut rider.elevation, row.sample, elevation, false);
            }
            rider.duration_samples = rider.duration_samples.max(duration);
        }

        if riders.is_empty() {
            return Err(ImportError::MissingData {
                field: "rider samples".to_string(),
            }
            .into());
        }

        let mut race = RaceRecord::new(event_id, event_id);
        race.riders = riders;
        Ok(race)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, &["csv"])
    }

    fn import_file(&self, file_path: &Path) -> Result<RaceRecord> {
        let event_id = file_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| ImportError::InvalidStructure {
                reason: format!("no file name in {}", file_path.display()),
            })?;
        let file = std::fs::File::open(file_path)?;
        Self::parse(file, &event_id)
    }

    fn get_format_name(&self) -> &'static str {
        "CSV"
    }
}

/// Samples covered once `index` is present, if the index is plausible
fn sample_count(index: usize) -> Option<u32> {
    if index > MAX_SAMPLE_INDEX {
        return None;
    }
    u32::try_from(index).ok()?.checked_add(1)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "y")
}

/// Write a sample at `index`, padding any skipped samples.
/// Cumulative channels pad with the previous value, others with 0.
fn set_sample(samples: &mut Vec<f64>, index: usize, value: f64, cumulative: bool) {
    if index >= samples.len() {
        let pad = if cumulative {
            samples.last().copied().unwrap_or(0.0)
        } else {
            0.0
        };
        samples.resize(index + 1, pad);
    }
    samples[index] = value;
}
