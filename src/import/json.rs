use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::import::{has_extension, ImportFormat};
use crate::models::RaceRecord;

/// Imports a serialized [`RaceRecord`] as written by the acquisition side
pub struct JsonImporter;

impl JsonImporter {
    pub fn new() -> Self {
        Self
    }

    /// Parse a race record from any reader
    pub fn parse<R: std::io::Read>(reader: R) -> Result<RaceRecord> {
        let race: RaceRecord = serde_json::from_reader(reader).map_err(|e| ImportError::ParseError {
            format: "json".to_string(),
            reason: e.to_string(),
        })?;

        if race.event_id.trim().is_empty() {
            return Err(ImportError::MissingData {
                field: "event_id".to_string(),
            }
            .into());
        }
        Ok(race)
    }
}

impl Default for JsonImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportFormat for JsonImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        has_extension(file_path, &["json"])
    }

    fn import_file(&self, file_path: &Path) -> Result<RaceRecord> {
        let file = File::open(file_path)?;
        Self::parse(BufReader::new(file))
    }

    fn get_format_name(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PelotrsError;
    use crate::models::RiderId;

    #[test]
    fn test_parse_race_record() {
        let json = r#"{
            "event_id": "3301",
            "event_name": "Tempus Fugit",
            "in_progress": true,
            "progress": {"fetched": 1, "total": 12},
            "riders": [
                {"position": 1, "id": 77, "name": "Local", "is_local_user": true,
                 "duration_samples": 3, "distance": [0.0, 0.01, 0.02], "power": [220, 230, 240]}
            ]
        }"#;
        let race = JsonImporter::parse(json.as_bytes()).unwrap();
        assert_eq!(race.event_name, "Tempus Fugit");
        assert_eq!(race.local_user().map(|r| r.id), Some(RiderId(77)));
        assert_eq!(race.riders[0].power, vec![220.0, 230.0, 240.0]);
        assert!(race.in_progress);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        let err = JsonImporter::parse("{not json".as_bytes()).unwrap_err();
        assert!(matches!(err, PelotrsError::Import(ImportError::ParseError { .. })));

        let err = JsonImporter::parse(r#"{"event_id": " ", "event_name": "x"}"#.as_bytes()).unwrap_err();
        assert!(matches!(err, PelotrsError::Import(ImportError::MissingData { .. })));
    }
}
