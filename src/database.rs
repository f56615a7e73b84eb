use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::models::{AcquisitionProgress, RaceRecord, RiderId, RiderSeries};

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Compression error: {0}")]
    CompressionError(#[from] std::io::Error),
    #[error("Race not found: {0}")]
    NotFound(String),
}

/// Per-sample telemetry arrays of one rider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SampleArrays {
    power: Vec<f64>,
    heart_rate: Vec<f64>,
    elevation: Vec<f64>,
    distance: Vec<f64>,
}

/// Compressed rider samples for efficient storage
#[derive(Debug, Clone)]
pub struct CompressedSamples {
    pub compressed_data: Vec<u8>,
    pub original_size: usize,
}

impl CompressedSamples {
    /// Compress a rider's sample arrays (bincode, then gzip)
    pub fn compress(rider: &RiderSeries) -> Result<Self, StorageError> {
        let arrays = SampleArrays {
            power: rider.power.clone(),
            heart_rate: rider.heart_rate.clone(),
            elevation: rider.elevation.clone(),
            distance: rider.distance.clone(),
        };
        let serialized =
            bincode::serialize(&arrays).map_err(|e| StorageError::SerializationError(e.to_string()))?;
        let original_size = serialized.len();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let compressed_data = encoder.finish()?;

        Ok(Self {
            compressed_data,
            original_size,
        })
    }

    /// Decompress into the sample arrays of `rider`
    fn restore_into(data: &[u8], rider: &mut RiderSeries) -> Result<(), StorageError> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        let arrays: SampleArrays = bincode::deserialize(&decompressed)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        rider.power = arrays.power;
        rider.heart_rate = arrays.heart_rate;
        rider.elevation = arrays.elevation;
        rider.distance = arrays.distance;
        Ok(())
    }

    /// Original size / compressed size
    pub fn compression_ratio(&self) -> f64 {
        self.original_size as f64 / self.compressed_data.len().max(1) as f64
    }
}

/// Stored race listing entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceSummary {
    pub event_id: String,
    pub event_name: String,
    pub rider_count: usize,
    pub in_progress: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// SQLite-backed race store
///
/// Supports incremental population: acquisition can save the race header
/// first and upsert riders one at a time while it is still fetching.
pub struct RaceStore {
    conn: Connection,
}

impl RaceStore {
    /// Create or open a store at the specified path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        info!(path = %db_path.as_ref().display(), "Race store opened");
        Ok(store)
    }

    /// In-memory store, mostly for tests
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS races (
                event_id TEXT PRIMARY KEY,
                event_name TEXT NOT NULL,
                in_progress INTEGER NOT NULL DEFAULT 0,
                fetched INTEGER,
                total INTEGER,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS riders (
                event_id TEXT NOT NULL REFERENCES races(event_id) ON DELETE CASCADE,
                rider_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                is_local_user INTEGER NOT NULL DEFAULT 0,
                duration_samples INTEGER NOT NULL,
                sample_interval_seconds INTEGER NOT NULL,
                samples BLOB NOT NULL,
                PRIMARY KEY (event_id, rider_id)
            );

            CREATE INDEX IF NOT EXISTS idx_riders_event ON riders(event_id, position);
            "#,
        )?;
        Ok(())
    }

    /// Save a whole race, replacing its header and upserting every rider
    pub fn save_race(&mut self, race: &RaceRecord) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        write_header(&tx, race)?;
        for rider in &race.riders {
            write_rider(&tx, &race.event_id, rider)?;
        }
        tx.commit()?;

        info!(
            event = %race.event_id,
            riders = race.riders.len(),
            in_progress = race.in_progress,
            "Race saved"
        );
        Ok(())
    }

    /// Add or replace one rider of an existing race
    pub fn upsert_rider(&mut self, event_id: &str, rider: &RiderSeries) -> Result<(), StorageError> {
        if !self.race_exists(event_id)? {
            return Err(StorageError::NotFound(event_id.to_string()));
        }
        let tx = self.conn.transaction()?;
        write_rider(&tx, event_id, rider)?;
        tx.execute(
            "UPDATE races SET updated_at = ?1 WHERE event_id = ?2",
            params![Utc::now(), event_id],
        )?;
        tx.commit()?;
        debug!(event = %event_id, rider = %rider.id, "Rider upserted");
        Ok(())
    }

    /// Record acquisition progress for a race
    pub fn update_progress(
        &mut self,
        event_id: &str,
        in_progress: bool,
        progress: Option<AcquisitionProgress>,
    ) -> Result<(), StorageError> {
        let updated = self.conn.execute(
            "UPDATE races SET in_progress = ?1, fetched = ?2, total = ?3, updated_at = ?4 WHERE event_id = ?5",
            params![
                in_progress,
                progress.map(|p| p.fetched),
                progress.map(|p| p.total),
                Utc::now(),
                event_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(event_id.to_string()));
        }
        Ok(())
    }

    pub fn race_exists(&self, event_id: &str) -> Result<bool, StorageError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM races WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Load a race with all riders ordered by acquisition position
    pub fn load_race(&self, event_id: &str) -> Result<Option<RaceRecord>, StorageError> {
        let header = self
            .conn
            .query_row(
                "SELECT event_name, in_progress, fetched, total, updated_at FROM races WHERE event_id = ?1",
                params![event_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, Option<u32>>(2)?,
                        row.get::<_, Option<u32>>(3)?,
                        row.get::<_, Option<DateTime<Utc>>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((event_name, in_progress, fetched, total, updated_at)) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT rider_id, position, name, is_local_user, duration_samples, sample_interval_seconds, samples
             FROM riders WHERE event_id = ?1 ORDER BY position, rider_id",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            let mut rider = RiderSeries::new(
                RiderId(row.get::<_, i64>(0)? as u64),
                row.get::<_, String>(2)?,
                row.get::<_, u32>(1)?,
            );
            rider.is_local_user = row.get(3)?;
            rider.duration_samples = row.get(4)?;
            rider.sample_interval_seconds = row.get(5)?;
            Ok((rider, row.get::<_, Vec<u8>>(6)?))
        })?;

        let mut riders = Vec::new();
        for row in rows {
            let (mut rider, samples) = row?;
            CompressedSamples::restore_into(&samples, &mut rider)?;
            riders.push(rider);
        }

        let progress = match (fetched, total) {
            (Some(fetched), Some(total)) => Some(AcquisitionProgress { fetched, total }),
            _ => None,
        };

        debug!(event = %event_id, riders = riders.len(), "Race loaded");
        Ok(Some(RaceRecord {
            event_id: event_id.to_string(),
            event_name,
            riders,
            in_progress,
            progress,
            updated_at,
        }))
    }

    pub fn list_races(&self) -> Result<Vec<RaceSummary>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.event_id, r.event_name, r.in_progress, r.updated_at,
                    (SELECT COUNT(*) FROM riders WHERE riders.event_id = r.event_id)
             FROM races r ORDER BY r.updated_at DESC, r.event_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RaceSummary {
                event_id: row.get(0)?,
                event_name: row.get(1)?,
                in_progress: row.get(2)?,
                updated_at: row.get(3)?,
                rider_count: row.get::<_, i64>(4)? as usize,
            })
        })?;
        let races = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(races)
    }

    /// Delete a race and its riders; returns false if it did not exist
    pub fn delete_race(&mut self, event_id: &str) -> Result<bool, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM riders WHERE event_id = ?1", params![event_id])?;
        let deleted = tx.execute("DELETE FROM races WHERE event_id = ?1", params![event_id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

fn write_header(conn: &Connection, race: &RaceRecord) -> Result<(), StorageError> {
    conn.execute(
        r#"
        INSERT INTO races (event_id, event_name, in_progress, fetched, total, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(event_id) DO UPDATE SET
            event_name = excluded.event_name,
            in_progress = excluded.in_progress,
            fetched = excluded.fetched,
            total = excluded.total,
            updated_at = excluded.updated_at
        "#,
        params![
            race.event_id,
            race.event_name,
            race.in_progress,
            race.progress.map(|p| p.fetched),
            race.progress.map(|p| p.total),
            race.updated_at.unwrap_or_else(Utc::now),
        ],
    )?;
    Ok(())
}

fn write_rider(conn: &Connection, event_id: &str, rider: &RiderSeries) -> Result<(), StorageError> {
    let samples = CompressedSamples::compress(rider)?;
    conn.execute(
        r#"
        INSERT OR REPLACE INTO riders
            (event_id, rider_id, position, name, is_local_user, duration_samples, sample_interval_seconds, samples)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            event_id,
            rider.id.0 as i64,
            rider.position,
            rider.name,
            rider.is_local_user,
            rider.duration_samples,
            rider.sample_interval_seconds,
            samples.compressed_data,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_race() -> RaceRecord {
        let mut race = RaceRecord::new("evt-42", "Crit City");
        race.riders = vec![
            RiderSeries::new(RiderId(2), "Second", 2).with_distance(vec![0.0, 0.01, 0.02]),
            RiderSeries::new(RiderId(1), "First", 1)
                .with_distance(vec![0.0, 0.012, 0.024])
                .with_power(vec![250.0, 260.0, 270.0])
                .local_user(),
        ];
        race
    }

    #[test]
    fn test_compression_round_trip() {
        let rider = RiderSeries::new(RiderId(1), "A", 1)
            .with_distance((0..3600).map(|i| i as f64 * 0.01).collect())
            .with_power(vec![200.0; 3600]);
        let compressed = CompressedSamples::compress(&rider).unwrap();
        assert!(compressed.compression_ratio() > 1.0);

        let mut restored = RiderSeries::new(RiderId(1), "A", 1);
        restored.duration_samples = 3600;
        CompressedSamples::restore_into(&compressed.compressed_data, &mut restored).unwrap();
        assert_eq!(restored, rider);
    }

    #[test]
    fn test_save_and_load_race() {
        let mut store = RaceStore::open_in_memory().unwrap();
        let race = sample_race();
        store.save_race(&race).unwrap();

        let loaded = store.load_race("evt-42").unwrap().unwrap();
        assert_eq!(loaded.event_name, "Crit City");
        assert_eq!(loaded.riders.len(), 2);
        assert_eq!(loaded.riders[0].id, RiderId(1));
        assert!(loaded.riders[0].is_local_user);
        assert_eq!(loaded.riders[0].power, vec![250.0, 260.0, 270.0]);
        assert!(store.load_race("missing").unwrap().is_none());
    }

    #[test]
    fn test_incremental_population() {
        let mut store = RaceStore::open_in_memory().unwrap();
        let mut header = RaceRecord::new("evt-7", "Partial");
        header.in_progress = true;
        header.progress = Some(AcquisitionProgress { fetched: 0, total: 2 });
        store.save_race(&header).unwrap();

        store
            .upsert_rider("evt-7", &RiderSeries::new(RiderId(5), "Early", 1).with_distance(vec![0.0, 0.1]))
            .unwrap();
        store
            .update_progress("evt-7", true, Some(AcquisitionProgress { fetched: 1, total: 2 }))
            .unwrap();

        let partial = store.load_race("evt-7").unwrap().unwrap();
        assert!(partial.in_progress);
        assert_eq!(partial.riders.len(), 1);
        assert_eq!(partial.progress, Some(AcquisitionProgress { fetched: 1, total: 2 }));

        // Re-fetched rider replaces the earlier version
        store
            .upsert_rider("evt-7", &RiderSeries::new(RiderId(5), "Early", 1).with_distance(vec![0.0, 0.1, 0.2]))
            .unwrap();
        store.update_progress("evt-7", false, None).unwrap();
        let complete = store.load_race("evt-7").unwrap().unwrap();
        assert!(!complete.in_progress);
        assert_eq!(complete.riders[0].distance.len(), 3);
    }

    #[test]
    fn test_upsert_requires_race() {
        let mut store = RaceStore::open_in_memory().unwrap();
        let result = store.upsert_rider("nope", &RiderSeries::new(RiderId(1), "A", 1));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert!(store.update_progress("nope", false, None).is_err());
    }

    #[test]
    fn test_list_and_delete() {
        let mut store = RaceStore::open_in_memory().unwrap();
        store.save_race(&sample_race()).unwrap();

        let races = store.list_races().unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].rider_count, 2);

        assert!(store.delete_race("evt-42").unwrap());
        assert!(!store.delete_race("evt-42").unwrap());
        assert!(store.list_races().unwrap().is_empty());
    }
}
