//! File-backed store for the cache envelope
//!
//! Provides a `CacheStore` that keeps the last successful fetch as a single
//! pretty-printed JSON file. Writes go to a temporary sibling file that is then
//! renamed over the cache file, so a reader sees either the previous envelope
//! or the new one, never a partial write.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;

use thiserror::Error;

use crate::config::CACHE_FILE_NAME;
use crate::data::CacheEnvelope;

/// Errors that can occur while reading or writing the cache file
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),

    /// Envelope could not be serialized
    #[error("Failed to serialize cache: {0}")]
    Serialize(serde_json::Error),

    /// Cache file exists but does not hold a valid envelope
    #[error("Cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Blocking cache task was cancelled or panicked
    #[error("Cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Reads and writes the cache envelope on disk
///
/// Cheap to clone; clones refer to the same file.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where the cache file is stored
    cache_dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at the given directory
    ///
    /// The directory is created on first write.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Path of the cache file
    pub fn path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }

    /// Path of the temporary file used while writing
    fn temp_path(&self) -> PathBuf {
        self.cache_dir.join(format!(".{}.tmp", CACHE_FILE_NAME))
    }

    /// Ensures the cache directory exists
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Replaces the cache file with the given envelope
    ///
    /// Callers must not write concurrently: the temporary file name is fixed.
    pub fn write(&self, envelope: &CacheEnvelope) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let json = serde_json::to_vec_pretty(envelope).map_err(CacheError::Serialize)?;

        let temp = self.temp_path();
        fs::write(&temp, json)?;
        if let Err(e) = fs::rename(&temp, self.path()) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reads the cache envelope
    ///
    /// # Returns
    /// * `Ok(Some(CacheEnvelope))` if the file exists and parses
    /// * `Ok(None)` if there is no cache file
    /// * `Err(CacheError::Corrupt)` if the file exists but cannot be parsed
    pub fn read(&self) -> Result<Option<CacheEnvelope>, CacheError> {
        let path = self.path();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { path, source })
    }

    /// Reads the envelope on the blocking thread pool
    pub async fn load(&self) -> Result<Option<CacheEnvelope>, CacheError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read()).await?
    }

    /// Writes the envelope on the blocking thread pool
    pub async fn save(&self, envelope: CacheEnvelope) -> Result<CacheEnvelope, CacheError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.write(&envelope).map(|()| envelope)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::new(temp_dir.path());
        (store, temp_dir)
    }

    fn sample_envelope(districts: &[&str]) -> CacheEnvelope {
        let records = districts
            .iter()
            .map(|d| serde_json::from_value::<Record>(json!({ "district_name": d })).unwrap())
            .collect();
        CacheEnvelope::new(records, Utc::now())
    }

    #[test]
    fn test_write_creates_file_in_cache_directory() {
        let (store, temp_dir) = create_test_store();

        store
            .write(&sample_envelope(&["AGRA"]))
            .expect("Write should succeed");

        let expected_path = temp_dir.path().join("mgnrega_data.json");
        assert!(expected_path.exists(), "Cache file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"fetchedAt\""));
        assert!(content.contains("\"count\": 1"));
        assert!(content.contains("\"AGRA\""));
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let (store, temp_dir) = create_test_store();

        store.write(&sample_envelope(&["AGRA"])).unwrap();

        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("mgnrega_data.json")]);
    }

    #[test]
    fn test_read_returns_none_for_missing_file() {
        let (store, _temp_dir) = create_test_store();

        let result = store.read().expect("Missing file is not an error");

        assert!(result.is_none(), "Should return None for missing cache");
    }

    #[test]
    fn test_read_returns_written_envelope() {
        let (store, _temp_dir) = create_test_store();
        let envelope = sample_envelope(&["AGRA", "KANPUR"]);

        store.write(&envelope).unwrap();
        let result = store.read().unwrap().expect("Should read cache");

        assert_eq!(result, envelope);
        assert_eq!(result.count, 2);
    }

    #[test]
    fn test_read_reports_corrupt_file() {
        let (store, temp_dir) = create_test_store();
        fs::write(temp_dir.path().join("mgnrega_data.json"), "{ not json").unwrap();

        let err = store.read().unwrap_err();

        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[test]
    fn test_read_rejects_envelope_without_timestamp() {
        let (store, temp_dir) = create_test_store();
        fs::write(
            temp_dir.path().join("mgnrega_data.json"),
            r#"{"count": 0, "records": []}"#,
        )
        .unwrap();

        assert!(matches!(store.read(), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_write_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache");
        let store = CacheStore::new(nested_path.clone());

        store.write(&sample_envelope(&[])).expect("Write should succeed");

        assert!(nested_path.exists(), "Nested directory should be created");
        assert!(nested_path.join("mgnrega_data.json").exists());
    }

    #[test]
    fn test_overwrite_replaces_whole_envelope() {
        let (store, _temp_dir) = create_test_store();
        let mut older = sample_envelope(&["AGRA", "KANPUR", "LUCKNOW"]);
        older.fetched_at = Utc::now() - Duration::hours(30);
        let newer = sample_envelope(&["PATNA"]);

        store.write(&older).unwrap();
        store.write(&newer).unwrap();

        let result = store.read().unwrap().unwrap();
        assert_eq!(result, newer, "Cache should contain latest envelope only");
    }

    #[tokio::test]
    async fn test_async_save_then_load() {
        let (store, _temp_dir) = create_test_store();
        let envelope = sample_envelope(&["AGRA"]);

        let saved = store.save(envelope.clone()).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(saved, envelope);
        assert_eq!(loaded, Some(envelope));
    }
}
