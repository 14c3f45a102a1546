//! Recording library persistence
//!
//! An ordered list of completed recordings (newest first) stored as
//! `library.json` in the recordings directory. Records are created only
//! for successfully finalized recordings; deleting a record also removes
//! its media file and thumbnail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Index file name inside the recordings directory.
pub const LIBRARY_FILE: &str = "library.json";

/// Library-related errors
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Recording not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}

/// Persisted metadata for one completed recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRecord {
    /// Stable record ID
    pub id: Uuid,

    /// Media file name within the recordings directory
    pub file_name: String,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Measured duration in milliseconds, excluding paused time
    pub duration_ms: f64,

    /// Thumbnail file name within the recordings directory, if generated
    pub thumbnail: Option<String>,
}

impl RecordingRecord {
    pub fn new(file_name: String, duration_ms: f64, thumbnail: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            created_at: Utc::now(),
            duration_ms,
            thumbnail,
        }
    }
}

/// The recording library for one recordings directory.
pub struct RecordingLibrary {
    root: PathBuf,
    records: Vec<RecordingRecord>,
}

impl RecordingLibrary {
    /// Open the library in `root`, creating the directory if needed.
    pub fn open(root: &Path) -> Result<Self, LibraryError> {
        fs::create_dir_all(root)?;
        let index = root.join(LIBRARY_FILE);
        let records = if index.exists() {
            serde_json::from_str(&fs::read_to_string(&index)?)?
        } else {
            Vec::new()
        };
        Ok(Self {
            root: root.to_path_buf(),
            records,
        })
    }

    /// Records, newest first.
    pub fn records(&self) -> &[RecordingRecord] {
        &self.records
    }

    /// Absolute path of a record's media file.
    pub fn media_path(&self, record: &RecordingRecord) -> PathBuf {
        self.root.join(&record.file_name)
    }

    /// Insert a freshly finished recording at the front.
    pub fn add(&mut self, record: RecordingRecord) -> Result<(), LibraryError> {
        tracing::info!("Adding recording to library: {}", record.file_name);
        self.records.insert(0, record);
        self.save()
    }

    /// Remove a record, deleting its media file and thumbnail.
    pub fn remove(&mut self, id: Uuid) -> Result<RecordingRecord, LibraryError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(LibraryError::NotFound(id))?;
        let record = self.records.remove(index);

        remove_if_present(&self.root.join(&record.file_name));
        if let Some(thumbnail) = &record.thumbnail {
            remove_if_present(&self.root.join(thumbnail));
        }

        self.save()?;
        tracing::info!("Removed recording from library: {}", record.file_name);
        Ok(record)
    }

    /// Rename a record's media file on disk and in the index.
    pub fn rename(&mut self, id: Uuid, new_file_name: &str) -> Result<RecordingRecord, LibraryError> {
        if new_file_name.is_empty() || new_file_name.contains(['/', '\\']) {
            return Err(LibraryError::InvalidFileName(new_file_name.to_string()));
        }

        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(LibraryError::NotFound(id))?;

        let from = self.root.join(&record.file_name);
        let to = self.root.join(new_file_name);
        fs::rename(&from, &to)?;
        record.file_name = new_file_name.to_string();
        let updated = record.clone();

        self.save()?;
        Ok(updated)
    }

    fn save(&self) -> Result<(), LibraryError> {
        let payload = serde_json::to_string_pretty(&self.records)?;
        fs::write(self.root.join(LIBRARY_FILE), payload)?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record_with_file(root: &Path, name: &str) -> RecordingRecord {
        fs::write(root.join(name), b"media").unwrap();
        RecordingRecord::new(name.to_string(), 1500.0, None)
    }

    #[test]
    fn records_are_ordered_newest_first() {
        let dir = tempdir().unwrap();
        let mut library = RecordingLibrary::open(dir.path()).unwrap();

        library
            .add(record_with_file(dir.path(), "first.mp4"))
            .unwrap();
        library
            .add(record_with_file(dir.path(), "second.mp4"))
            .unwrap();

        let names: Vec<&str> = library.records().iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["second.mp4", "first.mp4"]);
    }

    #[test]
    fn library_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let record = {
            let mut library = RecordingLibrary::open(dir.path()).unwrap();
            let record = record_with_file(dir.path(), "clip.mp4");
            library.add(record.clone()).unwrap();
            record
        };

        let reloaded = RecordingLibrary::open(dir.path()).unwrap();
        assert_eq!(reloaded.records().len(), 1);
        assert_eq!(reloaded.records()[0].id, record.id);
        assert_eq!(reloaded.records()[0].duration_ms, 1500.0);
    }

    #[test]
    fn remove_deletes_the_media_file() {
        let dir = tempdir().unwrap();
        let mut library = RecordingLibrary::open(dir.path()).unwrap();
        let record = record_with_file(dir.path(), "doomed.mp4");
        let id = record.id;
        library.add(record).unwrap();

        library.remove(id).unwrap();

        assert!(library.records().is_empty());
        assert!(!dir.path().join("doomed.mp4").exists());
    }

    #[test]
    fn remove_unknown_id_errors() {
        let dir = tempdir().unwrap();
        let mut library = RecordingLibrary::open(dir.path()).unwrap();
        assert!(matches!(
            library.remove(Uuid::new_v4()),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn rename_moves_the_file_and_updates_the_record() {
        let dir = tempdir().unwrap();
        let mut library = RecordingLibrary::open(dir.path()).unwrap();
        let record = record_with_file(dir.path(), "old.mp4");
        let id = record.id;
        library.add(record).unwrap();

        let updated = library.rename(id, "new.mp4").unwrap();

        assert_eq!(updated.file_name, "new.mp4");
        assert!(dir.path().join("new.mp4").exists());
        assert!(!dir.path().join("old.mp4").exists());
    }

    #[test]
    fn rename_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let mut library = RecordingLibrary::open(dir.path()).unwrap();
        let record = record_with_file(dir.path(), "clip.mp4");
        let id = record.id;
        library.add(record).unwrap();

        assert!(matches!(
            library.rename(id, "../escape.mp4"),
            Err(LibraryError::InvalidFileName(_))
        ));
        assert!(matches!(
            library.rename(id, ""),
            Err(LibraryError::InvalidFileName(_))
        ));
    }
}
