//! Library-related Tauri commands
//!
//! The library index lives inside the recordings directory, so commands
//! take the directory and operate statelessly.

use crate::library::{RecordingLibrary, RecordingRecord};
use crate::utils::error::ErrorResponse;
use std::path::Path;
use uuid::Uuid;

/// List recordings, newest first
#[tauri::command]
pub async fn list_recordings(recordings_dir: String) -> Result<Vec<RecordingRecord>, ErrorResponse> {
    let library = RecordingLibrary::open(Path::new(&recordings_dir))?;
    Ok(library.records().to_vec())
}

/// Delete a recording, removing its media file and thumbnail
#[tauri::command]
pub async fn delete_recording(
    recordings_dir: String,
    id: Uuid,
) -> Result<RecordingRecord, ErrorResponse> {
    let mut library = RecordingLibrary::open(Path::new(&recordings_dir))?;
    Ok(library.remove(id)?)
}

/// Rename a recording's media file
#[tauri::command]
pub async fn rename_recording(
    recordings_dir: String,
    id: Uuid,
    new_file_name: String,
) -> Result<RecordingRecord, ErrorResponse> {
    let mut library = RecordingLibrary::open(Path::new(&recordings_dir))?;
    Ok(library.rename(id, &new_file_name)?)
}
