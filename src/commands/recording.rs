//! Recording-related Tauri commands

use crate::capture::audio::MicrophoneSource;
use crate::capture::screen::ScreenSource;
use crate::capture::webcam::WebcamSource;
use crate::capture::{self, audio, webcam, AudioDeviceInfo, CameraInfo, CaptureSource, DisplayInfo};
use crate::library::{thumbnail, RecordingLibrary, RecordingRecord};
use crate::recorder::coordinator::SessionCoordinator;
use crate::recorder::sink::{Mp4SinkFactory, RecorderError};
use crate::recorder::state::{CaptureConfig, RecorderPhase, RecorderStatus, VideoInput};
use crate::utils::error::ErrorResponse;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tauri::State;
use tokio::sync::Mutex;

/// Application state for recording
pub struct RecorderState {
    pub coordinator: Arc<SessionCoordinator>,
    sources: Mutex<Vec<Box<dyn CaptureSource>>>,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self {
            coordinator: Arc::new(SessionCoordinator::new(Box::new(Mp4SinkFactory))),
            sources: Mutex::new(Vec::new()),
        }
    }
}

/// Get the list of available displays
#[tauri::command]
pub async fn get_displays() -> Result<Vec<DisplayInfo>, ErrorResponse> {
    Ok(capture::get_displays())
}

/// Get the list of available audio input devices (microphones)
#[tauri::command]
pub async fn get_audio_devices() -> Result<Vec<AudioDeviceInfo>, ErrorResponse> {
    Ok(audio::get_audio_input_devices())
}

/// Get the list of available cameras/webcams
#[tauri::command]
pub async fn get_cameras() -> Result<Vec<CameraInfo>, ErrorResponse> {
    Ok(webcam::get_cameras())
}

/// Check if screen recording permission is granted
#[tauri::command]
pub async fn check_screen_permission() -> Result<bool, ErrorResponse> {
    Ok(capture::has_screen_recording_permission())
}

/// Request screen recording permission
#[tauri::command]
pub async fn request_screen_permission() -> Result<bool, ErrorResponse> {
    Ok(capture::request_screen_recording_permission())
}

/// Check if camera permission is granted
#[tauri::command]
pub async fn check_camera_permission() -> Result<bool, ErrorResponse> {
    Ok(webcam::has_camera_permission())
}

/// Request camera permission
#[tauri::command]
pub async fn request_camera_permission() -> Result<bool, ErrorResponse> {
    Ok(webcam::request_camera_permission())
}

/// Start recording
#[tauri::command]
pub async fn start_recording(
    state: State<'_, RecorderState>,
    config: CaptureConfig,
) -> Result<(), ErrorResponse> {
    // Holding the source list serializes start/stop against each other.
    let mut sources = state.sources.lock().await;

    state.coordinator.start(&config)?;

    let mut pending: Vec<Box<dyn CaptureSource>> = Vec::new();
    match &config.video {
        VideoInput::Screen { display_id } => {
            pending.push(Box::new(ScreenSource::new(*display_id, config.fps)));
        }
        VideoInput::Webcam { device_id } => {
            pending.push(Box::new(WebcamSource::new(device_id.clone())));
        }
    }
    if config.capture_microphone {
        pending.push(Box::new(MicrophoneSource::new(
            config.microphone_device_id.clone(),
        )));
    }

    let mut started: Vec<Box<dyn CaptureSource>> = Vec::new();
    let mut failure: Option<RecorderError> = None;
    for mut source in pending {
        match source.start(state.coordinator.clone()).await {
            Ok(()) => started.push(source),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    if let Some(e) = failure {
        for source in started.iter_mut() {
            source.stop().await;
        }
        state
            .coordinator
            .abort(&format!("capture source failed to start: {e}"));
        return Err(e.into());
    }
    *sources = started;

    // Duration ticker for observers; runs until the session leaves the
    // active phases and never touches the ingest path.
    let coordinator = state.coordinator.clone();
    tauri::async_runtime::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            if coordinator.phase() == RecorderPhase::Idle {
                break;
            }
            coordinator.publish_progress();
        }
    });

    Ok(())
}

/// Stop recording, persist the finished record and return it
#[tauri::command]
pub async fn stop_recording(
    state: State<'_, RecorderState>,
) -> Result<Option<RecordingRecord>, ErrorResponse> {
    let mut sources = state.sources.lock().await;

    let result = state.coordinator.stop().await;
    for source in sources.iter_mut() {
        source.stop().await;
    }
    sources.clear();

    let Some(finished) = result? else {
        return Ok(None);
    };

    let path = PathBuf::from(&finished.path);
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| finished.path.clone());

    // The preview is best effort; a missing thumbnail never fails the stop.
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "recording".to_string());
    let thumb_name = format!("{stem}.thumb.png");
    let thumbnail = match thumbnail::generate(&path, &dir.join(&thumb_name)).await {
        Ok(()) => Some(thumb_name),
        Err(e) => {
            tracing::warn!("Failed to generate thumbnail: {e}");
            None
        }
    };

    let record = RecordingRecord::new(file_name, finished.duration_ms, thumbnail);
    let mut library = RecordingLibrary::open(&dir)?;
    library.add(record.clone())?;

    Ok(Some(record))
}

/// Pause recording
#[tauri::command]
pub async fn pause_recording(state: State<'_, RecorderState>) -> Result<(), ErrorResponse> {
    state.coordinator.pause();
    Ok(())
}

/// Resume recording
#[tauri::command]
pub async fn resume_recording(state: State<'_, RecorderState>) -> Result<(), ErrorResponse> {
    state.coordinator.resume();
    Ok(())
}

/// Get the current recorder status (phase, duration, drop counters)
#[tauri::command]
pub async fn get_recorder_status(
    state: State<'_, RecorderState>,
) -> Result<RecorderStatus, ErrorResponse> {
    Ok(state.coordinator.status())
}
