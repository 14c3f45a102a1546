//! Recording state types
//!
//! The session state machine, capture configuration, and the UI-facing
//! status snapshot.

use serde::{Deserialize, Serialize};

/// Phase of the recording session state machine.
///
/// `Idle -> Capturing -> {Paused <-> Capturing} -> Finalizing -> Idle`.
/// Transitions attempted from a phase that does not permit them are
/// idempotent no-ops, matching the toggle-button idiom of the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderPhase {
    /// No recording in progress
    Idle,
    /// Samples are being ingested and forwarded
    Capturing,
    /// Session is paused; incoming samples are discarded
    Paused,
    /// Sinks are flushing and the container is being completed
    Finalizing,
}

impl Default for RecorderPhase {
    fn default() -> Self {
        Self::Idle
    }
}

/// What the video stream records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum VideoInput {
    /// Capture a display
    Screen { display_id: u32 },
    /// Capture a camera (the webcam-bubble mode)
    Webcam { device_id: Option<String> },
}

/// Encoding quality tier for the live capture encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Standard,
    High,
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Standard
    }
}

impl QualityTier {
    /// CRF value for the H.264 track encoder. Lower is higher quality.
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 28,
            QualityTier::Standard => 23,
            QualityTier::High => 18,
        }
    }
}

/// Configuration for starting a recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Video source: a display or a webcam
    pub video: VideoInput,

    /// Whether to capture the microphone
    pub capture_microphone: bool,

    /// Microphone device ID (None = default input device)
    pub microphone_device_id: Option<String>,

    /// Target video frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Encoding quality tier
    #[serde(default)]
    pub quality: QualityTier,

    /// Directory recordings are written to
    pub recordings_dir: String,
}

fn default_fps() -> u32 {
    30
}

/// UI-facing snapshot of the recording session, polled on a short
/// interval by the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    /// Current phase
    pub phase: RecorderPhase,

    /// Elapsed recording time in milliseconds, excluding paused time
    pub duration_ms: f64,

    /// Video samples dropped due to sink backpressure
    pub dropped_video: u64,

    /// Audio samples dropped due to sink backpressure
    pub dropped_audio: u64,
}

/// A finalized recording as reported by the coordinator.
///
/// The coordinator supplies the measured duration; the caller builds the
/// persisted library record (and its preview image) from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedRecording {
    /// Path of the container file
    pub path: String,

    /// Final duration in milliseconds, excluding paused time
    pub duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_order_by_crf() {
        assert!(QualityTier::High.crf() < QualityTier::Standard.crf());
        assert!(QualityTier::Standard.crf() < QualityTier::Low.crf());
    }

    #[test]
    fn capture_config_defaults() {
        let config: CaptureConfig = serde_json::from_str(
            r#"{
                "video": { "type": "screen", "displayId": 1 },
                "captureMicrophone": false,
                "microphoneDeviceId": null,
                "recordingsDir": "/tmp/recordings"
            }"#,
        )
        .unwrap();

        assert_eq!(config.fps, 30);
        assert_eq!(config.quality, QualityTier::Standard);
        assert!(matches!(config.video, VideoInput::Screen { display_id: 1 }));
    }
}
