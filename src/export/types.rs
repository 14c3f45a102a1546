//! Export types and configuration
//!
//! Types for editor export configuration, progress tracking and error
//! handling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Mp4,
    Webm,
    Gif,
}

impl ExportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Mp4 => "mp4",
            ExportFormat::Webm => "webm",
            ExportFormat::Gif => "gif",
        }
    }
}

/// Export quality levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    Low,
    Medium,
    High,
    Lossless,
}

impl ExportQuality {
    /// CRF value for H.264/VP9 encoding. Lower = higher quality.
    pub fn crf(&self) -> u8 {
        match self {
            ExportQuality::Low => 28,
            ExportQuality::Medium => 23,
            ExportQuality::High => 18,
            // CRF 1 is visually lossless; true lossless (0) breaks
            // yuv420p scaling compatibility
            ExportQuality::Lossless => 1,
        }
    }

    /// FFmpeg preset for H.264 encoding
    pub fn h264_preset(&self) -> &'static str {
        match self {
            ExportQuality::Low => "faster",
            ExportQuality::Medium => "medium",
            ExportQuality::High => "slow",
            ExportQuality::Lossless => "veryslow",
        }
    }
}

/// A single segment to include in the export (trim/cut edits)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSegment {
    /// Start time in the source media (milliseconds)
    pub source_start_ms: u64,

    /// End time in the source media (milliseconds)
    pub source_end_ms: u64,

    /// Time scale factor (1.0 = normal, 2.0 = 2x speed, 0.5 = half)
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
}

fn default_time_scale() -> f64 {
    1.0
}

impl ExportSegment {
    /// Duration in the source media (milliseconds)
    pub fn source_duration_ms(&self) -> u64 {
        self.source_end_ms.saturating_sub(self.source_start_ms)
    }

    /// Duration in the output after time scaling (milliseconds)
    pub fn output_duration_ms(&self) -> u64 {
        (self.source_duration_ms() as f64 / self.time_scale) as u64
    }

    /// Start time in seconds for FFmpeg
    pub fn source_start_secs(&self) -> f64 {
        self.source_start_ms as f64 / 1000.0
    }

    /// End time in seconds for FFmpeg
    pub fn source_end_secs(&self) -> f64 {
        self.source_end_ms as f64 / 1000.0
    }
}

/// Ordered edit decisions applied to a recording's timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditList {
    /// Segments to include, in output order
    pub segments: Vec<ExportSegment>,
}

impl EditList {
    /// The whole source, untrimmed and at normal speed.
    pub fn full(source_duration_ms: u64) -> Self {
        Self {
            segments: vec![ExportSegment {
                source_start_ms: 0,
                source_end_ms: source_duration_ms,
                time_scale: 1.0,
            }],
        }
    }

    /// Total output duration after all edits (milliseconds)
    pub fn total_output_duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.output_duration_ms()).sum()
    }
}

/// Export configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Output format
    pub format: ExportFormat,

    /// Quality level
    pub quality: ExportQuality,

    /// Output width in pixels (None = source resolution)
    pub width: Option<u32>,

    /// Output height in pixels (None = source resolution)
    pub height: Option<u32>,

    /// Output frame rate (None = source fps)
    pub fps: Option<u32>,

    /// Output file path
    pub output_path: String,

    /// Whether to carry the recording's audio track
    pub include_audio: bool,

    /// Timeline edits (None = full source)
    pub edits: Option<EditList>,
}

/// Export progress stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ExportStage {
    /// Probing sources and building the filter graph
    Preparing,
    /// Encoding
    Encoding,
    /// Flushing the container
    Finalizing,
    /// Export completed successfully
    Complete,
    /// Export failed
    Error { message: String },
}

/// Export progress information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,

    /// Current stage
    pub stage: ExportStage,

    /// Output time encoded so far (milliseconds)
    pub processed_ms: f64,

    /// Expected output duration (milliseconds)
    pub total_ms: f64,
}

impl ExportProgress {
    pub fn preparing() -> Self {
        Self {
            percent: 0.0,
            stage: ExportStage::Preparing,
            processed_ms: 0.0,
            total_ms: 0.0,
        }
    }

    pub fn encoding(processed_ms: f64, total_ms: f64) -> Self {
        let percent = if total_ms > 0.0 {
            ((processed_ms / total_ms) * 100.0).min(99.0) as f32
        } else {
            0.0
        };
        Self {
            percent,
            stage: ExportStage::Encoding,
            processed_ms,
            total_ms,
        }
    }

    pub fn finalizing(total_ms: f64) -> Self {
        Self {
            percent: 99.0,
            stage: ExportStage::Finalizing,
            processed_ms: total_ms,
            total_ms,
        }
    }

    pub fn complete(total_ms: f64) -> Self {
        Self {
            percent: 100.0,
            stage: ExportStage::Complete,
            processed_ms: total_ms,
            total_ms,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            percent: 0.0,
            stage: ExportStage::Error { message },
            processed_ms: 0.0,
            total_ms: 0.0,
        }
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Source recording not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Export cancelled")]
    Cancelled,

    #[error("An export is already in progress")]
    AlreadyRunning,

    #[error("No export in progress")]
    NotRunning,
}

impl From<ExportError> for String {
    fn from(e: ExportError) -> String {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_durations_respect_time_scale() {
        let segment = ExportSegment {
            source_start_ms: 1000,
            source_end_ms: 5000,
            time_scale: 2.0,
        };
        assert_eq!(segment.source_duration_ms(), 4000);
        assert_eq!(segment.output_duration_ms(), 2000);
    }

    #[test]
    fn edit_list_sums_output_durations() {
        let edits = EditList {
            segments: vec![
                ExportSegment {
                    source_start_ms: 0,
                    source_end_ms: 2000,
                    time_scale: 1.0,
                },
                ExportSegment {
                    source_start_ms: 4000,
                    source_end_ms: 8000,
                    time_scale: 2.0,
                },
            ],
        };
        assert_eq!(edits.total_output_duration_ms(), 4000);
    }

    #[test]
    fn time_scale_defaults_to_normal_speed() {
        let segment: ExportSegment =
            serde_json::from_str(r#"{"sourceStartMs": 0, "sourceEndMs": 1000}"#).unwrap();
        assert_eq!(segment.time_scale, 1.0);
    }
}
