//! Media sample types
//!
//! Samples delivered by capture sources, tagged by stream. A sample is
//! handed to the coordinator for the duration of one `ingest` call and is
//! either forwarded to the container sink or discarded.

/// The stream a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// One timestamped media sample.
///
/// Timestamps are milliseconds on the shared process clock (see
/// `capture::process_time_ms`); the coordinator rewrites them to the
/// session-relative clock before forwarding.
#[derive(Debug)]
pub struct MediaSample {
    /// Stream this sample belongs to
    pub stream: StreamKind,

    /// Presentation timestamp in milliseconds
    pub timestamp_ms: f64,

    /// Duration covered by this sample in milliseconds
    pub duration_ms: f64,

    /// Raw payload (BGRA/RGBA pixels for video, f32le PCM for audio)
    pub payload: Vec<u8>,
}

impl MediaSample {
    /// Create a video sample.
    pub fn video(timestamp_ms: f64, duration_ms: f64, payload: Vec<u8>) -> Self {
        Self {
            stream: StreamKind::Video,
            timestamp_ms,
            duration_ms,
            payload,
        }
    }

    /// Create an audio sample.
    pub fn audio(timestamp_ms: f64, duration_ms: f64, payload: Vec<u8>) -> Self {
        Self {
            stream: StreamKind::Audio,
            timestamp_ms,
            duration_ms,
            payload,
        }
    }
}
