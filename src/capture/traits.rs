//! Capture trait definitions
//!
//! Platform-agnostic device descriptions and the capture-source seam the
//! coordinator consumes.

use crate::recorder::coordinator::SessionCoordinator;
use crate::recorder::sink::RecorderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Information about a display/screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    /// Unique display ID
    pub id: u32,

    /// Display name
    pub name: String,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Scale factor (e.g., 2.0 for Retina)
    pub scale_factor: f64,

    /// Whether this is the primary display
    pub is_primary: bool,

    /// Refresh rate in Hz (if available)
    pub refresh_rate: Option<u32>,
}

/// Information about an audio device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDeviceInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Whether this is the default device
    pub is_default: bool,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,

    /// Supported resolutions
    pub supported_resolutions: Vec<Resolution>,
}

/// Video resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// A capture source delivers timestamped samples into the session
/// coordinator from its own thread until stopped.
///
/// Sources report fatal mid-session failures by calling
/// `SessionCoordinator::abort`; the coordinator never polls them.
#[async_trait]
pub trait CaptureSource: Send {
    /// Source identifier (e.g., "display-1", "microphone", "webcam")
    fn id(&self) -> &str;

    /// Begin delivering samples to the session.
    async fn start(&mut self, session: Arc<SessionCoordinator>) -> RecorderResult<()>;

    /// Stop delivering and release the device.
    async fn stop(&mut self);
}
