//! Capture surface
//!
//! Device enumeration, permission checks and the capture sources that
//! feed timestamped samples into the session coordinator.

pub mod audio;
pub mod screen;
pub mod traits;
pub mod webcam;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

pub use traits::{AudioDeviceInfo, CameraInfo, CaptureSource, DisplayInfo, Resolution};

use std::sync::OnceLock;
use std::time::Instant;

static PROCESS_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process.
///
/// Every capture source timestamps its samples on this clock so the two
/// streams share a timebase the coordinator can rebase from.
pub fn process_time_ms() -> f64 {
    PROCESS_EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

/// Get the list of available displays.
pub fn get_displays() -> Vec<DisplayInfo> {
    #[cfg(target_os = "macos")]
    {
        macos::screen::get_displays()
    }

    #[cfg(target_os = "windows")]
    {
        windows::screen::get_displays()
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

/// Pixel dimensions of a display, where the backing store differs from
/// the logical bounds (Retina scaling).
pub fn display_pixel_size(display_id: u32) -> Option<(u32, u32)> {
    #[cfg(target_os = "macos")]
    {
        macos::screen::display_pixel_size(display_id)
    }

    #[cfg(target_os = "windows")]
    {
        windows::screen::display_pixel_size(display_id)
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let _ = display_id;
        None
    }
}

/// Check if screen recording permission is granted.
pub fn has_screen_recording_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::permissions::has_screen_recording_permission()
    }

    #[cfg(target_os = "windows")]
    {
        // Windows doesn't require explicit permission for screen capture
        true
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        false
    }
}

/// Request screen recording permission.
pub fn request_screen_recording_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::permissions::request_screen_recording_permission()
    }

    #[cfg(target_os = "windows")]
    {
        true
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        false
    }
}
