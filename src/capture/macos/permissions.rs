//! macOS permission handling
//!
//! Screen recording permission checks backed by CoreGraphics.

use core_graphics::access::ScreenCaptureAccess;

/// Check if screen recording permission is granted.
pub fn has_screen_recording_permission() -> bool {
    ScreenCaptureAccess::default().preflight()
}

/// Request screen recording permission.
///
/// Returns true if permission was already granted. The actual permission
/// dialog is shown by the system.
pub fn request_screen_recording_permission() -> bool {
    ScreenCaptureAccess::default().request()
}

/// Open System Settings at the Screen Recording pane.
pub fn open_screen_recording_preferences() {
    let url = "x-apple.systempreferences:com.apple.preference.security?Privacy_ScreenCapture";
    if let Ok(output) = std::process::Command::new("open").arg(url).output() {
        if !output.status.success() {
            tracing::warn!("Failed to open Screen Recording preferences");
        }
    }
}
