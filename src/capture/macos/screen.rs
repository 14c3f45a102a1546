//! macOS display enumeration and frame capture
//!
//! Uses CGDisplay snapshots per frame. Heavier than a ScreenCaptureKit
//! stream but dependency-light and sufficient for the capture rates the
//! recorder targets.

use crate::capture::traits::DisplayInfo;
use core_graphics::display::CGDisplay;

/// Get the list of available displays.
pub fn get_displays() -> Vec<DisplayInfo> {
    let display_ids = CGDisplay::active_displays().unwrap_or_default();

    display_ids
        .iter()
        .enumerate()
        .map(|(index, &id)| {
            let display = CGDisplay::new(id);
            let bounds = display.bounds();
            let is_main = display.is_main();

            let refresh_rate = display
                .display_mode()
                .map(|mode| mode.refresh_rate() as u32)
                .filter(|&r| r > 0);

            DisplayInfo {
                id,
                name: if is_main {
                    "Main Display".to_string()
                } else {
                    format!("Display {}", index + 1)
                },
                width: bounds.size.width as u32,
                height: bounds.size.height as u32,
                scale_factor: display.pixels_high() as f64 / bounds.size.height,
                is_primary: is_main,
                refresh_rate,
            }
        })
        .collect()
}

/// Backing-store pixel dimensions of a display (differs from the logical
/// bounds on Retina panels).
pub fn display_pixel_size(display_id: u32) -> Option<(u32, u32)> {
    let display = CGDisplay::new(display_id);
    let width = display.pixels_wide() as u32;
    let height = display.pixels_high() as u32;
    if width == 0 || height == 0 {
        None
    } else {
        Some((width, height))
    }
}

/// Capture one frame of a display as tightly packed BGRA.
pub fn grab_frame(display_id: u32) -> Option<Vec<u8>> {
    let display = CGDisplay::new(display_id);
    let image = display.image()?;

    let width = image.width() as usize;
    let height = image.height() as usize;
    let bytes_per_row = image.bytes_per_row() as usize;
    let data = image.data();
    let bytes = data.bytes();

    let row_len = width * 4;
    if bytes_per_row == row_len {
        return Some(bytes.to_vec());
    }

    // Repack: CGImage rows can carry alignment padding.
    let mut packed = Vec::with_capacity(row_len * height);
    for row in 0..height {
        let start = row * bytes_per_row;
        packed.extend_from_slice(&bytes[start..start + row_len]);
    }
    Some(packed)
}
