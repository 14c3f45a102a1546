//! Recording preview thumbnails
//!
//! Decodes a single frame of a finished recording with FFmpeg and writes
//! it as a PNG next to the media file.

use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// Width thumbnails are scaled down to.
pub const THUMBNAIL_WIDTH: u32 = 320;

/// Thumbnail generation errors
#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("PNG encoding error: {0}")]
    Png(#[from] png::EncodingError),
}

/// Extract the first frame of `video`, scale it down and write it to
/// `out` as a PNG.
pub async fn generate(video: &Path, out: &Path) -> Result<(), ThumbnailError> {
    let (src_width, src_height) = probe_dimensions(video).await?;
    let (width, height) = thumbnail_size(src_width, src_height, THUMBNAIL_WIDTH);

    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(video)
        .args([
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={width}:{height}"),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-",
        ])
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ThumbnailError::Ffmpeg(format!(
            "frame extraction failed: {}",
            stderr.trim()
        )));
    }

    let expected = (width * height * 4) as usize;
    if output.stdout.len() < expected {
        return Err(ThumbnailError::Ffmpeg(format!(
            "short frame read: {} of {} bytes",
            output.stdout.len(),
            expected
        )));
    }

    let file = std::fs::File::create(out)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&output.stdout[..expected])?;

    tracing::debug!("Wrote thumbnail {:?} ({}x{})", out, width, height);
    Ok(())
}

/// Probe the source dimensions with ffprobe.
async fn probe_dimensions(video: &Path) -> Result<(u32, u32), ThumbnailError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0",
        ])
        .arg(video)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ThumbnailError::Ffmpeg(format!(
            "ffprobe failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut parts = stdout.trim().split(',');
    let width = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| ThumbnailError::Ffmpeg("invalid probe width".to_string()))?;
    let height = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| ThumbnailError::Ffmpeg("invalid probe height".to_string()))?;
    Ok((width, height))
}

/// Fit into `max_width` preserving aspect ratio, keeping both dimensions
/// even for the scaler.
fn thumbnail_size(src_width: u32, src_height: u32, max_width: u32) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (max_width, max_width * 9 / 16);
    }
    let width = src_width.min(max_width);
    let height = (src_height as u64 * width as u64 / src_width as u64) as u32;
    (width.max(2) & !1, height.max(2) & !1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_size_preserves_aspect_ratio() {
        let (w, h) = thumbnail_size(1920, 1080, 320);
        assert_eq!((w, h), (320, 180));
    }

    #[test]
    fn thumbnail_size_never_upscales() {
        let (w, h) = thumbnail_size(160, 90, 320);
        assert_eq!((w, h), (160, 90));
    }

    #[test]
    fn thumbnail_size_is_even() {
        let (w, h) = thumbnail_size(1919, 1079, 320);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }

    #[test]
    fn thumbnail_size_survives_degenerate_sources() {
        let (w, h) = thumbnail_size(0, 0, 320);
        assert!(w > 0 && h > 0);
    }
}
