//! FFmpeg invocation for editor exports
//!
//! Probes the source recording and compiles the edit list into one
//! filter_complex: per-segment trim/setpts for video, atrim/atempo for
//! audio, concatenated in output order.

use crate::export::types::{EditList, ExportError, ExportFormat, ExportOptions, ExportSegment};
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Source media properties the export needs.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: f64,
    pub has_audio: bool,
}

/// Probe a recording with ffprobe.
pub fn probe_media(path: &Path) -> Result<MediaInfo, ExportError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ExportError::Ffmpeg(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExportError::Ffmpeg(format!(
            "ffprobe failed: {}",
            stderr.trim()
        )));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| ExportError::Ffmpeg(format!("failed to parse ffprobe output: {e}")))?;

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ExportError::Ffmpeg("no streams found".to_string()))?;

    let video_stream = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("video"))
        .ok_or_else(|| ExportError::Ffmpeg("no video stream found".to_string()))?;

    let has_audio = streams
        .iter()
        .any(|s| s.get("codec_type").and_then(|t| t.as_str()) == Some("audio"));

    let width = video_stream
        .get("width")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let height = video_stream
        .get("height")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    // Frame rate arrives as "30/1" or "29.97"
    let fps = video_stream
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .map(parse_frame_rate)
        .unwrap_or(0.0);

    let duration_ms = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
        * 1000.0;

    Ok(MediaInfo {
        width,
        height,
        fps,
        duration_ms,
        has_audio,
    })
}

fn parse_frame_rate(raw: &str) -> f64 {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().unwrap_or(0.0);
        let den: f64 = den.parse().unwrap_or(1.0);
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    } else {
        raw.parse().unwrap_or(0.0)
    }
}

/// Build an atempo filter chain for arbitrary speed changes.
/// atempo only accepts 0.5-2.0, so larger changes are chained.
fn build_atempo_chain(time_scale: f64) -> String {
    if (time_scale - 1.0).abs() < 0.01 {
        return "anull".to_string();
    }

    let mut remaining = time_scale;
    let mut filters = Vec::new();

    while remaining > 2.0 {
        filters.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        filters.push("atempo=0.5".to_string());
        remaining *= 2.0;
    }

    if (remaining - 1.0).abs() > 0.01 {
        filters.push(format!("atempo={:.4}", remaining));
    }

    if filters.is_empty() {
        "anull".to_string()
    } else {
        filters.join(",")
    }
}

/// Build the filter_complex chain for the video segments, returning the
/// filter text and the final output label.
fn build_video_filter(segments: &[ExportSegment], input_index: usize) -> (String, String) {
    let mut filters = Vec::new();
    let mut concat_inputs = Vec::new();

    for (i, seg) in segments.iter().enumerate() {
        let start = seg.source_start_secs();
        let end = seg.source_end_secs();
        let label = format!("v{}", i);

        let filter = if (seg.time_scale - 1.0).abs() < 0.01 {
            format!(
                "[{}:v]trim=start={}:end={},setpts=PTS-STARTPTS[{}]",
                input_index, start, end, label
            )
        } else {
            format!(
                "[{}:v]trim=start={}:end={},setpts=(PTS-STARTPTS)/{}[{}]",
                input_index, start, end, seg.time_scale, label
            )
        };
        filters.push(filter);
        concat_inputs.push(format!("[{}]", label));
    }

    let output_label = if segments.len() > 1 {
        filters.push(format!(
            "{}concat=n={}:v=1:a=0[vconcat]",
            concat_inputs.join(""),
            segments.len()
        ));
        "vconcat".to_string()
    } else {
        "v0".to_string()
    };

    (filters.join(";"), output_label)
}

/// Build the filter_complex chain for the audio segments.
fn build_audio_filter(segments: &[ExportSegment], input_index: usize) -> (String, String) {
    let mut filters = Vec::new();
    let mut concat_inputs = Vec::new();

    for (i, seg) in segments.iter().enumerate() {
        let start = seg.source_start_secs();
        let end = seg.source_end_secs();
        let label = format!("a{}", i);

        let atempo = build_atempo_chain(seg.time_scale);
        filters.push(format!(
            "[{}:a]atrim=start={}:end={},asetpts=PTS-STARTPTS,{}[{}]",
            input_index, start, end, atempo, label
        ));
        concat_inputs.push(format!("[{}]", label));
    }

    let output_label = if segments.len() > 1 {
        filters.push(format!(
            "{}concat=n={}:v=0:a=1[aconcat]",
            concat_inputs.join(""),
            segments.len()
        ));
        "aconcat".to_string()
    } else {
        "a0".to_string()
    };

    (filters.join(";"), output_label)
}

/// Spawn the export encoder for one recording with its edits applied.
///
/// Progress is reported on stdout via `-progress pipe:1`; the caller
/// owns the child.
pub fn spawn_export(
    input: &Path,
    info: &MediaInfo,
    options: &ExportOptions,
    edits: &EditList,
) -> Result<Child, ExportError> {
    if edits.segments.is_empty() {
        return Err(ExportError::InvalidConfig("no segments to export".to_string()));
    }
    for seg in &edits.segments {
        if seg.source_end_ms <= seg.source_start_ms {
            return Err(ExportError::InvalidConfig(format!(
                "segment ends at {}ms before it starts at {}ms",
                seg.source_end_ms, seg.source_start_ms
            )));
        }
        if seg.time_scale <= 0.0 {
            return Err(ExportError::InvalidConfig(format!(
                "invalid time scale {}",
                seg.time_scale
            )));
        }
    }

    let output_width = options.width.unwrap_or(info.width);
    let output_height = options.height.unwrap_or(info.height);
    let output_fps = options.fps.unwrap_or(info.fps.round() as u32).max(1);
    let include_audio =
        options.include_audio && info.has_audio && options.format != ExportFormat::Gif;

    // Keep stderr quiet: progress is read from stdout while stderr stays
    // buffered until the exit status is collected.
    let mut args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
    ];
    args.push(input.to_string_lossy().to_string());

    let mut filter_parts = Vec::new();

    let (video_filter, video_label) = build_video_filter(&edits.segments, 0);
    filter_parts.push(video_filter);

    // Scaling preserves aspect ratio and pads; always normalize fps.
    let scale_filter = if info.width != output_width || info.height != output_height {
        format!(
            "[{}]scale={}:{}:force_original_aspect_ratio=decrease,pad={}:{}:(ow-iw)/2:(oh-ih)/2:black,fps={}[vout]",
            video_label, output_width, output_height, output_width, output_height, output_fps
        )
    } else {
        format!("[{}]fps={}[vout]", video_label, output_fps)
    };
    filter_parts.push(scale_filter);

    if include_audio {
        let (audio_filter, audio_label) = build_audio_filter(&edits.segments, 0);
        filter_parts.push(audio_filter);
        if audio_label != "aout" {
            filter_parts.push(format!("[{}]anull[aout]", audio_label));
        }
    }

    args.extend(["-filter_complex".to_string(), filter_parts.join(";")]);
    args.extend(["-map".to_string(), "[vout]".to_string()]);
    if include_audio {
        args.extend(["-map".to_string(), "[aout]".to_string()]);
    }

    match options.format {
        ExportFormat::Mp4 => {
            args.extend([
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                options.quality.h264_preset().to_string(),
                "-crf".to_string(),
                options.quality.crf().to_string(),
                "-pix_fmt".to_string(),
                "yuv420p".to_string(),
                "-movflags".to_string(),
                "+faststart".to_string(),
            ]);
        }
        ExportFormat::Webm => {
            args.extend([
                "-c:v".to_string(),
                "libvpx-vp9".to_string(),
                "-crf".to_string(),
                options.quality.crf().to_string(),
                "-b:v".to_string(),
                "0".to_string(),
            ]);
        }
        ExportFormat::Gif => {
            args.extend(["-f".to_string(), "gif".to_string()]);
        }
    }

    if include_audio {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
        ]);
    }

    // Progress output for tracking
    args.extend(["-progress".to_string(), "pipe:1".to_string()]);
    args.push(options.output_path.clone());

    tracing::info!("Starting FFmpeg export: {:?}", args);

    let child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExportError::Ffmpeg(format!("failed to start FFmpeg: {e}")))?;

    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_chain_normal_speed_is_identity() {
        assert_eq!(build_atempo_chain(1.0), "anull");
    }

    #[test]
    fn atempo_chain_2x() {
        assert!(build_atempo_chain(2.0).contains("atempo=2"));
    }

    #[test]
    fn atempo_chain_4x_is_chained() {
        // 4x speed needs atempo=2.0,atempo=2.0
        let chain = build_atempo_chain(4.0);
        assert_eq!(chain.matches("atempo=2.0").count(), 2);
    }

    #[test]
    fn atempo_chain_half_speed() {
        assert!(build_atempo_chain(0.5).contains("atempo=0.5"));
    }

    #[test]
    fn video_filter_single_segment() {
        let segments = vec![ExportSegment {
            source_start_ms: 1000,
            source_end_ms: 5000,
            time_scale: 1.0,
        }];
        let (filter, label) = build_video_filter(&segments, 0);
        assert!(filter.contains("trim=start=1:end=5"));
        assert_eq!(label, "v0");
    }

    #[test]
    fn video_filter_concatenates_segments() {
        let segments = vec![
            ExportSegment {
                source_start_ms: 0,
                source_end_ms: 2000,
                time_scale: 1.0,
            },
            ExportSegment {
                source_start_ms: 5000,
                source_end_ms: 8000,
                time_scale: 1.0,
            },
        ];
        let (filter, label) = build_video_filter(&segments, 0);
        assert!(filter.contains("concat=n=2"));
        assert_eq!(label, "vconcat");
    }

    #[test]
    fn video_filter_applies_speed_via_setpts() {
        let segments = vec![ExportSegment {
            source_start_ms: 0,
            source_end_ms: 4000,
            time_scale: 2.0,
        }];
        let (filter, _) = build_video_filter(&segments, 0);
        assert!(filter.contains("setpts=(PTS-STARTPTS)/2"));
    }

    #[test]
    fn audio_filter_pairs_atrim_with_atempo() {
        let segments = vec![ExportSegment {
            source_start_ms: 0,
            source_end_ms: 4000,
            time_scale: 2.0,
        }];
        let (filter, label) = build_audio_filter(&segments, 0);
        assert!(filter.contains("atrim=start=0:end=4"));
        assert!(filter.contains("atempo=2"));
        assert_eq!(label, "a0");
    }

    #[test]
    fn parse_frame_rate_accepts_rationals() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), 25.0);
        assert_eq!(parse_frame_rate("30/0"), 0.0);
    }
}
