//! Container sink
//!
//! A recording session writes into a single container file through two
//! stream inputs (video, audio). Each input is a bounded, non-blocking
//! handoff to an ffmpeg track encoder; readiness reflects queue depth so
//! the coordinator can drop on backpressure instead of blocking a capture
//! callback. Finalize stream-copies the encoded tracks into the output
//! container, offset by each track's first rebased timestamp.

use crate::capture;
use crate::recorder::sample::{MediaSample, StreamKind};
use crate::recorder::state::{CaptureConfig, QualityTier, VideoInput};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by recording operations.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No capture target: {0}")]
    NoCaptureTarget(String),

    #[error("Sink init failure: {0}")]
    SinkInitFailure(String),

    #[error("Finalize failure: {0}")]
    FinalizeFailure(String),

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recording operations.
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Error returned by a sink input for a single rejected sample.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("input is not accepting more data")]
    NotReady,

    #[error("input is closed")]
    Closed,
}

/// Geometry and rate of the raw video track fed to the sink.
#[derive(Debug, Clone)]
pub struct VideoTrackFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// ffmpeg rawvideo pixel format of incoming payloads ("bgra", "rgba")
    pub pixel_format: &'static str,
}

/// Format of the raw PCM audio track fed to the sink.
#[derive(Debug, Clone)]
pub struct AudioTrackFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// The container/multiplexer a session writes into.
///
/// Two stream inputs share one output target. Appends must carry
/// non-decreasing per-stream timestamps and must only happen while the
/// input reports ready.
#[async_trait]
pub trait ContainerSink: Send {
    /// Path of the container file this sink produces.
    fn output_path(&self) -> &Path;

    /// Whether the container has an input for the given stream.
    fn accepts(&self, stream: StreamKind) -> bool;

    /// Readiness flag for the given stream input.
    fn is_ready(&self, stream: StreamKind) -> bool;

    /// Append a sample to its stream input.
    fn append(&mut self, sample: MediaSample) -> Result<(), SinkError>;

    /// Signal that no more samples will arrive on either input.
    fn finish_input(&mut self);

    /// Complete the container, consuming the sink.
    async fn finalize(self: Box<Self>) -> RecorderResult<PathBuf>;

    /// Tear down without finalizing, removing anything written so far.
    fn discard(self: Box<Self>);
}

/// Opens container sinks for new recording sessions.
pub trait SinkFactory: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> RecorderResult<Box<dyn ContainerSink>>;
}

/// Samples queued per track input before the input reports not-ready.
const TRACK_QUEUE_CAPACITY: usize = 64;

/// Upper bound on the finalize mux pass.
const MUX_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounded, non-blocking handoff between `append` and a track's writer
/// thread. Depth is tracked alongside the channel so readiness can be
/// answered without touching it.
struct BoundedFeed {
    tx: Option<SyncSender<Vec<u8>>>,
    depth: Arc<AtomicUsize>,
    capacity: usize,
}

impl BoundedFeed {
    fn new(capacity: usize) -> (Self, Receiver<Vec<u8>>, Arc<AtomicUsize>) {
        let (tx, rx) = std::sync::mpsc::sync_channel(capacity);
        let depth = Arc::new(AtomicUsize::new(0));
        let feed = Self {
            tx: Some(tx),
            depth: depth.clone(),
            capacity,
        };
        (feed, rx, depth)
    }

    fn is_ready(&self) -> bool {
        self.tx.is_some() && self.depth.load(Ordering::Acquire) < self.capacity
    }

    fn push(&self, payload: Vec<u8>) -> Result<(), SinkError> {
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        self.depth.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Err(SinkError::NotReady)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Err(SinkError::Closed)
            }
        }
    }

    fn close(&mut self) {
        self.tx.take();
    }
}

/// A finished track: its encoded file plus the timing the mux pass needs.
struct TrackFile {
    path: PathBuf,
    first_ts_ms: f64,
    samples: u64,
}

/// One encoded track: an ffmpeg child consuming raw samples on stdin,
/// fed by a dedicated writer thread behind a bounded queue.
struct TrackEncoder {
    stream: StreamKind,
    path: PathBuf,
    feed: BoundedFeed,
    writer: Option<std::thread::JoinHandle<()>>,
    child: Option<Child>,
    first_ts_ms: Option<f64>,
    last_ts_ms: f64,
    samples: u64,
}

impl TrackEncoder {
    fn spawn(stream: StreamKind, path: PathBuf, args: Vec<String>) -> RecorderResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RecorderError::SinkInitFailure(format!(
                    "failed to start ffmpeg for the {stream} track: {e}"
                ))
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            RecorderError::SinkInitFailure(format!("failed to open {stream} encoder stdin"))
        })?;

        let (feed, rx, depth) = BoundedFeed::new(TRACK_QUEUE_CAPACITY);
        let writer = std::thread::spawn(move || {
            for chunk in rx {
                let result = stdin.write_all(&chunk);
                depth.fetch_sub(1, Ordering::AcqRel);
                if result.is_err() {
                    // Encoder went away; remaining appends surface as drops.
                    break;
                }
            }
            // Dropping stdin signals EOF to the encoder.
        });

        tracing::info!("Started {} track encoder: {:?}", stream, path);

        Ok(Self {
            stream,
            path,
            feed,
            writer: Some(writer),
            child: Some(child),
            first_ts_ms: None,
            last_ts_ms: 0.0,
            samples: 0,
        })
    }

    fn append(&mut self, sample: MediaSample) -> Result<(), SinkError> {
        debug_assert!(sample.timestamp_ms >= self.last_ts_ms);
        self.feed.push(sample.payload)?;
        if self.first_ts_ms.is_none() {
            self.first_ts_ms = Some(sample.timestamp_ms);
        }
        self.last_ts_ms = sample.timestamp_ms;
        self.samples += 1;
        Ok(())
    }

    fn finish(&mut self) {
        self.feed.close();
    }

    /// Join the writer and wait for the encoder to exit. Blocking.
    fn wait(mut self) -> RecorderResult<TrackFile> {
        self.finish();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(child) = self.child.take() {
            let output = child.wait_with_output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(RecorderError::FinalizeFailure(format!(
                    "{} track encoder exited with {}: {}",
                    self.stream,
                    output.status,
                    stderr.trim()
                )));
            }
        }
        tracing::info!(
            "{} track finished: {} samples, output: {:?}",
            self.stream,
            self.samples,
            self.path
        );
        Ok(TrackFile {
            path: self.path.clone(),
            first_ts_ms: self.first_ts_ms.unwrap_or(0.0),
            samples: self.samples,
        })
    }

    /// Kill the encoder and remove the partial track file.
    fn discard(mut self) {
        self.finish();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        let _ = fs::remove_file(&self.path);
    }
}

impl Drop for TrackEncoder {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// MP4 container sink: one H.264/AAC file per recording, encoded live
/// from the raw sample streams and muxed on finalize.
pub struct Mp4ContainerSink {
    output_path: PathBuf,
    video: TrackEncoder,
    audio: Option<TrackEncoder>,
}

impl Mp4ContainerSink {
    pub fn open(
        output_path: PathBuf,
        video_format: &VideoTrackFormat,
        audio_format: Option<&AudioTrackFormat>,
        quality: QualityTier,
    ) -> RecorderResult<Self> {
        let dir = output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "recording".to_string());

        let video_path = dir.join(format!(".{stem}-video.mp4"));
        let audio_path = dir.join(format!(".{stem}-audio.m4a"));

        let video = TrackEncoder::spawn(
            StreamKind::Video,
            video_path.clone(),
            video_encoder_args(video_format, quality, &video_path),
        )?;

        let audio = match audio_format {
            Some(format) => {
                match TrackEncoder::spawn(
                    StreamKind::Audio,
                    audio_path.clone(),
                    audio_encoder_args(format, &audio_path),
                ) {
                    Ok(encoder) => Some(encoder),
                    Err(e) => {
                        video.discard();
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            output_path,
            video,
            audio,
        })
    }
}

#[async_trait]
impl ContainerSink for Mp4ContainerSink {
    fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn accepts(&self, stream: StreamKind) -> bool {
        match stream {
            StreamKind::Video => true,
            StreamKind::Audio => self.audio.is_some(),
        }
    }

    fn is_ready(&self, stream: StreamKind) -> bool {
        match stream {
            StreamKind::Video => self.video.feed.is_ready(),
            StreamKind::Audio => self
                .audio
                .as_ref()
                .map(|track| track.feed.is_ready())
                .unwrap_or(false),
        }
    }

    fn append(&mut self, sample: MediaSample) -> Result<(), SinkError> {
        match sample.stream {
            StreamKind::Video => self.video.append(sample),
            StreamKind::Audio => match self.audio.as_mut() {
                Some(track) => track.append(sample),
                None => Err(SinkError::Closed),
            },
        }
    }

    fn finish_input(&mut self) {
        self.video.finish();
        if let Some(track) = self.audio.as_mut() {
            track.finish();
        }
    }

    async fn finalize(self: Box<Self>) -> RecorderResult<PathBuf> {
        let Mp4ContainerSink {
            output_path,
            video,
            audio,
        } = *self;

        // Drain and close the track encoders off the async runtime.
        let (video_track, audio_track) = tokio::task::spawn_blocking(
            move || -> RecorderResult<(TrackFile, Option<TrackFile>)> {
                let video_track = match video.wait() {
                    Ok(track) => track,
                    Err(e) => {
                        if let Some(audio) = audio {
                            audio.discard();
                        }
                        return Err(e);
                    }
                };
                let audio_track = match audio {
                    Some(audio) => Some(audio.wait()?),
                    None => None,
                };
                Ok((video_track, audio_track))
            },
        )
        .await
        .map_err(|e| RecorderError::FinalizeFailure(format!("finalize task failed: {e}")))??;

        if video_track.samples == 0 {
            let _ = fs::remove_file(&video_track.path);
            if let Some(track) = &audio_track {
                let _ = fs::remove_file(&track.path);
            }
            return Err(RecorderError::FinalizeFailure(
                "no video samples were captured".to_string(),
            ));
        }

        // An audio track that never received a sample muxes to silence at
        // best; drop it and ship the video-only container.
        let audio_track = match audio_track {
            Some(track) if track.samples > 0 => Some(track),
            Some(track) => {
                let _ = fs::remove_file(&track.path);
                None
            }
            None => None,
        };

        let Some(audio_track) = audio_track else {
            fs::rename(&video_track.path, &output_path).map_err(|e| {
                RecorderError::FinalizeFailure(format!(
                    "failed to move the video track into place: {e}"
                ))
            })?;
            tracing::info!("Finalized recording (video only): {:?}", output_path);
            return Ok(output_path);
        };

        let args = mux_args(&video_track, &audio_track, &output_path);
        tracing::debug!("Muxing tracks: ffmpeg {}", args.join(" "));

        let child = tokio::process::Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecorderError::FinalizeFailure(format!("failed to start mux: {e}")))?;

        let output = match tokio::time::timeout(MUX_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                cleanup_failed_output(&output_path);
                return Err(RecorderError::FinalizeFailure(format!(
                    "failed to wait for mux: {e}"
                )));
            }
            Err(_) => {
                cleanup_failed_output(&output_path);
                return Err(RecorderError::FinalizeFailure(format!(
                    "mux did not complete within {}s",
                    MUX_TIMEOUT.as_secs()
                )));
            }
        };

        if !output.status.success() {
            // Keep the encoded tracks: they are the recoverable data.
            cleanup_failed_output(&output_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecorderError::FinalizeFailure(format!(
                "mux exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let _ = fs::remove_file(&video_track.path);
        let _ = fs::remove_file(&audio_track.path);

        tracing::info!("Finalized recording: {:?}", output_path);
        Ok(output_path)
    }

    fn discard(self: Box<Self>) {
        let Mp4ContainerSink {
            output_path,
            video,
            audio,
        } = *self;

        video.discard();
        if let Some(audio) = audio {
            audio.discard();
        }
        let _ = fs::remove_file(&output_path);
        tracing::info!("Discarded recording output: {:?}", output_path);
    }
}

/// Remove a failed output artifact when nothing usable was written.
fn cleanup_failed_output(path: &Path) {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() == 0 {
            let _ = fs::remove_file(path);
        }
    }
}

fn video_encoder_args(format: &VideoTrackFormat, quality: QualityTier, out: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        format.pixel_format.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", format.width, format.height),
        "-framerate".to_string(),
        format.fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        quality.crf().to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.to_string_lossy().to_string(),
    ]
}

fn audio_encoder_args(format: &AudioTrackFormat, out: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "f32le".to_string(),
        "-ar".to_string(),
        format.sample_rate.to_string(),
        "-ac".to_string(),
        format.channels.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.to_string_lossy().to_string(),
    ]
}

/// Stream-copy the encoded tracks into the output container, offsetting
/// each by its first rebased timestamp so the shared timeline survives.
fn mux_args(video: &TrackFile, audio: &TrackFile, out: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-itsoffset".to_string(),
        format!("{:.3}", video.first_ts_ms / 1000.0),
        "-i".to_string(),
        video.path.to_string_lossy().to_string(),
        "-itsoffset".to_string(),
        format!("{:.3}", audio.first_ts_ms / 1000.0),
        "-i".to_string(),
        audio.path.to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.to_string_lossy().to_string(),
    ]
}

/// MP4 sink factory used by the production coordinator: resolves the
/// capture environment (permissions, displays, devices) and opens a
/// container sink named after the creation time.
pub struct Mp4SinkFactory;

impl SinkFactory for Mp4SinkFactory {
    fn open(&self, config: &CaptureConfig) -> RecorderResult<Box<dyn ContainerSink>> {
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return Err(RecorderError::SinkInitFailure(
                "FFmpeg not found. Please install FFmpeg.".to_string(),
            ));
        }

        let video_format = match &config.video {
            VideoInput::Screen { display_id } => {
                if !capture::has_screen_recording_permission() {
                    return Err(RecorderError::PermissionDenied(
                        "Screen recording permission not granted. Please allow it in system settings and try again.".to_string(),
                    ));
                }
                let displays = capture::get_displays();
                if displays.is_empty() {
                    return Err(RecorderError::NoCaptureTarget(
                        "no displays available for capture".to_string(),
                    ));
                }
                let display = displays
                    .iter()
                    .find(|d| d.id == *display_id)
                    .ok_or_else(|| {
                        RecorderError::NoCaptureTarget(format!("display {display_id} not found"))
                    })?;
                let (width, height) = capture::display_pixel_size(*display_id)
                    .unwrap_or((display.width, display.height));
                VideoTrackFormat {
                    width,
                    height,
                    fps: config.fps.max(1),
                    pixel_format: "bgra",
                }
            }
            VideoInput::Webcam { device_id } => {
                let (width, height) = capture::webcam::probe_frame_size(device_id.as_deref())?;
                VideoTrackFormat {
                    width,
                    height,
                    fps: config.fps.max(1),
                    pixel_format: "rgba",
                }
            }
        };

        let audio_format = if config.capture_microphone {
            let (sample_rate, channels) =
                capture::audio::default_stream_format(config.microphone_device_id.as_deref())?;
            Some(AudioTrackFormat {
                sample_rate,
                channels,
            })
        } else {
            None
        };

        let dir = PathBuf::from(&config.recordings_dir);
        fs::create_dir_all(&dir).map_err(|e| {
            RecorderError::SinkInitFailure(format!(
                "cannot create recordings directory {:?}: {e}",
                dir
            ))
        })?;

        let output_path = dir.join(recording_file_name(chrono::Local::now()));
        let sink = Mp4ContainerSink::open(
            output_path,
            &video_format,
            audio_format.as_ref(),
            config.quality,
        )?;
        Ok(Box::new(sink))
    }
}

/// Deterministic output name derived from the creation time.
pub fn recording_file_name(at: chrono::DateTime<chrono::Local>) -> String {
    format!("Recording {}.mp4", at.format("%Y-%m-%d at %H.%M.%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bounded_feed_reports_backpressure() {
        let (feed, rx, depth) = BoundedFeed::new(2);

        assert!(feed.is_ready());
        feed.push(vec![1]).unwrap();
        feed.push(vec![2]).unwrap();
        assert!(!feed.is_ready());
        assert!(matches!(feed.push(vec![3]), Err(SinkError::NotReady)));

        // Drain one entry the way the writer thread would.
        let _ = rx.recv().unwrap();
        depth.fetch_sub(1, Ordering::AcqRel);
        assert!(feed.is_ready());
        feed.push(vec![4]).unwrap();
    }

    #[test]
    fn bounded_feed_closes() {
        let (mut feed, rx, _depth) = BoundedFeed::new(4);
        feed.push(vec![0]).unwrap();
        feed.close();
        assert!(!feed.is_ready());
        assert!(matches!(feed.push(vec![1]), Err(SinkError::Closed)));
        // The queued entry is still drained by the consumer.
        assert_eq!(rx.recv().unwrap(), vec![0]);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn video_encoder_args_describe_the_raw_stream() {
        let format = VideoTrackFormat {
            width: 2560,
            height: 1440,
            fps: 30,
            pixel_format: "bgra",
        };
        let args = video_encoder_args(&format, QualityTier::High, Path::new("/tmp/v.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-pixel_format bgra"));
        assert!(joined.contains("-video_size 2560x1440"));
        assert!(joined.contains("-framerate 30"));
        assert!(joined.contains("-crf 18"));
        assert!(joined.ends_with("/tmp/v.mp4"));
    }

    #[test]
    fn audio_encoder_args_describe_the_pcm_stream() {
        let format = AudioTrackFormat {
            sample_rate: 48000,
            channels: 2,
        };
        let args = audio_encoder_args(&format, Path::new("/tmp/a.m4a"));
        let joined = args.join(" ");
        assert!(joined.contains("-f f32le"));
        assert!(joined.contains("-ar 48000"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-c:a aac"));
    }

    #[test]
    fn mux_args_offset_each_track_by_its_first_timestamp() {
        let video = TrackFile {
            path: PathBuf::from("/tmp/v.mp4"),
            first_ts_ms: 0.0,
            samples: 10,
        };
        let audio = TrackFile {
            path: PathBuf::from("/tmp/a.m4a"),
            first_ts_ms: 5.0,
            samples: 20,
        };
        let args = mux_args(&video, &audio, Path::new("/tmp/out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-itsoffset 0.000 -i /tmp/v.mp4"));
        assert!(joined.contains("-itsoffset 0.005 -i /tmp/a.m4a"));
        assert!(joined.contains("-c copy"));
    }

    #[test]
    fn recording_file_name_is_deterministic() {
        let at = chrono::Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            recording_file_name(at),
            "Recording 2026-03-14 at 09.26.53.mp4"
        );
    }
}
