//! Webcam capture using nokhwa
//!
//! Camera enumeration plus the webcam frame source that drives the
//! webcam-bubble recording mode: the same coordinator records a
//! camera-only clip with the webcam as its video stream.

use crate::capture;
use crate::capture::traits::{CameraInfo, CaptureSource, Resolution};
use crate::recorder::coordinator::SessionCoordinator;
use crate::recorder::sample::MediaSample;
use crate::recorder::sink::{RecorderError, RecorderResult};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Get the list of available cameras.
pub fn get_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| {
                let id = match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                };

                // Common capture resolutions; the actual format is
                // negotiated when the camera is opened.
                let resolutions = vec![
                    Resolution {
                        width: 1920,
                        height: 1080,
                    },
                    Resolution {
                        width: 1280,
                        height: 720,
                    },
                    Resolution {
                        width: 640,
                        height: 480,
                    },
                ];

                CameraInfo {
                    id,
                    name: info.human_name().to_string(),
                    supported_resolutions: resolutions,
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Check if camera permission is granted.
pub fn has_camera_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        nokhwa::nokhwa_check()
    }

    #[cfg(not(target_os = "macos"))]
    {
        // Other platforms prompt (or not) when the device is opened.
        true
    }
}

/// Request camera permission.
pub fn request_camera_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        nokhwa::nokhwa_initialize(|granted| {
            tracing::info!("Camera permission granted: {}", granted);
        });
        nokhwa::nokhwa_check()
    }

    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

fn camera_index(device_id: Option<&str>) -> CameraIndex {
    match device_id {
        Some(id) => {
            if let Ok(index) = id.parse::<u32>() {
                CameraIndex::Index(index)
            } else {
                CameraIndex::String(id.to_string())
            }
        }
        None => CameraIndex::Index(0),
    }
}

fn requested_format() -> RequestedFormat<'static> {
    RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution)
}

/// Resolve the frame size the camera will deliver.
///
/// Opens the device with the same format request the source uses, so the
/// sink's video input can be sized before capture begins.
pub fn probe_frame_size(device_id: Option<&str>) -> RecorderResult<(u32, u32)> {
    let camera = Camera::new(camera_index(device_id), requested_format()).map_err(|e| {
        RecorderError::SinkInitFailure(format!("failed to open camera: {e}"))
    })?;
    let resolution = camera.resolution();
    Ok((resolution.width(), resolution.height()))
}

/// Webcam capture source.
pub struct WebcamSource {
    id: String,
    device_id: Option<String>,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WebcamSource {
    pub fn new(device_id: Option<String>) -> Self {
        Self {
            id: "webcam".to_string(),
            device_id,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

/// Consecutive failed frames before the session is torn down.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

#[async_trait]
impl CaptureSource for WebcamSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&mut self, session: Arc<SessionCoordinator>) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        let index = camera_index(self.device_id.as_deref());

        // The camera is opened inside the thread: nokhwa's stream is tied
        // to the thread that opened it on some backends.
        let handle = std::thread::spawn(move || {
            let mut camera = match Camera::new(index.clone(), requested_format()) {
                Ok(camera) => camera,
                Err(e) => {
                    session.abort(&format!("failed to open camera {index:?}: {e}"));
                    return;
                }
            };
            if let Err(e) = camera.open_stream() {
                session.abort(&format!("failed to open camera stream: {e}"));
                return;
            }

            let format = camera.camera_format();
            let frame_duration_ms = 1000.0 / format.frame_rate().max(1) as f64;
            tracing::info!(
                "Webcam opened: {}x{} @ {}fps",
                format.resolution().width(),
                format.resolution().height(),
                format.frame_rate()
            );

            let mut failures = 0u32;
            while running.load(Ordering::SeqCst) {
                // frame() blocks until the camera delivers; the device
                // paces the loop.
                match camera.frame().and_then(|f| f.decode_image::<RgbAFormat>()) {
                    Ok(image) => {
                        failures = 0;
                        session.ingest(MediaSample::video(
                            capture::process_time_ms(),
                            frame_duration_ms,
                            image.into_raw(),
                        ));
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::debug!("Failed to capture webcam frame: {:?}", e);
                        if failures >= MAX_CONSECUTIVE_FAILURES {
                            running.store(false, Ordering::SeqCst);
                            session.abort("webcam stopped delivering frames");
                            break;
                        }
                    }
                }
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }
            tracing::info!("Webcam capture thread stopped");
        });

        self.thread = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
