//! Screen frame source
//!
//! Grabs display frames at the configured rate on a dedicated thread and
//! pushes them into the coordinator. The per-platform grab lives in
//! `capture::macos` / `capture::windows`.

use crate::capture;
use crate::capture::traits::CaptureSource;
use crate::recorder::coordinator::SessionCoordinator;
use crate::recorder::sample::MediaSample;
use crate::recorder::sink::RecorderResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Consecutive failed grabs before the session is torn down.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// Captures one display as the session's video stream.
pub struct ScreenSource {
    id: String,
    display_id: u32,
    fps: u32,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ScreenSource {
    pub fn new(display_id: u32, fps: u32) -> Self {
        Self {
            id: format!("display-{display_id}"),
            display_id,
            fps: fps.max(1),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

#[async_trait]
impl CaptureSource for ScreenSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&mut self, session: Arc<SessionCoordinator>) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let running = self.running.clone();
        let display_id = self.display_id;
        let interval = Duration::from_secs_f64(1.0 / self.fps as f64);
        let frame_duration_ms = interval.as_secs_f64() * 1000.0;

        let handle = std::thread::spawn(move || {
            let mut failures = 0u32;
            while running.load(Ordering::SeqCst) {
                let frame_start = Instant::now();
                match grab_frame(display_id) {
                    Some(frame) => {
                        failures = 0;
                        session.ingest(MediaSample::video(
                            capture::process_time_ms(),
                            frame_duration_ms,
                            frame,
                        ));
                    }
                    None => {
                        failures += 1;
                        if failures >= MAX_CONSECUTIVE_FAILURES {
                            tracing::error!(
                                "Display {} stopped delivering frames",
                                display_id
                            );
                            running.store(false, Ordering::SeqCst);
                            session.abort("screen capture failed");
                            break;
                        }
                    }
                }
                if let Some(remaining) = interval.checked_sub(frame_start.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }
            tracing::info!("Screen capture thread for display {} stopped", display_id);
        });

        self.thread = Some(handle);
        tracing::info!(
            "Screen capture started for display {} at {}fps",
            self.display_id,
            self.fps
        );
        Ok(())
    }

    async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn grab_frame(display_id: u32) -> Option<Vec<u8>> {
    #[cfg(target_os = "macos")]
    {
        super::macos::screen::grab_frame(display_id)
    }

    #[cfg(target_os = "windows")]
    {
        super::windows::screen::grab_frame(display_id)
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let _ = display_id;
        None
    }
}
