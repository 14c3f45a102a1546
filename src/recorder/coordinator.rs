//! Session coordinator
//!
//! Owns the recording lifecycle and the session clock. Two independent
//! capture callbacks (video, audio) deliver timestamped samples through
//! `ingest`; the coordinator rebases them onto a session-relative clock
//! anchored at the first ingested sample and forwards them to the
//! container sink, dropping on backpressure instead of blocking or
//! buffering. All mutable session state lives behind one lock; the UI
//! observes it through a polled status snapshot and broadcast events.

use crate::recorder::sample::{MediaSample, StreamKind};
use crate::recorder::sink::{ContainerSink, RecorderError, RecorderResult, SinkFactory};
use crate::recorder::state::{CaptureConfig, FinishedRecording, RecorderPhase, RecorderStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Events emitted during recording.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RecorderEvent {
    /// Recording started
    Started,
    /// Recording stopped and finalized
    Stopped,
    /// Recording paused
    Paused,
    /// Recording resumed
    Resumed,
    /// Fatal error; the session was torn down
    Error(String),
    /// Periodic duration update in milliseconds
    Progress(f64),
}

/// Upper bound on waiting for the sink to finalize. A hang here is
/// surfaced as `FinalizeFailure` rather than blocking stop() forever.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(60);

/// Mutable session record. Guarded by the coordinator's lock; producer
/// callbacks never touch it directly.
#[derive(Default)]
struct SessionInner {
    phase: RecorderPhase,
    sink: Option<Box<dyn ContainerSink>>,
    /// Source timestamp of the first ingested sample; t=0 of the output
    clock_origin_ms: Option<f64>,
    started_at: Option<Instant>,
    pause_started: Option<Instant>,
    paused_total: Duration,
    /// Frozen duration readout once stop() has been accepted
    stopped_elapsed_ms: Option<f64>,
    dropped_video: u64,
    dropped_audio: u64,
}

/// Coordinates one recording session at a time.
pub struct SessionCoordinator {
    inner: Mutex<SessionInner>,
    factory: Box<dyn SinkFactory>,
    event_tx: broadcast::Sender<RecorderEvent>,
}

impl SessionCoordinator {
    pub fn new(factory: Box<dyn SinkFactory>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(SessionInner::default()),
            factory,
            event_tx,
        }
    }

    /// Subscribe to recording events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.event_tx.subscribe()
    }

    /// Current phase of the session.
    pub fn phase(&self) -> RecorderPhase {
        self.inner.lock().phase
    }

    /// Snapshot for the UI. Cheap enough to poll on a short interval.
    pub fn status(&self) -> RecorderStatus {
        let inner = self.inner.lock();
        RecorderStatus {
            phase: inner.phase,
            duration_ms: Self::elapsed_active_ms(&inner),
            dropped_video: inner.dropped_video,
            dropped_audio: inner.dropped_audio,
        }
    }

    /// Publish a periodic duration update. Called by the status ticker,
    /// never from the ingest path.
    pub fn publish_progress(&self) {
        let duration_ms = {
            let inner = self.inner.lock();
            Self::elapsed_active_ms(&inner)
        };
        self.publish(RecorderEvent::Progress(duration_ms));
    }

    /// Start a new session.
    ///
    /// Opens the container sink for a fresh output target, resets the
    /// session clock and transitions to Capturing. A no-op unless Idle.
    /// On failure the phase stays Idle and no openable partial output is
    /// left behind (the factory cleans up what it created).
    pub fn start(&self, config: &CaptureConfig) -> RecorderResult<()> {
        let mut inner = self.inner.lock();
        if inner.phase != RecorderPhase::Idle {
            tracing::debug!("start() ignored in phase {:?}", inner.phase);
            return Ok(());
        }

        let sink = self.factory.open(config)?;
        tracing::info!("Recording started: {:?}", sink.output_path());

        inner.sink = Some(sink);
        inner.clock_origin_ms = None;
        inner.started_at = Some(Instant::now());
        inner.pause_started = None;
        inner.paused_total = Duration::ZERO;
        inner.stopped_elapsed_ms = None;
        inner.dropped_video = 0;
        inner.dropped_audio = 0;
        inner.phase = RecorderPhase::Capturing;
        drop(inner);

        self.publish(RecorderEvent::Started);
        Ok(())
    }

    /// Ingest one sample from a capture callback.
    ///
    /// Safe to call concurrently from the video and audio producers.
    /// Samples arriving outside Capturing are discarded silently; samples
    /// a not-ready sink cannot take are dropped and counted, never
    /// buffered.
    pub fn ingest(&self, sample: MediaSample) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.phase != RecorderPhase::Capturing {
            return;
        }
        let Some(sink) = inner.sink.as_mut() else {
            return;
        };
        if !sink.accepts(sample.stream) {
            return;
        }

        // First sample wins, whichever stream it belongs to.
        let origin = *inner
            .clock_origin_ms
            .get_or_insert(sample.timestamp_ms);

        let mut rebased = sample.timestamp_ms - origin;
        if rebased < 0.0 {
            // Cross-thread delivery can reorder the other stream's first
            // sample behind the origin; clamp so the sink's monotonic
            // contract holds.
            tracing::debug!(
                "{} sample predates session origin by {:.3}ms, clamping",
                sample.stream,
                -rebased
            );
            rebased = 0.0;
        }

        let stream = sample.stream;
        if !sink.is_ready(stream) {
            Self::count_drop(inner, stream);
            return;
        }

        let mut sample = sample;
        sample.timestamp_ms = rebased;
        // Readiness raced false between the check and the append; treat
        // the rejection as an ordinary drop.
        if let Err(e) = sink.append(sample) {
            tracing::debug!("append rejected: {e}");
            Self::count_drop(inner, stream);
        }
    }

    fn count_drop(inner: &mut SessionInner, stream: StreamKind) {
        let counter = match stream {
            StreamKind::Video => &mut inner.dropped_video,
            StreamKind::Audio => &mut inner.dropped_audio,
        };
        *counter += 1;
        if *counter == 1 || *counter % 100 == 0 {
            tracing::debug!("{} sink backpressure: {} samples dropped", stream, counter);
        }
    }

    /// Pause the session. Capture sources keep producing; their samples
    /// are discarded until resume. The duration readout freezes.
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if inner.phase != RecorderPhase::Capturing {
            tracing::debug!("pause() ignored in phase {:?}", inner.phase);
            return;
        }
        inner.pause_started = Some(Instant::now());
        inner.phase = RecorderPhase::Paused;
        drop(inner);

        tracing::info!("Recording paused");
        self.publish(RecorderEvent::Paused);
    }

    /// Resume a paused session, excluding the pause interval from the
    /// duration accounting. The session clock origin is untouched.
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if inner.phase != RecorderPhase::Paused {
            tracing::debug!("resume() ignored in phase {:?}", inner.phase);
            return;
        }
        if let Some(pause_started) = inner.pause_started.take() {
            inner.paused_total += pause_started.elapsed();
        }
        inner.phase = RecorderPhase::Capturing;
        drop(inner);

        tracing::info!("Recording resumed");
        self.publish(RecorderEvent::Resumed);
    }

    /// Stop the session and finalize the container.
    ///
    /// Permitted from Capturing and Paused; from Idle or Finalizing this
    /// is a no-op returning no record. The awaited finalize is bounded;
    /// a hang surfaces as `FinalizeFailure`.
    pub async fn stop(&self) -> RecorderResult<Option<FinishedRecording>> {
        let (sink, duration_ms) = {
            let mut inner = self.inner.lock();
            match inner.phase {
                RecorderPhase::Capturing | RecorderPhase::Paused => {}
                _ => {
                    tracing::debug!("stop() ignored in phase {:?}", inner.phase);
                    return Ok(None);
                }
            }
            if let Some(pause_started) = inner.pause_started.take() {
                inner.paused_total += pause_started.elapsed();
            }
            inner.phase = RecorderPhase::Finalizing;
            let duration_ms = Self::elapsed_active_ms(&inner);
            inner.stopped_elapsed_ms = Some(duration_ms);
            (inner.sink.take(), duration_ms)
        };

        let Some(mut sink) = sink else {
            self.reset();
            return Ok(None);
        };

        tracing::info!("Stopping recording after {:.0}ms", duration_ms);
        sink.finish_input();

        let result = match tokio::time::timeout(FINALIZE_TIMEOUT, sink.finalize()).await {
            Ok(result) => result,
            Err(_) => Err(RecorderError::FinalizeFailure(format!(
                "finalize did not complete within {}s",
                FINALIZE_TIMEOUT.as_secs()
            ))),
        };

        self.reset();

        match result {
            Ok(path) => {
                self.publish(RecorderEvent::Stopped);
                Ok(Some(FinishedRecording {
                    path: path.to_string_lossy().to_string(),
                    duration_ms,
                }))
            }
            Err(e) => {
                tracing::error!("Finalize failed: {e}");
                self.publish(RecorderEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Tear down the session after a fatal mid-session capture error.
    ///
    /// Forces an immediate transition to Idle, discards the partial
    /// output and notifies observers so the UI is never stuck recording.
    pub fn abort(&self, reason: &str) {
        let sink = {
            let mut inner = self.inner.lock();
            if inner.phase == RecorderPhase::Idle {
                return;
            }
            let sink = inner.sink.take();
            *inner = SessionInner::default();
            sink
        };

        tracing::error!("Recording aborted: {reason}");
        if let Some(sink) = sink {
            sink.discard();
        }
        self.publish(RecorderEvent::Error(reason.to_string()));
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped_video = inner.dropped_video;
        let dropped_audio = inner.dropped_audio;
        *inner = SessionInner::default();
        // Keep the drop counters visible until the next start().
        inner.dropped_video = dropped_video;
        inner.dropped_audio = dropped_audio;
    }

    /// Elapsed recording time in milliseconds, excluding paused time.
    fn elapsed_active_ms(inner: &SessionInner) -> f64 {
        if let Some(ms) = inner.stopped_elapsed_ms {
            return ms;
        }
        let Some(started_at) = inner.started_at else {
            return 0.0;
        };
        let gross = match (inner.phase, inner.pause_started) {
            (RecorderPhase::Paused, Some(pause_started)) => {
                pause_started.duration_since(started_at)
            }
            _ => started_at.elapsed(),
        };
        gross.saturating_sub(inner.paused_total).as_secs_f64() * 1000.0
    }

    fn publish(&self, event: RecorderEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Samples a memory sink has accepted, by stream.
    #[derive(Default)]
    struct SinkLog {
        video: Vec<f64>,
        audio: Vec<f64>,
        finished: bool,
        discarded: bool,
    }

    struct MemorySink {
        log: Arc<Mutex<SinkLog>>,
        video_ready: Arc<AtomicBool>,
        audio_ready: Arc<AtomicBool>,
        audio_enabled: bool,
        fail_finalize: bool,
        output: PathBuf,
    }

    #[async_trait]
    impl ContainerSink for MemorySink {
        fn output_path(&self) -> &Path {
            &self.output
        }

        fn accepts(&self, stream: StreamKind) -> bool {
            match stream {
                StreamKind::Video => true,
                StreamKind::Audio => self.audio_enabled,
            }
        }

        fn is_ready(&self, stream: StreamKind) -> bool {
            match stream {
                StreamKind::Video => self.video_ready.load(Ordering::SeqCst),
                StreamKind::Audio => self.audio_ready.load(Ordering::SeqCst),
            }
        }

        fn append(&mut self, sample: MediaSample) -> Result<(), crate::recorder::sink::SinkError> {
            let mut log = self.log.lock();
            match sample.stream {
                StreamKind::Video => log.video.push(sample.timestamp_ms),
                StreamKind::Audio => log.audio.push(sample.timestamp_ms),
            }
            Ok(())
        }

        fn finish_input(&mut self) {}

        async fn finalize(self: Box<Self>) -> RecorderResult<PathBuf> {
            if self.fail_finalize {
                return Err(RecorderError::FinalizeFailure("writer exploded".into()));
            }
            self.log.lock().finished = true;
            Ok(self.output)
        }

        fn discard(self: Box<Self>) {
            self.log.lock().discarded = true;
        }
    }

    struct MemoryFactory {
        log: Arc<Mutex<SinkLog>>,
        video_ready: Arc<AtomicBool>,
        audio_ready: Arc<AtomicBool>,
        open_error: Mutex<Option<RecorderError>>,
        fail_finalize: bool,
        opened: Arc<Mutex<usize>>,
    }

    impl MemoryFactory {
        fn new() -> Self {
            Self {
                log: Arc::new(Mutex::new(SinkLog::default())),
                video_ready: Arc::new(AtomicBool::new(true)),
                audio_ready: Arc::new(AtomicBool::new(true)),
                open_error: Mutex::new(None),
                fail_finalize: false,
                opened: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl SinkFactory for MemoryFactory {
        fn open(&self, config: &CaptureConfig) -> RecorderResult<Box<dyn ContainerSink>> {
            if let Some(error) = self.open_error.lock().take() {
                return Err(error);
            }
            *self.opened.lock() += 1;
            Ok(Box::new(MemorySink {
                log: self.log.clone(),
                video_ready: self.video_ready.clone(),
                audio_ready: self.audio_ready.clone(),
                audio_enabled: config.capture_microphone,
                fail_finalize: self.fail_finalize,
                output: PathBuf::from("/tmp/halo-test/recording.mp4"),
            }))
        }
    }

    fn config(audio: bool) -> CaptureConfig {
        CaptureConfig {
            video: crate::recorder::state::VideoInput::Screen { display_id: 0 },
            capture_microphone: audio,
            microphone_device_id: None,
            fps: 30,
            quality: Default::default(),
            recordings_dir: "/tmp/halo-test".to_string(),
        }
    }

    fn video_sample(ts: f64) -> MediaSample {
        MediaSample::video(ts, 33.3, vec![0u8; 16])
    }

    fn audio_sample(ts: f64) -> MediaSample {
        MediaSample::audio(ts, 10.0, vec![0u8; 16])
    }

    fn coordinator_with(factory: MemoryFactory) -> (SessionCoordinator, Arc<Mutex<SinkLog>>) {
        let log = factory.log.clone();
        (SessionCoordinator::new(Box::new(factory)), log)
    }

    #[test]
    fn first_sample_rebases_to_exactly_zero() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        coordinator.start(&config(false)).unwrap();

        coordinator.ingest(video_sample(1000.0));

        assert_eq!(log.lock().video, vec![0.0]);
    }

    #[test]
    fn origin_is_first_sample_wins_across_streams() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        coordinator.start(&config(true)).unwrap();

        coordinator.ingest(video_sample(1000.0));
        coordinator.ingest(audio_sample(1005.0));

        let log = log.lock();
        assert_eq!(log.video, vec![0.0]);
        assert_eq!(log.audio, vec![5.0]);
    }

    #[test]
    fn out_of_order_cross_stream_sample_is_clamped_to_zero() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        coordinator.start(&config(true)).unwrap();

        coordinator.ingest(audio_sample(1005.0));
        coordinator.ingest(video_sample(1000.0));

        let log = log.lock();
        assert_eq!(log.audio, vec![0.0]);
        assert_eq!(log.video, vec![0.0]);
    }

    #[test]
    fn paused_samples_never_reach_the_sink() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        coordinator.start(&config(true)).unwrap();

        coordinator.ingest(video_sample(1000.0));
        coordinator.pause();
        for i in 0..10 {
            coordinator.ingest(video_sample(1100.0 + i as f64));
            coordinator.ingest(audio_sample(1100.0 + i as f64));
        }

        let status = coordinator.status();
        assert_eq!(log.lock().video.len(), 1);
        assert_eq!(log.lock().audio.len(), 0);
        // Paused discards are not backpressure drops.
        assert_eq!(status.dropped_video, 0);
        assert_eq!(status.dropped_audio, 0);
    }

    #[test]
    fn samples_for_a_disabled_stream_are_discarded() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        coordinator.start(&config(false)).unwrap();

        coordinator.ingest(audio_sample(1000.0));
        coordinator.ingest(video_sample(1002.0));

        let log = log.lock();
        assert!(log.audio.is_empty());
        // The discarded audio sample must not have claimed the origin.
        assert_eq!(log.video, vec![0.0]);
    }

    #[test]
    fn backpressure_drops_are_counted_and_origin_stays_fresh() {
        let factory = MemoryFactory::new();
        let ready = factory.video_ready.clone();
        let (coordinator, log) = coordinator_with(factory);
        coordinator.start(&config(false)).unwrap();

        ready.store(false, Ordering::SeqCst);
        for i in 0..5 {
            coordinator.ingest(video_sample(1000.0 + i as f64 * 33.0));
        }
        assert_eq!(coordinator.status().dropped_video, 5);
        assert!(log.lock().video.is_empty());

        // The origin was set by the first (dropped) sample, so the next
        // accepted one rebases against 1000, not a stale or reset origin.
        ready.store(true, Ordering::SeqCst);
        coordinator.ingest(video_sample(1250.0));
        assert_eq!(log.lock().video, vec![250.0]);
        assert_eq!(coordinator.status().dropped_video, 5);
    }

    #[test]
    fn invalid_transitions_are_noops() {
        let factory = MemoryFactory::new();
        let opened = factory.opened.clone();
        let (coordinator, _log) = coordinator_with(factory);

        coordinator.pause();
        coordinator.resume();
        assert_eq!(coordinator.phase(), RecorderPhase::Idle);

        coordinator.start(&config(false)).unwrap();
        coordinator.resume();
        assert_eq!(coordinator.phase(), RecorderPhase::Capturing);

        // start() while capturing must not open a second sink.
        coordinator.start(&config(false)).unwrap();
        assert_eq!(*opened.lock(), 1);

        coordinator.pause();
        coordinator.pause();
        assert_eq!(coordinator.phase(), RecorderPhase::Paused);
    }

    #[tokio::test]
    async fn stop_from_idle_returns_no_record() {
        let (coordinator, _log) = coordinator_with(MemoryFactory::new());
        assert!(coordinator.stop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_finalizes_and_returns_the_measured_duration() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        coordinator.start(&config(false)).unwrap();
        coordinator.ingest(video_sample(10.0));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let finished = coordinator.stop().await.unwrap().expect("a record");

        assert!(finished.path.ends_with("recording.mp4"));
        assert!(finished.duration_ms >= 55.0);
        assert!(log.lock().finished);
        assert_eq!(coordinator.phase(), RecorderPhase::Idle);
    }

    #[tokio::test]
    async fn duration_excludes_paused_time() {
        let (coordinator, _log) = coordinator_with(MemoryFactory::new());
        let wall = Instant::now();
        coordinator.start(&config(false)).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        coordinator.pause();
        let frozen = coordinator.status().duration_ms;
        tokio::time::sleep(Duration::from_millis(120)).await;
        // The readout must not advance while paused.
        assert_eq!(coordinator.status().duration_ms, frozen);
        coordinator.resume();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Second cycle: pause intervals accumulate across cycles.
        coordinator.pause();
        tokio::time::sleep(Duration::from_millis(70)).await;
        coordinator.resume();

        let finished = coordinator.stop().await.unwrap().expect("a record");
        let wall_ms = wall.elapsed().as_secs_f64() * 1000.0;

        // Active time was at least 120ms by construction, and both paused
        // intervals (120ms + 70ms) must be excluded from the total.
        assert!(finished.duration_ms >= 115.0);
        assert!(finished.duration_ms <= wall_ms - 180.0);
    }

    #[tokio::test]
    async fn finalize_failure_is_surfaced_and_resets_to_idle() {
        let mut factory = MemoryFactory::new();
        factory.fail_finalize = true;
        let (coordinator, _log) = coordinator_with(factory);
        coordinator.start(&config(false)).unwrap();
        coordinator.ingest(video_sample(0.0));

        let result = coordinator.stop().await;
        assert!(matches!(result, Err(RecorderError::FinalizeFailure(_))));
        assert_eq!(coordinator.phase(), RecorderPhase::Idle);

        // The coordinator is usable again.
        coordinator.start(&config(false)).unwrap();
        assert_eq!(coordinator.phase(), RecorderPhase::Capturing);
    }

    #[test]
    fn start_failure_stays_idle_and_is_retryable() {
        let factory = MemoryFactory::new();
        *factory.open_error.lock() = Some(RecorderError::PermissionDenied(
            "screen recording not allowed".into(),
        ));
        let (coordinator, _log) = coordinator_with(factory);

        let result = coordinator.start(&config(false));
        assert!(matches!(result, Err(RecorderError::PermissionDenied(_))));
        assert_eq!(coordinator.phase(), RecorderPhase::Idle);

        // A later attempt (permission granted) succeeds.
        coordinator.start(&config(false)).unwrap();
        assert_eq!(coordinator.phase(), RecorderPhase::Capturing);
    }

    #[test]
    fn abort_discards_the_output_and_notifies() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        let mut events = coordinator.subscribe();
        coordinator.start(&config(false)).unwrap();
        coordinator.ingest(video_sample(0.0));

        coordinator.abort("display disconnected");

        assert_eq!(coordinator.phase(), RecorderPhase::Idle);
        assert!(log.lock().discarded);
        coordinator.ingest(video_sample(50.0));
        assert_eq!(log.lock().video.len(), 1);

        assert!(matches!(events.try_recv(), Ok(RecorderEvent::Started)));
        assert!(matches!(events.try_recv(), Ok(RecorderEvent::Error(_))));
    }

    #[test]
    fn concurrent_producers_lose_no_accepted_samples() {
        let (coordinator, log) = coordinator_with(MemoryFactory::new());
        let coordinator = Arc::new(coordinator);
        coordinator.start(&config(true)).unwrap();

        let video = {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    coordinator.ingest(video_sample(1000.0 + i as f64));
                }
            })
        };
        let audio = {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    coordinator.ingest(audio_sample(1000.0 + i as f64));
                }
            })
        };
        video.join().unwrap();
        audio.join().unwrap();

        let log = log.lock();
        let status = coordinator.status();
        assert_eq!(
            log.video.len() as u64 + status.dropped_video,
            200,
            "every video sample was either forwarded or counted"
        );
        assert_eq!(log.audio.len() as u64 + status.dropped_audio, 200);
        // Whichever thread won the race, both streams rebased against one
        // shared origin: the smallest forwarded timestamp is exactly zero.
        let min = log
            .video
            .iter()
            .chain(log.audio.iter())
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(min, 0.0);
    }
}
