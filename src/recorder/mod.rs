//! Recording session module
//!
//! - `SessionCoordinator` owns the lifecycle and the session clock
//! - `ContainerSink` is the muxed output target with two stream inputs
//! - sample/state types shared with the capture and command layers

pub mod coordinator;
pub mod sample;
pub mod sink;
pub mod state;

pub use coordinator::{RecorderEvent, SessionCoordinator};
pub use sample::{MediaSample, StreamKind};
pub use sink::{ContainerSink, Mp4SinkFactory, RecorderError, RecorderResult, SinkFactory};
pub use state::{CaptureConfig, FinishedRecording, RecorderPhase, RecorderStatus, VideoInput};
