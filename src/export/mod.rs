//! Editor export
//!
//! Trim/cut and speed edits compiled to a single FFmpeg filter graph,
//! with progress reporting and cancellation.

pub mod ffmpeg;
pub mod pipeline;
pub mod types;

pub use pipeline::ExportPipeline;
pub use types::{
    EditList, ExportError, ExportFormat, ExportOptions, ExportProgress, ExportQuality,
    ExportSegment, ExportStage,
};
