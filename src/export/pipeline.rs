//! Export pipeline
//!
//! Runs one export job: probes the source, spawns the encoder and turns
//! its `-progress` stream into progress callbacks. Blocking; run it on a
//! blocking task.

use crate::export::ffmpeg;
use crate::export::types::{EditList, ExportError, ExportProgress};
use crate::export::ExportOptions;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct ExportPipeline {
    input: PathBuf,
    options: ExportOptions,
    cancel: Arc<AtomicBool>,
}

impl ExportPipeline {
    pub fn new(input: PathBuf, options: ExportOptions, cancel: Arc<AtomicBool>) -> Self {
        Self {
            input,
            options,
            cancel,
        }
    }

    /// Run the export to completion, reporting progress along the way.
    pub fn run(self, mut on_progress: impl FnMut(ExportProgress)) -> Result<(), ExportError> {
        on_progress(ExportProgress::preparing());

        if !self.input.exists() {
            return Err(ExportError::SourceNotFound(
                self.input.to_string_lossy().to_string(),
            ));
        }

        let info = ffmpeg::probe_media(&self.input)?;
        let edits = self
            .options
            .edits
            .clone()
            .unwrap_or_else(|| EditList::full(info.duration_ms as u64));
        let total_ms = edits.total_output_duration_ms() as f64;

        let mut child = ffmpeg::spawn_export(&self.input, &info, &self.options, &edits)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExportError::Ffmpeg("failed to capture FFmpeg stdout".to_string()))?;

        for line in BufReader::new(stdout).lines() {
            if self.cancel.load(Ordering::Relaxed) {
                tracing::info!("Export cancelled, stopping FFmpeg");
                let _ = child.kill();
                let _ = child.wait();
                let _ = fs::remove_file(&self.options.output_path);
                return Err(ExportError::Cancelled);
            }

            let line = line?;
            // out_time_ms is in microseconds despite the name.
            if let Some(value) = line.strip_prefix("out_time_ms=") {
                if let Ok(micros) = value.trim().parse::<i64>() {
                    let processed_ms = (micros as f64 / 1000.0).max(0.0);
                    on_progress(ExportProgress::encoding(processed_ms, total_ms));
                }
            } else if line.trim() == "progress=end" {
                on_progress(ExportProgress::finalizing(total_ms));
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let _ = fs::remove_file(&self.options.output_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Ffmpeg(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!("Export finished: {}", self.options.output_path);
        on_progress(ExportProgress::complete(total_ms));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::types::{ExportFormat, ExportQuality};

    #[test]
    fn missing_source_fails_before_spawning_ffmpeg() {
        let pipeline = ExportPipeline::new(
            PathBuf::from("/nonexistent/recording.mp4"),
            ExportOptions {
                format: ExportFormat::Mp4,
                quality: ExportQuality::Medium,
                width: None,
                height: None,
                fps: None,
                output_path: "/tmp/out.mp4".to_string(),
                include_audio: true,
                edits: None,
            },
            Arc::new(AtomicBool::new(false)),
        );

        let mut stages = Vec::new();
        let result = pipeline.run(|progress| stages.push(progress.percent));
        assert!(matches!(result, Err(ExportError::SourceNotFound(_))));
        // Only the preparing callback fired.
        assert_eq!(stages, vec![0.0]);
    }
}
