//! Export command handlers
//!
//! Starts editor export jobs in a background task and streams progress
//! to the frontend via Tauri events.

use crate::export::types::ExportError;
use crate::export::{ExportOptions, ExportPipeline};
use crate::utils::error::ErrorResponse;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tauri::{AppHandle, Emitter, State};

/// State for tracking the active export job
#[derive(Default)]
pub struct ExportState {
    /// Cancel flag for the current export
    cancel_flag: Arc<AtomicBool>,

    /// Whether an export is currently running
    is_exporting: Arc<AtomicBool>,
}

/// Start an export job
///
/// Runs the pipeline on a blocking task and emits `export-progress`,
/// `export-complete` and `export-error` events.
#[tauri::command]
pub async fn start_export(
    app: AppHandle,
    state: State<'_, ExportState>,
    input_path: String,
    options: ExportOptions,
) -> Result<(), ErrorResponse> {
    if state.is_exporting.load(Ordering::Relaxed) {
        return Err(ExportError::AlreadyRunning.into());
    }

    state.cancel_flag.store(false, Ordering::Relaxed);
    state.is_exporting.store(true, Ordering::Relaxed);

    let cancel_flag = state.cancel_flag.clone();
    let is_exporting = state.is_exporting.clone();

    tracing::info!("Starting export of {} -> {}", input_path, options.output_path);

    tauri::async_runtime::spawn(async move {
        let pipeline = ExportPipeline::new(PathBuf::from(&input_path), options, cancel_flag);

        let app_handle = app.clone();
        let result = tokio::task::spawn_blocking(move || {
            pipeline.run(|progress| {
                if let Err(e) = app_handle.emit("export-progress", &progress) {
                    tracing::warn!("Failed to emit export progress: {}", e);
                }
            })
        })
        .await;

        is_exporting.store(false, Ordering::Relaxed);

        match result {
            Ok(Ok(())) => {
                tracing::info!("Export completed successfully");
                if let Err(e) = app.emit("export-complete", ()) {
                    tracing::warn!("Failed to emit export-complete: {}", e);
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Export failed: {}", e);
                if let Err(emit_err) = app.emit("export-error", e.to_string()) {
                    tracing::warn!("Failed to emit export-error: {}", emit_err);
                }
            }
            Err(e) => {
                tracing::error!("Export task panicked: {}", e);
                if let Err(emit_err) = app.emit("export-error", format!("Export task panicked: {e}"))
                {
                    tracing::warn!("Failed to emit export-error: {}", emit_err);
                }
            }
        }
    });

    Ok(())
}

/// Cancel the current export job
#[tauri::command]
pub fn cancel_export(state: State<'_, ExportState>) -> Result<(), ErrorResponse> {
    if !state.is_exporting.load(Ordering::Relaxed) {
        return Err(ExportError::NotRunning.into());
    }

    tracing::info!("Cancelling export");
    state.cancel_flag.store(true, Ordering::Relaxed);
    Ok(())
}

/// Check if an export is currently in progress
#[tauri::command]
pub fn is_exporting(state: State<'_, ExportState>) -> bool {
    state.is_exporting.load(Ordering::Relaxed)
}
