//! Halo - menu-bar screen recording with a webcam bubble.
//!
//! This is the main library crate for the Halo application. It provides
//! the Tauri application setup and all backend functionality.

pub mod capture;
pub mod commands;
pub mod export;
pub mod library;
pub mod recorder;
pub mod utils;

use commands::export::ExportState;
use commands::recording::RecorderState;
use tauri::{Emitter, Manager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the application
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "halo=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Halo v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        .manage(RecorderState::default())
        .manage(ExportState::default())
        .invoke_handler(tauri::generate_handler![
            // Recording commands
            commands::recording::get_displays,
            commands::recording::get_audio_devices,
            commands::recording::get_cameras,
            commands::recording::check_screen_permission,
            commands::recording::request_screen_permission,
            commands::recording::check_camera_permission,
            commands::recording::request_camera_permission,
            commands::recording::start_recording,
            commands::recording::stop_recording,
            commands::recording::pause_recording,
            commands::recording::resume_recording,
            commands::recording::get_recorder_status,
            // Library commands
            commands::library::list_recordings,
            commands::library::delete_recording,
            commands::library::rename_recording,
            // Export commands
            commands::export::start_export,
            commands::export::cancel_export,
            commands::export::is_exporting,
            // System commands
            commands::system::get_system_info,
            commands::system::check_ffmpeg_available,
        ])
        .setup(|app| {
            // Forward recorder events (transitions, progress, failures)
            // to the frontend so the floating controls and status icon
            // track the session even when nothing is polling.
            let state = app.state::<RecorderState>();
            let mut events = state.coordinator.subscribe();
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if let Err(e) = handle.emit("recorder-event", &event) {
                                tracing::warn!("Failed to emit recorder event: {}", e);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("Recorder event observer lagged by {} events", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            // Transparent, shadow-less floating controls window on macOS
            #[cfg(target_os = "macos")]
            {
                #[allow(deprecated)]
                {
                    use cocoa::appkit::NSWindow;
                    use cocoa::base::id;

                    if let Some(window) = app.get_webview_window("controls") {
                        if let Ok(ns_window) = window.ns_window() {
                            unsafe {
                                let ns_window = ns_window as id;
                                ns_window.setOpaque_(cocoa::base::NO);
                                ns_window.setHasShadow_(cocoa::base::NO);
                            }
                        }
                    }
                }
            }
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
