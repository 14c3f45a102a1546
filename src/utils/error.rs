//! Error types and handling
//!
//! App-wide error composition and the structured error payload commands
//! return to the frontend.

use crate::export::types::ExportError;
use crate::library::store::LibraryError;
use crate::library::thumbnail::ThumbnailError;
use crate::recorder::sink::RecorderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recording error: {0}")]
    Recording(#[from] RecorderError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Thumbnail error: {0}")]
    Thumbnail(#[from] ThumbnailError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Error payload for the frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Recording(RecorderError::PermissionDenied(_)) => "PERMISSION_DENIED",
            AppError::Recording(RecorderError::NoCaptureTarget(_)) => "NO_CAPTURE_TARGET",
            AppError::Recording(RecorderError::FinalizeFailure(_)) => "FINALIZE_FAILURE",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Library(_) => "LIBRARY_ERROR",
            AppError::Thumbnail(_) => "THUMBNAIL_ERROR",
            AppError::Export(_) => "EXPORT_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        AppError::from(error).into()
    }
}

impl From<LibraryError> for ErrorResponse {
    fn from(error: LibraryError) -> Self {
        AppError::from(error).into()
    }
}

impl From<ExportError> for ErrorResponse {
    fn from(error: ExportError) -> Self {
        AppError::from(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_failures_keep_their_code() {
        let response: ErrorResponse =
            AppError::Recording(RecorderError::PermissionDenied("nope".into())).into();
        assert_eq!(response.code, "PERMISSION_DENIED");
        assert!(response.message.contains("nope"));
    }
}
