//! Recording library
//!
//! Persisted metadata for completed recordings plus preview thumbnails.
//! The index lives next to the media files in the recordings directory.

pub mod store;
pub mod thumbnail;

pub use store::{LibraryError, RecordingLibrary, RecordingRecord};
