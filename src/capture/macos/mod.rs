//! macOS capture backends

pub mod permissions;
pub mod screen;
