//! Windows capture backends

pub mod screen;
