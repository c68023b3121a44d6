//! Local file system helpers.

pub mod walker;

pub use walker::{scan, SourceStats};
