//! Transfer presentation helpers.

pub mod progress;
