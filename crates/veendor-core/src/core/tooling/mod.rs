//! CLI-facing diagnostics, progress reporting, and outcome shaping.

pub mod diagnostics;
mod messages;
pub mod outcome;
pub mod progress;
pub(crate) mod timings;

pub(crate) use messages::*;
