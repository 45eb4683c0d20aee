//! Subprocess execution and the injectable collaborator set.

pub mod effects;
pub mod process;
