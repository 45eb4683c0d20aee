//! Internal implementation modules for `veendor-core`.

pub mod archive;
pub mod backends;
pub mod commands;
pub mod config;
pub mod install;
pub mod npm;
pub mod runtime;
pub mod tooling;
pub mod vcs;
