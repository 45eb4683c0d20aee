//! Config file loading, validation, and per-run context assembly.

pub mod context;
pub mod settings;

pub use context::{is_valid_alias, InstallContext, CACHE_DIR};
pub use settings::*;
