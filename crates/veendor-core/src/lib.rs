#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

mod core;

pub use crate::core::archive::{bundle_file_name, Compression};
pub use crate::core::backends::{
    Backend, BackendDescriptor, BackendError, BackendFactory, BackendRegistry, BackendTools,
    InvalidOptions,
};
pub use crate::core::commands::{
    calc_fingerprint, config_path, error_outcome, install_project, system_context,
};
pub use crate::core::config::{
    Config, ConfigError, GitHistory, GlobalOptions, InstallContext, RawConfig, CONFIG_FILE,
    VEENDOR_VERSION,
};
pub use crate::core::install::{
    fingerprint_project, install, BundleSource, InstallError, InstallReport, InstallRequest,
};
pub use crate::core::npm::{PackageManager, SystemNpm};
pub use crate::core::runtime::effects::{Effects, SharedEffects, SystemEffects};
pub use crate::core::runtime::process::{ProcessError, RunOptions, RunOutput};
pub use crate::core::tooling::diagnostics::reasons;
pub use crate::core::tooling::outcome::{format_status_message, CommandStatus, ExecutionOutcome};
pub use crate::core::tooling::progress::{Progress, ProgressReporter};
pub use crate::core::vcs::{Git, GitError, SystemGit, VcsError, VersionControl};

pub mod backends {
    pub use crate::core::backends::{git_lfs, http, local, s3};
}
