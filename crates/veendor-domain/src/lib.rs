#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod diff;
pub mod fingerprint;
pub mod lockfile;
pub mod manifest;

pub use diff::{diff_manifests, DependencyDiff};
pub use fingerprint::{compute_fingerprint, deep_sorted_json, HashOptions, Suffix};
pub use lockfile::{detect_lockfile, read_lockfile, LockfileError, LOCKFILE_NAMES};
pub use manifest::{DependencyManifest, ManifestError, MANIFEST_FILE, NODE_MODULES};
