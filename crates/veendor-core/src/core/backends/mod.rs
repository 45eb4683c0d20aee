//! Storage backends for dependency bundles.
//!
//! Every backend stores bundles keyed by fingerprint and exposes the same
//! contract: `pull` fails with [`BackendError::BundleNotFound`] when the
//! bundle is absent, `push` fails with [`BackendError::BundleAlreadyExists`]
//! instead of overwriting. Anything else is fatal for the current hash.

use std::{fmt, path::Path, sync::Arc};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::tooling::progress::Progress;

pub mod git_lfs;
pub mod http;
pub mod local;
pub mod registry;
pub mod s3;

pub use registry::{BackendFactory, BackendRegistry};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("bundle {hash} not found")]
    BundleNotFound { hash: String },
    #[error("bundle {hash} already exists")]
    BundleAlreadyExists { hash: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    pub fn not_found(hash: &str) -> Self {
        Self::BundleNotFound {
            hash: hash.to_string(),
        }
    }

    pub fn already_exists(hash: &str) -> Self {
        Self::BundleAlreadyExists {
            hash: hash.to_string(),
        }
    }
}

/// Backend option validation failure, reported at config load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidOptions(pub String);

impl InvalidOptions {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything a backend may touch during one `pull` or `push`.
pub struct BackendTools<'a> {
    pub alias: &'a str,
    /// Directory whose `node_modules` is extracted into or archived from.
    pub project_dir: &'a Path,
    /// Scratch directory owned by this backend.
    pub cache_dir: &'a Path,
    pub progress: &'a Progress,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Keep the cache directory between invocations instead of wiping it.
    fn keep_cache(&self) -> bool {
        false
    }

    async fn pull(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError>;

    async fn push(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError>;
}

/// A configured backend entry.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub alias: String,
    pub backend: Arc<dyn Backend>,
    pub push: bool,
    pub push_may_fail: bool,
}

impl BackendDescriptor {
    pub fn new(alias: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            alias: alias.into(),
            backend,
            push: false,
            push_may_fail: false,
        }
    }

    #[must_use]
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    #[must_use]
    pub fn with_push_may_fail(mut self, push_may_fail: bool) -> Self {
        self.push_may_fail = push_may_fail;
        self
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("alias", &self.alias)
            .field("kind", &self.backend.kind())
            .field("push", &self.push)
            .field("push_may_fail", &self.push_may_fail)
            .finish()
    }
}

/// Deserializes raw backend options, treating `null` as an empty object.
pub(crate) fn parse_options<T: DeserializeOwned>(raw: &Value) -> Result<T, InvalidOptions> {
    let raw = if raw.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        raw.clone()
    };
    serde_json::from_value(raw).map_err(|err| InvalidOptions::new(err.to_string()))
}

pub(crate) fn parse_compression(
    raw: Option<&str>,
) -> Result<crate::core::archive::Compression, InvalidOptions> {
    match raw {
        None => Ok(crate::core::archive::Compression::default()),
        Some(name) => name
            .parse()
            .map_err(|err: anyhow::Error| InvalidOptions::new(err.to_string())),
    }
}
