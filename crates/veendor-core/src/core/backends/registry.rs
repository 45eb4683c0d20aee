use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::{git_lfs, http, local, s3, Backend, InvalidOptions};

/// Validates raw options and builds a backend instance.
pub type BackendFactory = fn(&Value) -> Result<Arc<dyn Backend>, InvalidOptions>;

/// Maps the `backend` field of a config entry to a factory.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: IndexMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Registry with every backend shipped in this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(local::KIND, local::create);
        registry.register(http::KIND, http::create);
        registry.register(s3::KIND, s3::create);
        registry.register(git_lfs::KIND, git_lfs::create);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Returns `None` for an unknown kind.
    pub fn create(
        &self,
        kind: &str,
        options: &Value,
    ) -> Option<Result<Arc<dyn Backend>, InvalidOptions>> {
        self.factories.get(kind).map(|factory| factory(options))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_kinds_are_registered() {
        let registry = BackendRegistry::builtin();
        let kinds = registry.kinds().collect::<Vec<_>>();
        assert_eq!(kinds, vec!["local", "http", "s3", "git-lfs"]);
    }

    #[test]
    fn unknown_kind_is_none() {
        let registry = BackendRegistry::builtin();
        assert!(registry.create("ftp", &json!({})).is_none());
    }

    #[test]
    fn factory_reports_invalid_options() {
        let registry = BackendRegistry::builtin();
        let result = registry
            .create("local", &json!({"compression": "gzip"}))
            .expect("local is registered");
        assert!(result.is_err());
    }
}
