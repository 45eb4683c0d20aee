//! Bundle identifiers derived from a manifest's dependency set.
//!
//! The digest is SHA-1 over newline-joined, lexicographically sorted
//! `path=value` entries. Stored bundles are named after this digest, so the
//! canonical form must not change between releases.

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::manifest::DependencyManifest;

/// Suffix appended to a fingerprint as `-<suffix>`.
#[derive(Clone)]
pub enum Suffix {
    Literal(String),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Suffix {
    pub fn computed(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    fn render(&self) -> String {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct HashOptions {
    pub suffix: Option<Suffix>,
}

impl HashOptions {
    pub fn with_suffix(suffix: Suffix) -> Self {
        Self {
            suffix: Some(suffix),
        }
    }
}

pub fn compute_fingerprint(
    manifest: &DependencyManifest,
    lockfile: Option<&Value>,
    options: &HashOptions,
) -> String {
    let mut entries = Vec::new();
    flatten_section(
        &mut entries,
        "dependencies",
        manifest.dependencies.as_ref(),
    );
    flatten_section(
        &mut entries,
        "devDependencies",
        manifest.dev_dependencies.as_ref(),
    );
    entries.sort();

    let mut canonical = entries.join("\n");
    if let Some(lockfile) = lockfile {
        canonical.push('\n');
        canonical.push_str(&deep_sorted_json(lockfile).join("\n"));
    }

    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());
    match &options.suffix {
        Some(suffix) => format!("{digest}-{}", suffix.render()),
        None => digest,
    }
}

/// Flattens a JSON tree into sorted `path=value` entries.
///
/// Object children extend the path with `.key`, array items with `[index]`.
/// Empty objects contribute their bare path.
pub fn deep_sorted_json(value: &Value) -> Vec<String> {
    let mut entries = Vec::new();
    flatten_into(&mut entries, String::new(), value);
    entries.sort();
    entries
}

// An absent section renders as `key=undefined`, matching bundles named by
// earlier releases.
fn flatten_section(
    entries: &mut Vec<String>,
    key: &str,
    section: Option<&IndexMap<String, String>>,
) {
    match section {
        None => entries.push(format!("{key}=undefined")),
        Some(map) if map.is_empty() => entries.push(key.to_string()),
        Some(map) => {
            for (name, version) in map {
                entries.push(format!("{key}.{name}={version}"));
            }
        }
    }
}

fn flatten_into(entries: &mut Vec<String>, root: String, value: &Value) {
    let mut pending = vec![(root, value)];
    while let Some((path, value)) = pending.pop() {
        match value {
            Value::Object(map) if map.is_empty() => entries.push(path),
            Value::Object(map) => {
                for (key, child) in map {
                    pending.push((join_key(&path, key), child));
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    pending.push((format!("{path}[{index}]"), child));
                }
            }
            scalar => entries.push(format!("{path}={}", render_scalar(scalar))),
        }
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
