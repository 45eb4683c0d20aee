use std::collections::BTreeMap;

use crate::manifest::DependencyManifest;

/// Changes needed to turn an installed dependency set into another one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyDiff {
    pub install: BTreeMap<String, String>,
    pub uninstall: Vec<String>,
}

impl DependencyDiff {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.uninstall.is_empty()
    }
}

/// Compares the merged dependency views of two manifests.
///
/// Moving a package between `dependencies` and `devDependencies` without
/// changing its version produces no entry.
pub fn diff_manifests(old: &DependencyManifest, new: &DependencyManifest) -> DependencyDiff {
    let old = old.merged();
    let new = new.merged();

    let install = new
        .iter()
        .filter(|(name, version)| old.get(*name) != Some(*version))
        .map(|(name, version)| (name.clone(), version.clone()))
        .collect();
    let mut uninstall = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect::<Vec<_>>();
    uninstall.sort();

    DependencyDiff { install, uninstall }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: serde_json::Value) -> DependencyManifest {
        DependencyManifest::from_value(&value).unwrap()
    }

    #[test]
    fn installs_changed_versions_only() {
        let old = manifest(json!({
            "dependencies": {"a": "1", "c": "1.0"},
            "devDependencies": {"baz": "6"}
        }));
        let new = manifest(json!({
            "dependencies": {"a": "1", "c": "2.2.9"},
            "devDependencies": {"baz": "6"}
        }));
        let diff = diff_manifests(&old, &new);
        assert_eq!(
            diff.install,
            BTreeMap::from([("c".to_string(), "2.2.9".to_string())])
        );
        assert!(diff.uninstall.is_empty());
    }

    #[test]
    fn moving_between_sections_is_a_no_op() {
        let old = manifest(json!({
            "dependencies": {"a": "1", "b": "2"},
            "devDependencies": {"c": "3"}
        }));
        let new = manifest(json!({
            "dependencies": {"a": "1"},
            "devDependencies": {"b": "2", "c": "3"}
        }));
        assert!(diff_manifests(&old, &new).is_empty());
    }

    #[test]
    fn removed_packages_are_uninstalled() {
        let old = manifest(json!({
            "dependencies": {"a": "1", "gone": "1"},
            "devDependencies": {"also-gone": "2"}
        }));
        let new = manifest(json!({
            "dependencies": {"a": "1", "added": "5"}
        }));
        let diff = diff_manifests(&old, &new);
        assert_eq!(
            diff.install,
            BTreeMap::from([("added".to_string(), "5".to_string())])
        );
        assert_eq!(diff.uninstall, vec!["also-gone", "gone"]);
    }
}
