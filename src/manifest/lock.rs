use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::runtime::Runtime;

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
struct LockEntry {
    #[serde(default)]
    version: Option<String>,
}

/// Installed versions recorded by the package manager at the workspace root.
///
/// Understands both the `packages` table (lockfile v2/v3) and the older
/// `dependencies` table (lockfile v1).
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LockFile {
    #[serde(default)]
    packages: BTreeMap<String, LockEntry>,
    #[serde(default)]
    dependencies: BTreeMap<String, LockEntry>,
}

impl LockFile {
    /// A missing lock file is an empty one.
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            return Ok(Self::default());
        }
        let content = runtime.read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::InvalidManifestFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn installed_version(&self, name: &str) -> Option<&str> {
        self.packages
            .get(&format!("node_modules/{}", name))
            .or_else(|| self.dependencies.get(name))
            .and_then(|entry| entry.version.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[test]
    fn test_installed_version_v3() {
        let lock: LockFile = serde_json::from_str(
            r#"{
                "lockfileVersion": 3,
                "packages": {
                    "": { "name": "root" },
                    "node_modules/lodash": { "version": "4.17.21" },
                    "node_modules/@types/node": { "version": "20.1.0" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(lock.installed_version("lodash"), Some("4.17.21"));
        assert_eq!(lock.installed_version("@types/node"), Some("20.1.0"));
        assert_eq!(lock.installed_version("react"), None);
    }

    #[test]
    fn test_installed_version_v1() {
        let lock: LockFile = serde_json::from_str(
            r#"{ "lockfileVersion": 1, "dependencies": { "lodash": { "version": "4.0.0" } } }"#,
        )
        .unwrap();
        assert_eq!(lock.installed_version("lodash"), Some("4.0.0"));
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package-lock.json");
        assert_eq!(
            LockFile::load(&RealRuntime, &path).unwrap(),
            LockFile::default()
        );

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            LockFile::load(&RealRuntime, &path),
            Err(Error::InvalidManifestFile { .. })
        ));
    }
}
