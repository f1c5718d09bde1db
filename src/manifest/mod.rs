//! On-disk package manifests (`package.json`).
//!
//! Fields the workspace understands are typed; everything else is kept in
//! [`Manifest::extra`] so a rewrite never drops user data.

mod config;
mod lock;

pub use config::{Access, LockMode, ReleaseChannel, TagSpec, WorkspaceConfig};
pub use lock::LockFile;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::runtime::Runtime;

pub const MANIFEST_FILE: &str = "package.json";
pub const LOCK_FILE: &str = "package-lock.json";

/// Literal recorded for a dependency version until a release resolves it.
pub const PLACEHOLDER_VERSION: &str = "-";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,

    #[serde(rename = "tandem:alias", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_config: Option<Map<String, Value>>,

    #[serde(rename = "tandem", default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceConfig>,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Read and parse a manifest.
    ///
    /// Malformed JSON is reported as [`Error::InvalidManifestFile`]; valid JSON
    /// that does not describe a package is [`Error::InvalidPackage`].
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let value = read_json(runtime, path)?;
        let manifest: Manifest =
            serde_json::from_value(value).map_err(|e| Error::InvalidPackage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if manifest.name.trim().is_empty() {
            return Err(Error::InvalidPackage {
                path: path.to_path_buf(),
                reason: "missing package name".into(),
            });
        }
        Ok(manifest)
    }

    /// Write the manifest. An existing file is patched in place: its keys
    /// keep their order and new keys are appended at the end.
    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<()> {
        let value = serde_json::to_value(self).map_err(anyhow::Error::from)?;
        let existing = runtime
            .is_file(path)
            .then(|| read_json(runtime, path).ok())
            .flatten();
        let value = match (existing, value) {
            (Some(Value::Object(existing)), Value::Object(updated)) => {
                Value::Object(patch_object(existing, updated))
            }
            (_, value) => value,
        };
        write_json(runtime, path, &value)
    }

    pub fn is_private(&self) -> bool {
        self.private.unwrap_or(false)
    }

    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    /// Look a dependency up across runtime, dev and peer maps.
    pub fn declared_version(&self, name: &str) -> Option<&str> {
        self.dependencies
            .get(name)
            .or_else(|| self.dev_dependencies.get(name))
            .or_else(|| self.peer_dependencies.get(name))
            .map(String::as_str)
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Lay `updated` over `existing` in `existing`'s key order.
///
/// Keys missing from `updated` are dropped unless they held an empty
/// object or array. Keys only in `updated` are appended, except empty ones.
fn patch_object(existing: Map<String, Value>, mut updated: Map<String, Value>) -> Map<String, Value> {
    let mut patched = Map::new();
    for (key, old) in existing {
        match updated.shift_remove(&key) {
            Some(new) => {
                patched.insert(key, new);
            }
            None if is_empty_container(&old) => {
                patched.insert(key, old);
            }
            None => {}
        }
    }
    for (key, new) in updated {
        if !is_empty_container(&new) {
            patched.insert(key, new);
        }
    }
    patched
}

/// Read a file and parse it as JSON, mapping each failure to a typed error.
pub(crate) fn read_json<R: Runtime>(runtime: &R, path: &Path) -> Result<Value> {
    if !runtime.is_file(path) {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
        });
    }
    let content = runtime.read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| Error::InvalidManifestFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write a JSON value with two-space indentation and a trailing newline.
pub(crate) fn write_json<R: Runtime>(runtime: &R, path: &Path, value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    runtime.write(path, format!("{}\n", json).as_bytes())?;
    Ok(())
}
