//! The `"tandem"` section of the root manifest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Publish visibility marker of a sub-package.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Public,
    Private,
}

/// How sibling versions are written into a released manifest.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Exact version.
    Full,
    /// Caret range, `^1.2.3`.
    #[default]
    Major,
    /// Tilde range, `~1.2.3`.
    Minor,
}

impl LockMode {
    pub fn range(&self, version: &str) -> String {
        match self {
            LockMode::Full => version.to_string(),
            LockMode::Major => format!("^{}", version),
            LockMode::Minor => format!("~{}", version),
        }
    }
}

/// One tag or a list of tags; the first is the primary tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagSpec {
    One(String),
    Many(Vec<String>),
}

impl TagSpec {
    pub fn tags(&self) -> &[String] {
        match self {
            TagSpec::One(tag) => std::slice::from_ref(tag),
            TagSpec::Many(tags) => tags,
        }
    }
}

impl Default for TagSpec {
    fn default() -> Self {
        TagSpec::One("latest".into())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseChannel {
    #[serde(default)]
    pub tag: TagSpec,

    /// Name of a registered version strategy; `None` means the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versioner: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
}

impl ReleaseChannel {
    pub fn primary_tag(&self) -> Option<&str> {
        self.tag.tags().first().map(String::as_str)
    }

    pub fn secondary_tags(&self) -> &[String] {
        self.tag.tags().get(1..).unwrap_or(&[])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub releases: BTreeMap<String, ReleaseChannel>,

    #[serde(default)]
    pub lock: LockMode,
}

impl WorkspaceConfig {
    /// Configuration written by `initialize`.
    pub fn initial() -> Self {
        let mut releases = BTreeMap::new();
        releases.insert("production".to_string(), ReleaseChannel::default());
        Self {
            releases,
            lock: LockMode::default(),
        }
    }
}
