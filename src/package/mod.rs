//! Sub-packages and the root package of a workspace.

mod naming;
mod store;
mod template;

pub use naming::{
    ALIAS_PREFIX, DependencySpec, is_valid_alias, is_valid_package_name, normalize,
};
pub use store::{CreateOptions, PackageStore};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::manifest::{Access, LockFile, MANIFEST_FILE, Manifest, WorkspaceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyKind {
    Runtime,
    Dev,
    Peer,
}

impl DependencyKind {
    pub const ALL: [DependencyKind; 3] =
        [DependencyKind::Runtime, DependencyKind::Dev, DependencyKind::Peer];

    pub fn from_flags(peer: bool, dev: bool) -> Self {
        if peer {
            DependencyKind::Peer
        } else if dev {
            DependencyKind::Dev
        } else {
            DependencyKind::Runtime
        }
    }
}

/// A sub-package as held by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    /// Lower-cased manifest name.
    pub name: String,
    /// Lower-cased alias.
    pub alias: Option<String>,
    pub root: PathBuf,
    pub manifest: Manifest,
}

impl Package {
    pub fn new(root: PathBuf, manifest: Manifest) -> Self {
        Self {
            name: normalize(&manifest.name),
            alias: manifest.alias.as_deref().map(normalize),
            root,
            manifest,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    /// Not publishable.
    pub fn no_release(&self) -> bool {
        self.manifest.is_private()
    }

    /// Published with restricted visibility.
    pub fn private_access(&self) -> bool {
        self.manifest.access == Some(Access::Private)
    }

    pub fn dependencies(&self, kind: DependencyKind) -> &BTreeMap<String, String> {
        match kind {
            DependencyKind::Runtime => &self.manifest.dependencies,
            DependencyKind::Dev => &self.manifest.dev_dependencies,
            DependencyKind::Peer => &self.manifest.peer_dependencies,
        }
    }

    pub fn dependencies_mut(&mut self, kind: DependencyKind) -> &mut BTreeMap<String, String> {
        match kind {
            DependencyKind::Runtime => &mut self.manifest.dependencies,
            DependencyKind::Dev => &mut self.manifest.dev_dependencies,
            DependencyKind::Peer => &mut self.manifest.peer_dependencies,
        }
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        DependencyKind::ALL
            .iter()
            .any(|kind| self.dependencies(*kind).contains_key(name))
    }

    /// Remove `name` from all three maps. Returns whether it was present.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let mut removed = false;
        for kind in DependencyKind::ALL {
            removed |= self.dependencies_mut(kind).remove(name).is_some();
        }
        removed
    }

    pub fn set_dependency(&mut self, kind: DependencyKind, name: &str, version: &str) {
        self.dependencies_mut(kind)
            .insert(name.to_string(), version.to_string());
    }

    /// Distinct dependency names of the given kinds, sorted.
    pub fn dependency_names(&self, kinds: &[DependencyKind]) -> Vec<String> {
        let mut names: Vec<String> = kinds
            .iter()
            .flat_map(|kind| self.dependencies(*kind).keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn info(&self) -> PackageInfo {
        PackageInfo {
            name: self.name.clone(),
            alias: self.alias.clone(),
            root: self.root.clone(),
            version: self.manifest.version.clone(),
            no_release: self.no_release(),
            private_access: self.private_access(),
            scripts: self.manifest.scripts.clone(),
            dependencies: self.manifest.dependencies.clone(),
            dev_dependencies: self.manifest.dev_dependencies.clone(),
            peer_dependencies: self.manifest.peer_dependencies.clone(),
        }
    }
}

/// An independent copy of a package's public fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub alias: Option<String>,
    pub root: PathBuf,
    pub version: Option<String>,
    pub no_release: bool,
    pub private_access: bool,
    pub scripts: BTreeMap<String, String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
}

/// The package at the top of the workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct RootPackage {
    pub root: PathBuf,
    pub manifest: Manifest,
    pub config: WorkspaceConfig,
    pub lock: LockFile,
}

impl RootPackage {
    pub fn version(&self) -> &str {
        self.manifest.version.as_deref().unwrap_or("0.0.0")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn packages_dir(&self) -> PathBuf {
        packages_dir(&self.root)
    }
}

/// Directory holding the sub-packages of a workspace rooted at `root`.
pub fn packages_dir(root: &Path) -> PathBuf {
    root.join("packages")
}
