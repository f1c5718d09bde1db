//! The orchestrator: one workspace root, its packages, and the operations on them.
//!
//! A [`Workspace`] owns its registry and reference counter; two workspaces
//! never share state. Operations that mutate several manifests run inside a
//! transaction that snapshots the manifests on disk and the in-memory index,
//! and puts both back if anything fails.

mod backup;
mod install;
mod maintenance;
mod release;
mod uninstall;

pub use backup::{BACKUP_DIR, ManifestBackup, ROOT_KEY};
pub use install::InstallOptions;
pub use maintenance::{CLEAN_SCRIPT, ROOT_CLEAN_HOOK};
pub use release::{POSTPUBLISH_HOOK, PREPUBLISH_HOOK, RecallOptions, ReleaseOptions};

use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::counter::DependencyCounter;
use crate::error::{Error, Result};
use crate::gateway::PackageManager;
use crate::manifest::{MANIFEST_FILE, Manifest};
use crate::package::{CreateOptions, PackageInfo, PackageStore, RootPackage, packages_dir};
use crate::registry::PackageRegistry;
use crate::runtime::Runtime;
use crate::version::VersionStrategies;

pub struct Workspace<R: Runtime, G: PackageManager> {
    runtime: R,
    gateway: G,
    root: PathBuf,
    root_package: Option<RootPackage>,
    registry: PackageRegistry,
    counter: DependencyCounter,
    strategies: VersionStrategies,
}

/// State captured when a transaction starts.
struct Transaction {
    backup: ManifestBackup,
    registry: PackageRegistry,
    counter: DependencyCounter,
}

impl<R: Runtime, G: PackageManager> Workspace<R, G> {
    /// A workspace rooted at `root`. Nothing is read until [`Workspace::reload`].
    pub fn new(runtime: R, gateway: G, root: PathBuf) -> Self {
        Self {
            runtime,
            gateway,
            root,
            root_package: None,
            registry: PackageRegistry::new(),
            counter: DependencyCounter::new(),
            strategies: VersionStrategies::new(),
        }
    }

    /// Find the workspace containing `start` and load it.
    pub fn open(runtime: R, gateway: G, start: &Path) -> Result<Self> {
        let mut workspace = Self::new(runtime, gateway, start.to_path_buf());
        workspace.ensure_root()?;
        workspace.reload()?;
        Ok(workspace)
    }

    pub fn with_strategies(mut self, strategies: VersionStrategies) -> Self {
        self.strategies = strategies;
        self
    }

    /// Walk upward from the current root until a manifest with a `"tandem"`
    /// section is found, and adopt that directory as the root.
    #[tracing::instrument(skip(self))]
    pub fn ensure_root(&mut self) -> Result<()> {
        let start = self.root.clone();
        for dir in start.ancestors() {
            let path = dir.join(MANIFEST_FILE);
            if !self.runtime.is_file(&path) {
                continue;
            }
            match Manifest::load(&self.runtime, &path) {
                Ok(manifest) if manifest.workspace.is_some() => {
                    debug!("Workspace root is {:?}", dir);
                    self.root = dir.to_path_buf();
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping {:?}: {}", path, e),
            }
        }
        Err(Error::NoRootPackage { cwd: start })
    }

    /// Re-read the root package and rescan the packages.
    ///
    /// On failure the previous state is kept.
    #[tracing::instrument(skip(self))]
    pub fn reload(&mut self) -> Result<()> {
        let store = PackageStore::new(&self.runtime);
        let root = store.read_root(&self.root)?;
        let mut registry = PackageRegistry::new();
        registry.reload(&store, &root.packages_dir())?;

        self.counter = registry.count_dependencies();
        self.registry = registry;
        self.root_package = Some(root);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn packages_dir(&self) -> PathBuf {
        packages_dir(&self.root)
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn counter(&self) -> &DependencyCounter {
        &self.counter
    }

    pub fn root_package(&self) -> Result<&RootPackage> {
        self.root_package.as_ref().ok_or_else(|| Error::NoRootPackage {
            cwd: self.root.clone(),
        })
    }

    pub fn get_package(&self, name: &str) -> Result<PackageInfo> {
        self.registry.get_package(name)
    }

    /// Every package, sorted by name.
    pub fn packages(&self) -> Vec<PackageInfo> {
        self.registry.iter().map(|package| package.info()).collect()
    }

    pub fn create_package(&mut self, options: &CreateOptions) -> Result<PackageInfo> {
        let store = PackageStore::new(&self.runtime);
        let info = self
            .registry
            .create_package(&store, &packages_dir(&self.root), options)?;
        println!("Created package \"{}\" in {:?}", info.name, info.root);
        Ok(info)
    }

    fn package_root(&self, name: &str) -> Result<PathBuf> {
        self.registry
            .get(name)
            .map(|package| package.root.clone())
            .ok_or_else(|| Error::PackageNotFound {
                name: name.to_string(),
            })
    }

    /// Write the dependency maps of the named packages.
    fn save_packages(&self, names: &[String]) -> Result<()> {
        let store = PackageStore::new(&self.runtime);
        for name in names {
            if let Some(package) = self.registry.get(name) {
                store.save(package)?;
            }
        }
        Ok(())
    }

    fn backup(&self, manifests: Vec<(String, PathBuf)>) -> Result<ManifestBackup> {
        ManifestBackup::create(&self.runtime, &self.root.join(BACKUP_DIR), manifests)
    }

    /// Back up every package manifest plus the root manifest.
    fn begin_transaction(&self) -> Result<Transaction> {
        let mut manifests: Vec<(String, PathBuf)> = self
            .registry
            .iter()
            .map(|package| (package.name.clone(), package.manifest_path()))
            .collect();
        manifests.push((ROOT_KEY.to_string(), self.root.join(MANIFEST_FILE)));

        Ok(Transaction {
            backup: self.backup(manifests)?,
            registry: self.registry.clone(),
            counter: self.counter.clone(),
        })
    }

    /// Roll back on error, then drop the backups either way.
    fn end_transaction<T>(&mut self, transaction: Transaction, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.registry = transaction.registry;
            self.counter = transaction.counter;
            if let Err(e) = transaction.backup.restore(&self.runtime) {
                warn!("Failed to restore manifests: {}", e);
            }
        }
        transaction.backup.discard(&self.runtime);
        result
    }
}
