//! Reading, writing, discovering and scaffolding package manifests.

use log::debug;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::manifest::{LOCK_FILE, LockFile, MANIFEST_FILE, Manifest};
use crate::runtime::Runtime;

use super::template::{ManifestStamp, Template};
use super::{
    DependencyKind, Package, RootPackage, is_valid_alias, is_valid_package_name, normalize,
};

/// Parameters for scaffolding a new sub-package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub name: String,
    pub alias: Option<String>,
    /// Directory under the packages root; defaults to the unscoped name.
    pub dir: Option<String>,
    pub template: Option<PathBuf>,
    pub no_release: bool,
    pub private_access: bool,
}

impl CreateOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn dir_name(&self) -> String {
        match &self.dir {
            Some(dir) => dir.clone(),
            None => {
                let name = normalize(&self.name);
                match name.split_once('/') {
                    Some((_, bare)) => bare.to_string(),
                    None => name,
                }
            }
        }
    }
}

/// Persistence for manifests under a workspace.
pub struct PackageStore<'a, R: Runtime> {
    runtime: &'a R,
}

impl<'a, R: Runtime> PackageStore<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self { runtime }
    }

    /// Read the sub-package rooted at `root`.
    #[tracing::instrument(skip(self))]
    pub fn read(&self, root: &Path) -> Result<Package> {
        let path = root.join(MANIFEST_FILE);
        let manifest = Manifest::load(self.runtime, &path)?;
        let package = Package::new(root.to_path_buf(), manifest);

        if !is_valid_package_name(&package.name) {
            return Err(Error::InvalidPackage {
                path,
                reason: format!("invalid package name \"{}\"", package.name),
            });
        }
        if let Some(alias) = &package.alias
            && !is_valid_alias(alias)
        {
            return Err(Error::InvalidPackage {
                path,
                reason: format!("invalid alias \"{}\"", alias),
            });
        }
        Ok(package)
    }

    /// Read the workspace root package and its lock metadata.
    #[tracing::instrument(skip(self))]
    pub fn read_root(&self, root: &Path) -> Result<RootPackage> {
        let path = root.join(MANIFEST_FILE);
        let manifest = Manifest::load(self.runtime, &path).map_err(|e| match e {
            Error::InvalidPackage { path, reason } => Error::InvalidRootPackage { path, reason },
            other => other,
        })?;

        let config = manifest
            .workspace
            .clone()
            .ok_or_else(|| Error::InvalidRootPackage {
                path: path.clone(),
                reason: "missing \"tandem\" section".into(),
            })?;
        if let Some((channel, _)) = config
            .releases
            .iter()
            .find(|(_, channel)| channel.primary_tag().is_none())
        {
            return Err(Error::InvalidRootPackage {
                path,
                reason: format!("release channel \"{}\" has no tag", channel),
            });
        }

        let lock = LockFile::load(self.runtime, &root.join(LOCK_FILE))?;
        Ok(RootPackage {
            root: root.to_path_buf(),
            manifest,
            config,
            lock,
        })
    }

    /// Write the dependency maps of `package` back to disk.
    ///
    /// The current file is re-read so that fields changed by other tools are
    /// kept; only the three dependency maps are replaced.
    #[tracing::instrument(skip(self, package), fields(name = %package.name))]
    pub fn save(&self, package: &Package) -> Result<()> {
        let path = package.manifest_path();
        let mut manifest = if self.runtime.exists(&path) {
            Manifest::load(self.runtime, &path)?
        } else {
            package.manifest.clone()
        };
        for kind in DependencyKind::ALL {
            let source = package.dependencies(kind).clone();
            match kind {
                DependencyKind::Runtime => manifest.dependencies = source,
                DependencyKind::Dev => manifest.dev_dependencies = source,
                DependencyKind::Peer => manifest.peer_dependencies = source,
            }
        }
        debug!("Saving manifest {:?}", path);
        manifest.save(self.runtime, &path)
    }

    /// Find every package root under `dir`.
    ///
    /// Descent stops at the first directory holding a manifest; manifests are
    /// never nested. `node_modules` and hidden directories are skipped.
    #[tracing::instrument(skip(self))]
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut roots = Vec::new();
        if !self.runtime.is_dir(dir) {
            return Ok(roots);
        }

        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut children = Vec::new();
            for entry in self.runtime.read_dir(&current)? {
                let skip = entry
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_none_or(|name| name.starts_with('.') || name == "node_modules");
                if skip || !self.runtime.is_dir(&entry) {
                    continue;
                }
                if self.runtime.is_file(&entry.join(MANIFEST_FILE)) {
                    roots.push(entry);
                } else {
                    children.push(entry);
                }
            }
            // Reverse so the stack yields directories in sorted order
            pending.extend(children.into_iter().rev());
        }

        roots.sort();
        Ok(roots)
    }

    /// Scaffold a package directory under `packages_dir` and read it back.
    #[tracing::instrument(skip(self))]
    pub fn create(&self, packages_dir: &Path, options: &CreateOptions) -> Result<Package> {
        let name = normalize(&options.name);
        let alias = options.alias.as_deref().map(normalize);
        let stamp = ManifestStamp {
            name: &name,
            alias: alias.as_deref(),
            no_release: options.no_release,
            private_access: options.private_access,
        };

        let target = packages_dir.join(options.dir_name());
        let manifest_path = target.join(MANIFEST_FILE);
        if self.runtime.exists(&manifest_path) {
            return Err(Error::ExistingManifest {
                path: manifest_path,
            });
        }

        match &options.template {
            Some(template) => {
                let template = Template::load(self.runtime, template)?;
                template.render(self.runtime, &target, &stamp)?;
            }
            None => {
                self.runtime.create_dir_all(&target)?;
                crate::manifest::write_json(self.runtime, &manifest_path, &stamp.default_manifest())?;
            }
        }

        debug!("Created package {} in {:?}", name, target);
        self.read(&target)
    }
}
