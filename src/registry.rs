//! In-memory index of the sub-packages of one workspace.

use log::debug;
use std::collections::BTreeMap;
use std::path::Path;

use crate::counter::DependencyCounter;
use crate::error::{Error, Result};
use crate::package::{
    ALIAS_PREFIX, CreateOptions, DependencyKind, Package, PackageInfo, PackageStore,
    is_valid_alias, is_valid_package_name, normalize,
};
use crate::runtime::Runtime;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageRegistry {
    packages: BTreeMap<String, Package>,
    aliases: BTreeMap<String, String>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from already-read packages.
    pub fn from_packages(packages: Vec<Package>) -> Result<Self> {
        let mut registry = Self::new();
        for package in packages {
            registry.insert(package)?;
        }
        Ok(registry)
    }

    /// Rescan `packages_dir` and replace the index.
    ///
    /// Nothing changes unless every manifest reads cleanly.
    #[tracing::instrument(skip(self, store))]
    pub fn reload<R: Runtime>(
        &mut self,
        store: &PackageStore<'_, R>,
        packages_dir: &Path,
    ) -> Result<()> {
        let packages = store
            .scan(packages_dir)?
            .iter()
            .map(|root| store.read(root))
            .collect::<Result<Vec<_>>>()?;
        *self = Self::from_packages(packages)?;
        debug!("Loaded {} package(s) from {:?}", self.len(), packages_dir);
        Ok(())
    }

    /// Add a package, enforcing unique names and aliases.
    pub fn insert(&mut self, package: Package) -> Result<()> {
        if self.packages.contains_key(&package.name) {
            return Err(Error::DuplicatePackage { name: package.name });
        }
        if let Some(alias) = &package.alias
            && let Some(owner) = self.aliases.get(alias)
        {
            return Err(Error::DuplicatePackageAlias {
                alias: alias.clone(),
                packages: vec![owner.clone(), package.name.clone()],
            });
        }
        if let Some(alias) = &package.alias {
            self.aliases.insert(alias.clone(), package.name.clone());
        }
        self.packages.insert(package.name.clone(), package);
        Ok(())
    }

    /// Validate and scaffold a new package, then index it.
    pub fn create_package<R: Runtime>(
        &mut self,
        store: &PackageStore<'_, R>,
        packages_dir: &Path,
        options: &CreateOptions,
    ) -> Result<PackageInfo> {
        let name = normalize(&options.name);
        if !is_valid_package_name(&name) {
            return Err(Error::InvalidPackageName {
                names: vec![options.name.clone()],
            });
        }
        if self.packages.contains_key(&name) {
            return Err(Error::DuplicatePackage { name });
        }
        if let Some(alias) = options.alias.as_deref().map(normalize) {
            if !is_valid_alias(&alias) {
                return Err(Error::InvalidPackageName {
                    names: vec![format!("{}{}", ALIAS_PREFIX, alias)],
                });
            }
            if let Some(owner) = self.aliases.get(&alias) {
                return Err(Error::DuplicatePackageAlias {
                    alias,
                    packages: vec![owner.clone(), name],
                });
            }
        }

        let package = store.create(packages_dir, options)?;
        let info = package.info();
        self.insert(package)?;
        Ok(info)
    }

    /// Canonical package name for a name or `@@alias`.
    pub fn resolve_name(&self, name_or_alias: &str) -> Option<&str> {
        let key = normalize(name_or_alias);
        match key.strip_prefix(ALIAS_PREFIX) {
            Some(alias) => self.aliases.get(alias).map(String::as_str),
            None => self
                .packages
                .get_key_value(&key)
                .map(|(name, _)| name.as_str()),
        }
    }

    /// Find a package; `Ok(None)` when absent unless `assert_exists`.
    pub fn lookup(&self, name_or_alias: &str, assert_exists: bool) -> Result<Option<&Package>> {
        let found = self
            .resolve_name(name_or_alias)
            .and_then(|name| self.packages.get(name));
        match found {
            None if assert_exists => Err(Error::PackageNotFound {
                name: name_or_alias.to_string(),
            }),
            found => Ok(found),
        }
    }

    pub fn get_package(&self, name_or_alias: &str) -> Result<PackageInfo> {
        self.lookup(name_or_alias, true)?
            .map(Package::info)
            .ok_or_else(|| Error::PackageNotFound {
                name: name_or_alias.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.packages.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Resolve user-supplied package names; an empty list means every package.
    pub fn resolve_targets(&self, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(self.names());
        }
        let mut resolved = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.resolve_name(name) {
                Some(found) if !resolved.iter().any(|r| r == found) => {
                    resolved.push(found.to_string())
                }
                Some(_) => {}
                None => unknown.push(name.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(Error::UnknownSubPackage { packages: unknown });
        }
        Ok(resolved)
    }

    /// Packages that can be published, in name order.
    pub fn releasable(&self) -> impl Iterator<Item = &Package> {
        self.iter().filter(|package| !package.no_release())
    }

    /// Local dependency names of `name` across the given kinds.
    pub fn local_dependencies(&self, name: &str, kinds: &[DependencyKind]) -> Vec<String> {
        self.get(name)
            .map(|package| {
                package
                    .dependency_names(kinds)
                    .into_iter()
                    .filter(|dep| self.contains(dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reference counts for every dependency recorded in the index.
    pub fn count_dependencies(&self) -> DependencyCounter {
        let mut counter = DependencyCounter::new();
        for package in self.iter() {
            counter.add(
                &package.name,
                &package.dependency_names(&DependencyKind::ALL),
            );
        }
        counter
    }
}
