//! Contract with the external package manager.
//!
//! The workspace never shells out or talks to the registry directly; it goes
//! through [`PackageManager`] so every orchestration path can be tested with
//! a mock. [`NpmGateway`] is the real implementation.

mod npm;
mod registry;

pub use npm::NpmGateway;
pub use registry::{DEFAULT_REGISTRY_URL, RegistryClient};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::package::DependencySpec;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Create a default manifest in `cwd`.
    async fn init(&self, cwd: &Path) -> Result<()>;

    /// Whether `name` is known to the registry.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Install external dependencies into the manifest at `cwd`.
    async fn install(
        &self,
        cwd: &Path,
        deps: &[DependencySpec],
        peer: bool,
        dev: bool,
    ) -> Result<()>;

    /// Install everything the manifest at `cwd` declares.
    async fn bootstrap(&self, cwd: &Path, ci: bool) -> Result<()>;

    async fn uninstall(&self, cwd: &Path, names: &[String]) -> Result<()>;

    async fn run(&self, cwd: &Path, script: &str, args: &[String]) -> Result<String>;
    async fn publish(&self, cwd: &Path, args: &[String]) -> Result<String>;
    async fn unpublish(&self, cwd: &Path, args: &[String]) -> Result<String>;
    async fn add_dist_tag(&self, cwd: &Path, args: &[String]) -> Result<String>;
    async fn deprecate(&self, cwd: &Path, args: &[String]) -> Result<String>;

    /// Make `name` resolvable from `cwd` by linking it to `target`. Idempotent.
    async fn link(&self, cwd: &Path, name: &str, target: &Path) -> Result<()>;

    /// Remove the module link for `name` under `cwd` if there is one.
    async fn unlink(&self, cwd: &Path, name: &str) -> Result<()>;

    /// Published version of `name` under `tag`, or the highest published
    /// version when the tag is absent. Fails with `PackageNotReleased` when
    /// the registry does not know the package.
    async fn current_version(&self, name: &str, tag: &str) -> Result<String>;

    /// [`PackageManager::current_version`] for many packages at once,
    /// asked of `registry` when given. Unpublished packages are left out
    /// of the map.
    async fn current_version_set(
        &self,
        names: &[String],
        tag: &str,
        registry: Option<String>,
    ) -> Result<BTreeMap<String, String>>;
}
