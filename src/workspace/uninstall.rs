//! Removing dependencies from sub-packages.

use log::{debug, info};
use std::collections::BTreeMap;

use crate::counter::Owner;
use crate::error::{Error, Result};
use crate::gateway::PackageManager;
use crate::package::{DependencySpec, is_valid_package_name};
use crate::runtime::Runtime;

use super::Workspace;

#[derive(Debug, Default)]
struct UninstallPlan {
    external: Vec<String>,
    local: Vec<String>,
    targets: Vec<String>,
}

impl<R: Runtime, G: PackageManager> Workspace<R, G> {
    /// Remove `deps` from `targets` (every package when empty).
    ///
    /// Externals are only uninstalled from the root once no package
    /// references them any more. Transactional like [`Workspace::install`].
    #[tracing::instrument(skip(self))]
    pub async fn uninstall(&mut self, deps: &[String], targets: &[String]) -> Result<()> {
        let plan = self.plan_uninstall(deps, targets)?;
        if plan.external.is_empty() && plan.local.is_empty() {
            info!("Nothing to uninstall");
            return Ok(());
        }

        let transaction = self.begin_transaction()?;
        let result = self.apply_uninstall(&plan).await;
        self.end_transaction(transaction, result)
    }

    fn plan_uninstall(&self, deps: &[String], targets: &[String]) -> Result<UninstallPlan> {
        let global = self.counter.generate_map(&Owner::Global);
        let root = self.root_package()?;
        let mut plan = UninstallPlan::default();
        let mut missing = Vec::new();

        for expression in deps {
            let name = DependencySpec::parse(expression).name;
            if let Some(local) = self.registry.resolve_name(&name) {
                if !global.contains_key(local) {
                    debug!("{} is not referenced, skipping", local);
                } else if !plan.local.iter().any(|l| l == local) {
                    plan.local.push(local.to_string());
                }
                continue;
            }

            let declared = root.manifest.declared_version(&name).is_some();
            if is_valid_package_name(&name) && (global.contains_key(&name) || declared) {
                if !plan.external.contains(&name) {
                    plan.external.push(name);
                }
            } else {
                missing.push(expression.clone());
            }
        }

        if !missing.is_empty() {
            return Err(Error::DependencyNotFound {
                dependencies: missing,
            });
        }

        plan.targets = self.registry.resolve_targets(targets)?;
        Ok(plan)
    }

    async fn apply_uninstall(&mut self, plan: &UninstallPlan) -> Result<()> {
        if !plan.external.is_empty() {
            for target in &plan.targets {
                for name in &plan.external {
                    self.record_dependency(target, name, None);
                }
            }

            let unused: Vec<String> = plan
                .external
                .iter()
                .filter(|name| self.counter.count(&Owner::Global, name) == 0)
                .cloned()
                .collect();
            if unused.is_empty() {
                debug!("External dependencies are still in use");
            } else {
                self.gateway.uninstall(&self.root, &unused).await?;
            }
        }

        for target in &plan.targets {
            if plan.local.is_empty() {
                break;
            }
            let owner = Owner::package(target.clone());
            let before = self.counter.generate_map(&owner);
            for name in &plan.local {
                self.record_dependency(target, name, None);
            }
            let after = self.counter.generate_map(&owner);

            let cwd = self.package_root(target)?;
            for name in vanished(&before, &after) {
                if self.registry.contains(&name) {
                    self.gateway.unlink(&cwd, &name).await?;
                }
            }
        }

        self.save_packages(&plan.targets)?;

        if !plan.local.is_empty() {
            self.clear_module_caches()?;
            self.bootstrap_links().await?;
        }
        Ok(())
    }

    /// Remove the `node_modules` directory of every package.
    pub(super) fn clear_module_caches(&self) -> Result<()> {
        for package in self.registry.iter() {
            let modules = package.root.join("node_modules");
            if self.runtime.exists(&modules) {
                debug!("Removing {:?}", modules);
                self.runtime.remove_dir_all(&modules)?;
            }
        }
        Ok(())
    }
}

/// Names present in `before` but gone from `after`.
fn vanished(before: &BTreeMap<String, usize>, after: &BTreeMap<String, usize>) -> Vec<String> {
    before
        .keys()
        .filter(|name| !after.contains_key(*name))
        .cloned()
        .collect()
}
