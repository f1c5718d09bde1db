//! Installing dependencies into sub-packages.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::gateway::PackageManager;
use crate::manifest::PLACEHOLDER_VERSION;
use crate::package::{DependencyKind, DependencySpec, is_valid_package_name};
use crate::runtime::Runtime;

use super::Workspace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Record as peer dependencies.
    pub peer: bool,
    /// Record as dev dependencies.
    pub dev: bool,
    /// Link only; leave manifests and reference counts alone.
    pub no_save: bool,
    /// Skip the tree-wide link pass after local installs.
    pub no_bootstrap: bool,
}

#[derive(Debug, Default)]
pub(super) struct InstallPlan {
    pub external: Vec<DependencySpec>,
    pub local: Vec<String>,
    pub targets: Vec<String>,
}

enum LinkStep {
    Visit {
        dependency: String,
        target: String,
        /// Targets above this one in the current chain.
        path: Vec<String>,
        kind: DependencyKind,
        save: bool,
    },
    Link {
        dependency: String,
        target: String,
    },
}

impl<R: Runtime, G: PackageManager> Workspace<R, G> {
    /// Install `deps` into `targets` (every package when empty).
    ///
    /// Dependencies naming a sub-package (or `@@alias`) are linked locally;
    /// anything else is installed from the registry at the workspace root.
    /// Unless `no_save` is set the whole call is transactional.
    #[tracing::instrument(skip(self))]
    pub async fn install(
        &mut self,
        deps: &[String],
        targets: &[String],
        options: InstallOptions,
    ) -> Result<()> {
        let plan = self.plan_install(deps, targets)?;
        if plan.external.is_empty() && plan.local.is_empty() {
            info!("Nothing to install");
            return Ok(());
        }

        if options.no_save {
            return self.apply_install(&plan, options).await;
        }

        let transaction = self.begin_transaction()?;
        let result = self.apply_install(&plan, options).await;
        self.end_transaction(transaction, result)
    }

    /// Split expressions into external and local, and resolve targets.
    /// Runs before anything is touched.
    pub(super) fn plan_install(&self, deps: &[String], targets: &[String]) -> Result<InstallPlan> {
        let mut plan = InstallPlan::default();
        let mut invalid = Vec::new();

        for expression in deps {
            let spec = DependencySpec::parse(expression);
            if let Some(name) = self.registry.resolve_name(&spec.name) {
                if !plan.local.iter().any(|local| local == name) {
                    plan.local.push(name.to_string());
                }
            } else if is_valid_package_name(&spec.name) {
                if !plan.external.iter().any(|ext| ext.name == spec.name) {
                    plan.external.push(spec);
                }
            } else {
                invalid.push(expression.clone());
            }
        }

        if !invalid.is_empty() {
            return Err(Error::InvalidPackageName { names: invalid });
        }

        plan.targets = self.registry.resolve_targets(targets)?;
        Ok(plan)
    }

    async fn apply_install(&mut self, plan: &InstallPlan, options: InstallOptions) -> Result<()> {
        if !plan.external.is_empty() {
            self.gateway
                .install(&self.root, &plan.external, options.peer, options.dev)
                .await?;

            // Dev-only externals live in the root manifest alone
            let kind = (!options.dev).then(|| DependencyKind::from_flags(options.peer, false));
            for dep in &plan.external {
                for target in &plan.targets {
                    self.record_dependency(target, &dep.name, kind);
                }
            }
        }

        let kind = DependencyKind::from_flags(options.peer, options.dev);
        for dep in &plan.local {
            for target in &plan.targets {
                self.link_local(dep, target, kind, !options.no_save).await?;
            }
        }

        if !options.no_save {
            self.save_packages(&plan.targets)?;
        }

        if !plan.local.is_empty() && !options.no_bootstrap {
            self.bootstrap_links().await?;
        }
        Ok(())
    }

    /// Clear `name` from every map of `target`; write the placeholder into
    /// `kind` when given. Keeps the reference counter in step.
    pub(super) fn record_dependency(
        &mut self,
        target: &str,
        name: &str,
        kind: Option<DependencyKind>,
    ) {
        let Some(package) = self.registry.get_mut(target) else {
            return;
        };
        let had = package.remove_dependency(name);
        if let Some(kind) = kind {
            package.set_dependency(kind, name, PLACEHOLDER_VERSION);
        }
        match (had, kind.is_some()) {
            (true, false) => self.counter.remove(target, &[name]),
            (false, true) => self.counter.add(target, &[name]),
            _ => {}
        }
    }

    /// Link local `dependency` into `target`, first linking the dependency's
    /// own local runtime and peer dependencies into it.
    ///
    /// Walks an explicit stack; the chain of targets above each step is
    /// carried along so cycles are reported instead of followed.
    async fn link_local(
        &mut self,
        dependency: &str,
        target: &str,
        kind: DependencyKind,
        save: bool,
    ) -> Result<()> {
        let mut steps = vec![LinkStep::Visit {
            dependency: dependency.to_string(),
            target: target.to_string(),
            path: Vec::new(),
            kind,
            save,
        }];

        while let Some(step) = steps.pop() {
            match step {
                LinkStep::Link { dependency, target } => {
                    let cwd = self.package_root(&target)?;
                    let destination = self.package_root(&dependency)?;
                    self.gateway.link(&cwd, &dependency, &destination).await?;
                }
                LinkStep::Visit {
                    dependency,
                    target,
                    path,
                    kind,
                    save,
                } => {
                    if dependency == target {
                        continue;
                    }
                    let Some(package) = self.registry.get(&dependency) else {
                        return Err(Error::PackageNotFound { name: dependency });
                    };
                    if package.has_dependency(&target)
                        || path.contains(&target)
                        || path.contains(&dependency)
                    {
                        return Err(Error::RecursiveDependency {
                            package: target,
                            dependency,
                        });
                    }

                    let indirect = self.registry.local_dependencies(
                        &dependency,
                        &[DependencyKind::Runtime, DependencyKind::Peer],
                    );
                    if save {
                        self.record_dependency(&target, &dependency, Some(kind));
                    }
                    debug!("Linking {} into {}", dependency, target);

                    steps.push(LinkStep::Link {
                        dependency: dependency.clone(),
                        target: target.clone(),
                    });
                    let mut chain = path;
                    chain.push(target);
                    for next in indirect.into_iter().rev() {
                        steps.push(LinkStep::Visit {
                            dependency: next,
                            target: dependency.clone(),
                            path: chain.clone(),
                            kind: DependencyKind::Runtime,
                            save: false,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-link every package's recorded local dependencies.
    pub(super) async fn bootstrap_links(&mut self) -> Result<()> {
        for name in self.registry.names() {
            for dep in self.registry.local_dependencies(&name, &DependencyKind::ALL) {
                self.link_local(&dep, &name, DependencyKind::Runtime, false)
                    .await?;
            }
        }
        Ok(())
    }
}
