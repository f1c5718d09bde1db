use log::{debug, warn};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::gateway::PackageManager;
use crate::manifest::{MANIFEST_FILE, WorkspaceConfig, read_json, write_json};
use crate::runtime::Runtime;

use super::Workspace;

pub const CLEAN_SCRIPT: &str = "clean";
pub const ROOT_CLEAN_HOOK: &str = "tandem:clean";

const INITIAL_VERSION: &str = "0.1.0";
const WORKSPACE_DIR: &str = ".tandem";
const GITIGNORE: &str = ".gitignore";

impl<R: Runtime, G: PackageManager> Workspace<R, G> {
    /// Run `script` in the selected packages (all when empty), and/or the root.
    #[tracing::instrument(skip(self))]
    pub async fn run(
        &self,
        packages: &[String],
        script: &str,
        args: &[String],
        with_root: bool,
        root_only: bool,
    ) -> Result<()> {
        if !root_only {
            for name in self.registry.resolve_targets(packages)? {
                let Some(package) = self.registry.get(&name) else {
                    continue;
                };
                if package.manifest.script(script).is_none() {
                    warn!("Package \"{}\" has no script \"{}\"", name, script);
                    continue;
                }
                println!("Running \"{}\" in \"{}\"...", script, name);
                print_output(&self.gateway.run(&package.root, script, args).await?);
            }
        }

        if with_root || root_only {
            let root = self.root_package()?;
            if root.manifest.script(script).is_none() {
                warn!("The root package has no script \"{}\"", script);
            } else {
                println!("Running \"{}\" in the root package...", script);
                print_output(&self.gateway.run(&root.root, script, args).await?);
            }
        }
        Ok(())
    }

    /// Run the `clean` scripts, then the root's clean hook.
    ///
    /// `full` also drops every `node_modules` directory, root included.
    #[tracing::instrument(skip(self))]
    pub async fn clean(&self, packages: &[String], full: bool) -> Result<()> {
        for name in self.registry.resolve_targets(packages)? {
            let Some(package) = self.registry.get(&name) else {
                continue;
            };
            if package.manifest.script(CLEAN_SCRIPT).is_some() {
                println!("Cleaning \"{}\"...", name);
                self.gateway.run(&package.root, CLEAN_SCRIPT, &[]).await?;
            }
        }

        let root = self.root_package()?;
        if root.manifest.script(ROOT_CLEAN_HOOK).is_some() {
            println!("Executing hook \"{}\" in the root package.", ROOT_CLEAN_HOOK);
            self.gateway.run(&root.root, ROOT_CLEAN_HOOK, &[]).await?;
        }

        if full {
            self.clear_module_caches()?;
            let modules = self.root.join("node_modules");
            if self.runtime.exists(&modules) {
                debug!("Removing {:?}", modules);
                self.runtime.remove_dir_all(&modules)?;
            }
        }
        Ok(())
    }

    /// Install the root's external dependencies, then link every package's
    /// local ones.
    #[tracing::instrument(skip(self))]
    pub async fn bootstrap(&mut self, no_install: bool, ci: bool) -> Result<()> {
        if !no_install {
            self.gateway.bootstrap(&self.root, ci).await?;
        }
        self.bootstrap_links().await
    }

    /// Turn the directory this workspace was created with into a root.
    ///
    /// An existing manifest is only adopted when `confirmed`. The workspace
    /// is loaded afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&mut self, confirmed: bool) -> Result<()> {
        let path = self.root.join(MANIFEST_FILE);
        let created = !self.runtime.exists(&path);
        if created {
            self.gateway.init(&self.root).await?;
        } else if !confirmed {
            return Err(Error::ExistingManifest { path });
        }

        let mut value = read_json(&self.runtime, &path)?;
        let Some(manifest) = value.as_object_mut() else {
            return Err(Error::InvalidManifestFile {
                path,
                reason: "not a JSON object".into(),
            });
        };

        manifest.insert("private".into(), Value::Bool(true));
        if created || !manifest.contains_key("version") {
            manifest.insert("version".into(), Value::String(INITIAL_VERSION.into()));
        }
        if !manifest.contains_key("tandem") {
            let config =
                serde_json::to_value(WorkspaceConfig::initial()).map_err(anyhow::Error::from)?;
            manifest.insert("tandem".into(), config);
        }
        write_json(&self.runtime, &path, &value)?;

        self.runtime.create_dir_all(&self.packages_dir())?;
        self.ignore_workspace_dir()?;

        println!("Initialized workspace in {:?}", self.root);
        self.reload()
    }

    /// Prepend the workspace directory to an existing `.gitignore`.
    fn ignore_workspace_dir(&self) -> Result<()> {
        let path = self.root.join(GITIGNORE);
        if !self.runtime.is_file(&path) {
            return Ok(());
        }
        let content = self.runtime.read_to_string(&path)?;
        if content.lines().any(|line| line.trim() == WORKSPACE_DIR) {
            return Ok(());
        }
        self.runtime
            .write(&path, format!("{}\n{}", WORKSPACE_DIR, content).as_bytes())?;
        Ok(())
    }
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{}", output);
    }
}
