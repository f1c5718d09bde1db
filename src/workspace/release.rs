//! Releasing every publishable package as one version.
//!
//! Manifests are rewritten in place for the duration of the publish step
//! only. Whatever happens, they are put back from the backup before
//! [`Workspace::release`] returns.

use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::gateway::PackageManager;
use crate::manifest::{Manifest, ReleaseChannel};
use crate::package::{Package, RootPackage};
use crate::runtime::Runtime;
use crate::version::{Bump, compare_versions};

use super::Workspace;

/// Package manager lifecycle scripts that would run a second time on publish.
const NPM_HOOKS: [&str; 6] = [
    "prepublish",
    "prepare",
    "prepublishOnly",
    "prepack",
    "postpack",
    "publish",
];

pub const PREPUBLISH_HOOK: &str = "tandem:prepublish";
pub const POSTPUBLISH_HOOK: &str = "tandem:postpublish";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOptions {
    pub channel: String,
    /// Use this version instead of computing the next one.
    pub version: Option<String>,
    pub bump: Bump,
    /// Without this everything is passed `--dry-run`.
    pub confirmed: bool,
    pub no_clean: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecallOptions {
    pub channel: String,
    pub version: String,
    pub confirmed: bool,
}

/// What a release publishes, settled before any manifest is touched.
struct ReleasePlan<'a> {
    channel: &'a ReleaseChannel,
    tag: &'a str,
    version: String,
    packages: Vec<&'a Package>,
    published: BTreeMap<String, String>,
    confirmed: bool,
}

fn channel_config<'a>(root: &'a RootPackage, channel: &str) -> Result<&'a ReleaseChannel> {
    root.config
        .releases
        .get(channel)
        .ok_or_else(|| Error::ReleaseConfigNotFound {
            channel: channel.to_string(),
        })
}

fn registry_arg(channel: &ReleaseChannel) -> Option<String> {
    channel
        .registry
        .as_ref()
        .map(|registry| format!("--registry={}", registry))
}

impl<R: Runtime, G: PackageManager> Workspace<R, G> {
    /// Publish every releasable package of the channel. Returns the version.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, options: &ReleaseOptions) -> Result<String> {
        let root = self.root_package()?;
        let channel = channel_config(root, &options.channel)?;
        let tag = channel.primary_tag().unwrap_or("latest");

        if !options.confirmed {
            println!(
                "Simulating release of the {} channel with \"--dry-run\"...",
                options.channel
            );
        }

        let packages: Vec<&Package> = self.registry.releasable().collect();
        let names: Vec<String> = packages.iter().map(|p| p.name.clone()).collect();
        let published = self
            .gateway
            .current_version_set(&names, tag, channel.registry.clone())
            .await?;

        let version = match &options.version {
            Some(version) => version.clone(),
            None => self.next_version(root, options, channel, &published)?,
        };
        println!(
            "Releasing the {} version \"v{}\"...",
            options.channel, version
        );

        if !options.no_clean {
            self.clean(&[], false).await?;
        }

        let plan = ReleasePlan {
            channel,
            tag,
            version,
            packages,
            published,
            confirmed: options.confirmed,
        };

        let backup = self.backup(
            plan.packages
                .iter()
                .map(|package| (package.name.clone(), package.manifest_path()))
                .collect(),
        )?;
        let result = self.publish_all(root, &plan).await;
        let restored = backup.restore(&self.runtime);
        backup.discard(&self.runtime);

        result?;
        restored?;
        Ok(plan.version)
    }

    fn next_version(
        &self,
        root: &RootPackage,
        options: &ReleaseOptions,
        channel: &ReleaseChannel,
        published: &BTreeMap<String, String>,
    ) -> Result<String> {
        let namer = self
            .strategies
            .resolve(channel.versioner.as_deref())
            .ok_or_else(|| Error::InvalidRootPackage {
                path: root.manifest_path(),
                reason: format!(
                    "unknown version strategy \"{}\" (known: {})",
                    channel.versioner.as_deref().unwrap_or_default(),
                    self.strategies.names().join(", ")
                ),
            })?;

        let current = published
            .values()
            .max_by(|a, b| compare_versions(a, b))
            .map(String::as_str)
            .unwrap_or_else(|| root.version());
        debug!("Current {} version is {}", options.channel, current);
        Ok(namer.next(current, &options.channel, options.bump))
    }

    async fn publish_all(&self, root: &RootPackage, plan: &ReleasePlan<'_>) -> Result<()> {
        for package in &plan.packages {
            self.stamp_manifest(root, package, plan)?;
        }

        if root.manifest.script(PREPUBLISH_HOOK).is_some() {
            println!("Executing hook \"{}\" in the root package.", PREPUBLISH_HOOK);
            self.gateway.run(&root.root, PREPUBLISH_HOOK, &[]).await?;
        }
        for package in &plan.packages {
            if package.manifest.script(PREPUBLISH_HOOK).is_some() {
                println!(
                    "Executing hook \"{}\" of \"{}\".",
                    PREPUBLISH_HOOK, package.name
                );
                self.gateway.run(&package.root, PREPUBLISH_HOOK, &[]).await?;
            }
        }

        for package in &plan.packages {
            println!("Publishing package \"{}@{}\"...", package.name, plan.version);

            let mut args = Vec::new();
            if !plan.confirmed {
                args.push("--dry-run".to_string());
            }
            args.push("--tag".to_string());
            args.push(plan.tag.to_string());
            // First publication of a public package
            if !plan.published.contains_key(&package.name) && !package.private_access() {
                args.push("--access=public".to_string());
            }
            let output = self.gateway.publish(&package.root, &args).await?;
            debug!("{}", output);

            if !plan.confirmed {
                continue;
            }
            for tag in plan.channel.secondary_tags() {
                let mut args = vec![format!("{}@{}", package.name, plan.version), tag.clone()];
                args.extend(registry_arg(plan.channel));
                self.gateway.add_dist_tag(&package.root, &args).await?;
            }
        }

        for package in &plan.packages {
            if package.manifest.script(POSTPUBLISH_HOOK).is_some() {
                println!(
                    "Executing hook \"{}\" of \"{}\".",
                    POSTPUBLISH_HOOK, package.name
                );
                self.gateway.run(&package.root, POSTPUBLISH_HOOK, &[]).await?;
            }
        }
        Ok(())
    }

    /// Write the manifest that actually gets published.
    fn stamp_manifest(
        &self,
        root: &RootPackage,
        package: &Package,
        plan: &ReleasePlan<'_>,
    ) -> Result<()> {
        let path = package.manifest_path();
        let mut manifest = Manifest::load(&self.runtime, &path)?;
        manifest.version = Some(plan.version.clone());

        for deps in [&mut manifest.dependencies, &mut manifest.peer_dependencies] {
            for (dependency, version) in deps.iter_mut() {
                *version = self.dependency_version(root, &package.name, dependency, &plan.version)?;
            }
        }

        for hook in NPM_HOOKS {
            if manifest.scripts.remove(hook).is_some() {
                warn!(
                    "Ignored lifecycle script \"{}\" of \"{}\"",
                    hook, package.name
                );
            }
        }

        if let Some(registry) = &plan.channel.registry {
            manifest
                .publish_config
                .get_or_insert_with(Map::new)
                .insert("registry".to_string(), Value::String(registry.clone()));
        }

        manifest.save(&self.runtime, &path)
    }

    /// Version expression a released package records for `dependency`.
    fn dependency_version(
        &self,
        root: &RootPackage,
        package: &str,
        dependency: &str,
        version: &str,
    ) -> Result<String> {
        let lock = root.config.lock;

        if let Some(local) = self.registry.lookup(dependency, false)? {
            if local.no_release() {
                return Err(Error::PrivateDependencyViolation {
                    package: package.to_string(),
                    dependency: dependency.to_string(),
                });
            }
            return Ok(lock.range(version));
        }

        if let Some(installed) = root.lock.installed_version(dependency) {
            return Ok(lock.range(installed));
        }
        root.manifest
            .declared_version(dependency)
            .map(str::to_string)
            .ok_or_else(|| Error::DependencyNotLocked {
                package: package.to_string(),
                dependency: dependency.to_string(),
            })
    }

    /// Unpublish `version` of every releasable package.
    #[tracing::instrument(skip(self))]
    pub async fn recall(&self, options: &RecallOptions) -> Result<()> {
        let channel = channel_config(self.root_package()?, &options.channel)?;

        for package in self.registry.releasable() {
            println!("Recalling package \"{}@{}\"...", package.name, options.version);
            let mut args = vec![format!("{}@{}", package.name, options.version)];
            if !options.confirmed {
                args.push("--dry-run".to_string());
            }
            args.extend(registry_arg(channel));
            self.gateway.unpublish(&package.root, &args).await?;
        }
        Ok(())
    }

    /// Mark every releasable package deprecated within the version `scope`.
    #[tracing::instrument(skip(self))]
    pub async fn deprecate(&self, scope: &str, message: &str) -> Result<()> {
        for package in self.registry.releasable() {
            println!("Deprecating \"{}@{}\"...", package.name, scope);
            let args = vec![format!("{}@{}", package.name, scope), message.to_string()];
            self.gateway.deprecate(&package.root, &args).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::gateway::MockPackageManager;
    use crate::version::{VersionNamer, VersionStrategies};
    use std::fs;
    use std::path::Path;

    const LOCK: &str = r#"{
  "lockfileVersion": 3,
  "packages": {
    "node_modules/lodash": { "version": "4.17.21" }
  }
}"#;

    /// core, app (depends on core and lodash, has hooks) and an unreleased tool.
    fn release_dir() -> tempfile::TempDir {
        let dir = workspace_dir(&["core"]);
        fs::write(dir.path().join("package-lock.json"), LOCK).unwrap();
        write_package(
            dir.path(),
            "app",
            r#"{
  "name": "app",
  "version": "0.0.1",
  "scripts": {
    "prepare": "tsc",
    "tandem:prepublish": "make",
    "tandem:postpublish": "make notify"
  },
  "dependencies": {
    "core": "-",
    "lodash": "-"
  }
}
"#,
        );
        write_package(
            dir.path(),
            "tool",
            r#"{"name":"tool","private":true,"dependencies":{"core":"-"}}"#,
        );
        dir
    }

    fn manifest_at(cwd: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(cwd.join("package.json")).unwrap()).unwrap()
    }

    fn published(versions: &[(&str, &str)]) -> BTreeMap<String, String> {
        versions
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_release_dry_run_rewrites_then_restores() {
        let dir = release_dir();
        let app_before = read(&dir, "packages/app/package.json");
        let core_before = read(&dir, "packages/core/package.json");

        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .withf(|names, tag, registry| {
                names == ["app", "core"] && tag == "latest" && registry.is_none()
            })
            .returning(|_, _, _| Ok(published(&[("core", "1.2.0")])));
        gateway
            .expect_run()
            .withf(|_, script, args| script == PREPUBLISH_HOOK && args.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(String::new()));
        gateway
            .expect_run()
            .withf(|_, script, args| script == POSTPUBLISH_HOOK && args.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(String::new()));
        gateway
            .expect_publish()
            .withf(|cwd, _| cwd.ends_with("app"))
            .times(1)
            .returning(|cwd, args| {
                assert_eq!(args, ["--dry-run", "--tag", "latest", "--access=public"]);
                let manifest = manifest_at(cwd);
                assert_eq!(manifest["version"], "1.3.0");
                assert_eq!(manifest["dependencies"]["core"], "^1.3.0");
                assert_eq!(manifest["dependencies"]["lodash"], "^4.17.21");
                assert!(manifest["scripts"].get("prepare").is_none());
                assert!(manifest["scripts"].get(PREPUBLISH_HOOK).is_some());
                assert!(manifest.get("publishConfig").is_none());
                Ok(String::new())
            });
        gateway
            .expect_publish()
            .withf(|cwd, _| cwd.ends_with("core"))
            .times(1)
            .returning(|cwd, args| {
                assert_eq!(args, ["--dry-run", "--tag", "latest"]);
                assert_eq!(manifest_at(cwd)["version"], "1.3.0");
                Ok(String::new())
            });
        let workspace = open(&dir, gateway);

        let version = workspace
            .release(&ReleaseOptions {
                channel: "production".into(),
                bump: Bump::FEATURE,
                no_clean: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(version, "1.3.0");
        assert_eq!(read(&dir, "packages/app/package.json"), app_before);
        assert_eq!(read(&dir, "packages/core/package.json"), core_before);
        assert_eq!(
            fs::read_dir(dir.path().join(".tandem/tmp/packages.d"))
                .unwrap()
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn test_release_falls_back_to_root_version() {
        let dir = workspace_dir(&["core"]);
        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .returning(|_, _, _| Ok(BTreeMap::new()));
        gateway
            .expect_publish()
            .returning(|_, _| Ok(String::new()));
        let workspace = open(&dir, gateway);

        let version = workspace
            .release(&ReleaseOptions {
                channel: "production".into(),
                bump: Bump::BREAKING,
                no_clean: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(version, "2.0.0");
    }

    #[tokio::test]
    async fn test_confirmed_release_applies_secondary_tags() {
        let dir = workspace_dir(&["core"]);
        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .withf(|_, tag, registry| {
                tag == "next" && registry.as_deref() == Some("https://npm.example.com/")
            })
            .returning(|_, _, _| Ok(published(&[("core", "1.9.0")])));
        gateway
            .expect_publish()
            .times(1)
            .returning(|cwd, args| {
                assert_eq!(args, ["--tag", "next"]);
                assert_eq!(
                    manifest_at(cwd)["publishConfig"]["registry"],
                    "https://npm.example.com/"
                );
                Ok(String::new())
            });
        gateway
            .expect_add_dist_tag()
            .withf(|_, args| {
                args == ["core@2.0.0-beta", "beta", "--registry=https://npm.example.com/"]
            })
            .times(1)
            .returning(|_, _| Ok(String::new()));
        let workspace = open(&dir, gateway);

        let version = workspace
            .release(&ReleaseOptions {
                channel: "beta".into(),
                version: Some("2.0.0-beta".into()),
                confirmed: true,
                no_clean: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(version, "2.0.0-beta");
    }

    #[tokio::test]
    async fn test_publish_failure_restores_manifests() {
        let dir = release_dir();
        let before = read(&dir, "packages/app/package.json");

        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .returning(|_, _, _| Ok(BTreeMap::new()));
        gateway.expect_run().returning(|_, _, _| Ok(String::new()));
        gateway.expect_publish().returning(|cwd, _| {
            Err(Error::ShellFailed {
                command: "npm publish".into(),
                cwd: cwd.to_path_buf(),
                code: Some(1),
                output: "E403".into(),
            })
        });
        let workspace = open(&dir, gateway);

        let result = workspace
            .release(&ReleaseOptions {
                channel: "production".into(),
                no_clean: true,
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(Error::ShellFailed { .. })));
        assert_eq!(read(&dir, "packages/app/package.json"), before);
    }

    #[tokio::test]
    async fn test_release_unknown_channel() {
        let dir = workspace_dir(&["core"]);
        let workspace = open(&dir, MockPackageManager::new());

        assert!(matches!(
            workspace
                .release(&ReleaseOptions {
                    channel: "nightly".into(),
                    ..Default::default()
                })
                .await,
            Err(Error::ReleaseConfigNotFound { .. })
        ));
    }

    struct Nightly;

    impl VersionNamer for Nightly {
        fn next(&self, current: &str, channel: &str, _bump: Bump) -> String {
            format!("{}-{}.1", current, channel)
        }
    }

    #[tokio::test]
    async fn test_release_with_registered_strategy() {
        let dir = workspace_dir(&["core"]);
        let manifest = ROOT_MANIFEST.replace(
            r#""production": { "tag": "latest" },"#,
            r#""production": { "tag": "latest" },
      "nightly": { "tag": "nightly", "versioner": "nightly" },
      "canary": { "tag": "canary", "versioner": "missing" },"#,
        );
        fs::write(dir.path().join("package.json"), manifest).unwrap();

        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .returning(|_, _, _| Ok(published(&[("core", "1.4.0")])));
        gateway
            .expect_publish()
            .withf(|_, args| args == ["--dry-run", "--tag", "nightly"])
            .times(1)
            .returning(|_, _| Ok(String::new()));
        let mut strategies = VersionStrategies::new();
        strategies.register("nightly", Box::new(Nightly));
        let workspace = open(&dir, gateway).with_strategies(strategies);

        let version = workspace
            .release(&ReleaseOptions {
                channel: "nightly".into(),
                no_clean: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(version, "1.4.0-nightly.1");

        let err = workspace
            .release(&ReleaseOptions {
                channel: "canary".into(),
                no_clean: true,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("known: builtin, nightly"));
    }

    #[tokio::test]
    async fn test_release_rejects_unreleasable_dependency() {
        let dir = workspace_dir(&[]);
        write_package(
            dir.path(),
            "secret",
            r#"{"name":"secret","private":true}"#,
        );
        write_package(
            dir.path(),
            "app",
            r#"{"name":"app","peerDependencies":{"secret":"-"}}"#,
        );
        let before = read(&dir, "packages/app/package.json");
        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .returning(|_, _, _| Ok(BTreeMap::new()));
        let workspace = open(&dir, gateway);

        let result = workspace
            .release(&ReleaseOptions {
                channel: "production".into(),
                no_clean: true,
                ..Default::default()
            })
            .await;
        match result {
            Err(Error::PrivateDependencyViolation {
                package,
                dependency,
            }) => {
                assert_eq!(package, "app");
                assert_eq!(dependency, "secret");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(read(&dir, "packages/app/package.json"), before);
    }

    #[tokio::test]
    async fn test_release_requires_locked_externals() {
        let dir = workspace_dir(&[]);
        write_package(
            dir.path(),
            "app",
            r#"{"name":"app","dependencies":{"left-pad":"-"}}"#,
        );
        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .returning(|_, _, _| Ok(BTreeMap::new()));
        let workspace = open(&dir, gateway);

        assert!(matches!(
            workspace
                .release(&ReleaseOptions {
                    channel: "production".into(),
                    no_clean: true,
                    ..Default::default()
                })
                .await,
            Err(Error::DependencyNotLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_root_declared_external_is_used_verbatim() {
        let dir = workspace_dir(&[]);
        write_package(
            dir.path(),
            "app",
            r#"{"name":"app","dependencies":{"lodash":"-"}}"#,
        );
        let mut gateway = MockPackageManager::new();
        gateway
            .expect_current_version_set()
            .returning(|_, _, _| Ok(BTreeMap::new()));
        gateway.expect_publish().times(1).returning(|cwd, _| {
            assert_eq!(manifest_at(cwd)["dependencies"]["lodash"], "^4.17.21");
            Ok(String::new())
        });
        let workspace = open(&dir, gateway);

        workspace
            .release(&ReleaseOptions {
                channel: "production".into(),
                no_clean: true,
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recall_and_deprecate() {
        let dir = release_dir();
        let mut gateway = MockPackageManager::new();
        gateway
            .expect_unpublish()
            .withf(|_, args| {
                args == ["app@1.0.0", "--registry=https://npm.example.com/"]
                    || args == ["core@1.0.0", "--registry=https://npm.example.com/"]
            })
            .times(2)
            .returning(|_, _| Ok(String::new()));
        gateway
            .expect_deprecate()
            .withf(|_, args| args[0].ends_with("@<1.0.0") && args[1] == "use 1.x")
            .times(2)
            .returning(|_, _| Ok(String::new()));
        let workspace = open(&dir, gateway);

        workspace
            .recall(&RecallOptions {
                channel: "beta".into(),
                version: "1.0.0".into(),
                confirmed: true,
            })
            .await
            .unwrap();
        workspace.deprecate("<1.0.0", "use 1.x").await.unwrap();

        assert!(matches!(
            workspace
                .recall(&RecallOptions {
                    channel: "nope".into(),
                    ..Default::default()
                })
                .await,
            Err(Error::ReleaseConfigNotFound { .. })
        ));
    }
}
