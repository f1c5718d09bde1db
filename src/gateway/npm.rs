//! [`PackageManager`] backed by the `npm` command line and the registry HTTP API.

use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::package::DependencySpec;
use crate::runtime::{Runtime, normalize_path, relative_symlink_path};
use crate::version::compare_versions;

use super::{PackageManager, RegistryClient};

const MODULES_DIR: &str = "node_modules";

pub struct NpmGateway<R: Runtime> {
    runtime: R,
    program: String,
    registry: RegistryClient,
}

impl<R: Runtime> NpmGateway<R> {
    pub fn new(runtime: R, program: impl Into<String>, registry: RegistryClient) -> Self {
        Self {
            runtime,
            program: program.into(),
            registry,
        }
    }

    /// Run the package manager in `cwd`; a non-zero exit is [`Error::ShellFailed`].
    async fn npm(&self, cwd: &Path, args: Vec<String>) -> Result<String> {
        if !self.runtime.is_dir(cwd) {
            return Err(Error::InvalidPath {
                path: cwd.to_path_buf(),
            });
        }

        let command = format!("{} {}", self.program, args.join(" "));
        debug!("Running `{}` in {:?}", command, cwd);

        let output = self
            .runtime
            .exec(cwd, &self.program, &args)
            .await
            .map_err(|e| Error::GatewayError {
                message: format!("{:#}", e),
            })?;

        if !output.success() {
            return Err(Error::ShellFailed {
                command,
                cwd: cwd.to_path_buf(),
                code: output.code,
                output: output.combined(),
            });
        }
        Ok(output.combined())
    }
}

async fn tagged_version(registry: &RegistryClient, name: &str, tag: &str) -> Result<String> {
    let not_released = || Error::PackageNotReleased {
        name: name.to_string(),
    };
    let tags = registry.dist_tags(name).await?.ok_or_else(not_released)?;
    if let Some(version) = tags.get(tag) {
        return Ok(version.clone());
    }
    tags.into_values()
        .max_by(|a, b| compare_versions(a, b))
        .ok_or_else(not_released)
}

fn command(head: &[&str], args: &[String]) -> Vec<String> {
    head.iter()
        .map(|s| s.to_string())
        .chain(args.iter().cloned())
        .collect()
}

#[async_trait]
impl<R: Runtime> PackageManager for NpmGateway<R> {
    async fn init(&self, cwd: &Path) -> Result<()> {
        self.npm(cwd, command(&["init", "--yes"], &[])).await?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.registry.dist_tags(name).await?.is_some())
    }

    async fn install(
        &self,
        cwd: &Path,
        deps: &[DependencySpec],
        peer: bool,
        dev: bool,
    ) -> Result<()> {
        if deps.is_empty() {
            return Ok(());
        }
        let mut args = vec!["install".to_string()];
        args.extend(deps.iter().map(DependencySpec::expression));
        if peer {
            args.push("--save-peer".into());
        } else if dev {
            args.push("--save-dev".into());
        }
        self.npm(cwd, args).await?;
        Ok(())
    }

    async fn bootstrap(&self, cwd: &Path, ci: bool) -> Result<()> {
        let subcommand = if ci { "ci" } else { "install" };
        self.npm(cwd, command(&[subcommand], &[])).await?;
        Ok(())
    }

    async fn uninstall(&self, cwd: &Path, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.npm(cwd, command(&["uninstall"], names)).await?;
        Ok(())
    }

    async fn run(&self, cwd: &Path, script: &str, args: &[String]) -> Result<String> {
        let mut full = command(&["run", script], &[]);
        if !args.is_empty() {
            full.push("--".into());
            full.extend(args.iter().cloned());
        }
        self.npm(cwd, full).await
    }

    async fn publish(&self, cwd: &Path, args: &[String]) -> Result<String> {
        self.npm(cwd, command(&["publish"], args)).await
    }

    async fn unpublish(&self, cwd: &Path, args: &[String]) -> Result<String> {
        self.npm(cwd, command(&["unpublish"], args)).await
    }

    async fn add_dist_tag(&self, cwd: &Path, args: &[String]) -> Result<String> {
        self.npm(cwd, command(&["dist-tag", "add"], args)).await
    }

    async fn deprecate(&self, cwd: &Path, args: &[String]) -> Result<String> {
        self.npm(cwd, command(&["deprecate"], args)).await
    }

    async fn link(&self, cwd: &Path, name: &str, target: &Path) -> Result<()> {
        let link = cwd.join(MODULES_DIR).join(name);
        if self.runtime.is_symlink(&link) {
            let current = self.runtime.resolve_link(&link)?;
            if normalize_path(&current) == normalize_path(target) {
                debug!("{:?} already linked", link);
                return Ok(());
            }
            warn!("Replacing stale link {:?} -> {:?}", link, current);
            self.runtime.remove_symlink(&link)?;
        } else if self.runtime.exists(&link) {
            debug!("{:?} already present", link);
            return Ok(());
        }
        if let Some(parent) = link.parent() {
            self.runtime.create_dir_all(parent)?;
        }
        let original = relative_symlink_path(&link, target).unwrap_or_else(|| target.to_path_buf());
        debug!("Linking {:?} -> {:?}", link, original);
        self.runtime.symlink(&original, &link)?;
        Ok(())
    }

    async fn unlink(&self, cwd: &Path, name: &str) -> Result<()> {
        let link = cwd.join(MODULES_DIR).join(name);
        if self.runtime.is_symlink(&link) {
            debug!("Removing link {:?}", link);
            self.runtime.remove_symlink(&link)?;
        } else if self.runtime.exists(&link) {
            warn!("{:?} is not a link, leaving it in place", link);
        }
        Ok(())
    }

    async fn current_version(&self, name: &str, tag: &str) -> Result<String> {
        tagged_version(&self.registry, name, tag).await
    }

    async fn current_version_set(
        &self,
        names: &[String],
        tag: &str,
        registry: Option<String>,
    ) -> Result<BTreeMap<String, String>> {
        let client = match registry {
            Some(url) => self.registry.with_base_url(&url),
            None => self.registry.clone(),
        };
        debug!("Querying {} for tag {}", client.base_url(), tag);
        let results = join_all(
            names
                .iter()
                .map(|name| tagged_version(&client, name, tag)),
        )
        .await;

        let mut versions = BTreeMap::new();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(version) => {
                    versions.insert(name.clone(), version);
                }
                Err(e) if e.is_not_released() => debug!("{} has not been published", name),
                Err(e) => return Err(e),
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpClient;
    use crate::runtime::{ExecOutput, MockRuntime, RealRuntime};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn registry(url: &str) -> RegistryClient {
        RegistryClient::new(HttpClient::new(reqwest::Client::new()), url)
    }

    fn gateway_expecting(args: &'static [&'static str], code: i32) -> NpmGateway<MockRuntime> {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| true);
        runtime
            .expect_exec()
            .withf(move |cwd, program, actual| {
                cwd == Path::new("/repo") && program == "npm" && actual == args
            })
            .times(1)
            .returning(move |_, _, _| {
                Ok(ExecOutput {
                    code: Some(code),
                    stdout: "ok\n".into(),
                    stderr: String::new(),
                })
            });
        NpmGateway::new(runtime, "npm", registry("http://127.0.0.1:1"))
    }

    #[tokio::test]
    async fn test_install_arguments() {
        let gateway = gateway_expecting(&["install", "lodash@^4", "@types/node", "--save-dev"], 0);
        gateway
            .install(
                Path::new("/repo"),
                &[
                    DependencySpec::parse("lodash@^4"),
                    DependencySpec::parse("@types/node"),
                ],
                false,
                true,
            )
            .await
            .unwrap();

        let gateway = gateway_expecting(&["install", "react", "--save-peer"], 0);
        gateway
            .install(
                Path::new("/repo"),
                &[DependencySpec::parse("react")],
                true,
                true,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_batches_do_not_spawn() {
        let runtime = MockRuntime::new();
        let gateway = NpmGateway::new(runtime, "npm", registry("http://127.0.0.1:1"));
        gateway.install(Path::new("/repo"), &[], false, false).await.unwrap();
        gateway.uninstall(Path::new("/repo"), &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_and_publish_arguments() {
        let gateway = gateway_expecting(&["run", "build", "--", "--watch"], 0);
        let output = gateway
            .run(Path::new("/repo"), "build", &["--watch".into()])
            .await
            .unwrap();
        assert_eq!(output, "ok");

        let gateway = gateway_expecting(&["publish", "--dry-run", "--tag", "latest"], 0);
        gateway
            .publish(
                Path::new("/repo"),
                &["--dry-run".into(), "--tag".into(), "latest".into()],
            )
            .await
            .unwrap();

        let gateway = gateway_expecting(&["dist-tag", "add", "a@1.0.0", "next"], 0);
        gateway
            .add_dist_tag(Path::new("/repo"), &["a@1.0.0".into(), "next".into()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_shell_failure() {
        let gateway = gateway_expecting(&["ci"], 1);
        let err = gateway.bootstrap(Path::new("/repo"), true).await.unwrap_err();
        match err {
            Error::ShellFailed { command, code, .. } => {
                assert_eq!(command, "npm ci");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_cwd_is_invalid_path() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| false);
        let gateway = NpmGateway::new(runtime, "npm", registry("http://127.0.0.1:1"));
        assert!(matches!(
            gateway.bootstrap(Path::new("/gone"), false).await,
            Err(Error::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_link_and_unlink() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("packages/core");
        let consumer = dir.path().join("packages/app");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::create_dir_all(&consumer).unwrap();

        let gateway = NpmGateway::new(RealRuntime, "npm", registry("http://127.0.0.1:1"));
        gateway.link(&consumer, "@org/core", &target).await.unwrap();
        // Idempotent
        gateway.link(&consumer, "@org/core", &target).await.unwrap();

        let link = consumer.join("node_modules/@org/core");
        assert!(link.is_symlink());
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("../../../core")
        );
        assert_eq!(
            std::fs::canonicalize(&link).unwrap(),
            std::fs::canonicalize(&target).unwrap()
        );

        // A link to another directory is replaced
        let other = dir.path().join("packages/old-core");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::remove_file(&link).unwrap();
        std::os::unix::fs::symlink(&other, &link).unwrap();
        gateway.link(&consumer, "@org/core", &target).await.unwrap();
        assert_eq!(
            std::fs::read_link(&link).unwrap(),
            PathBuf::from("../../../core")
        );

        gateway.unlink(&consumer, "@org/core").await.unwrap();
        assert!(!link.exists() && !link.is_symlink());
        assert!(target.is_dir());
        // Missing link is fine
        gateway.unlink(&consumer, "@org/core").await.unwrap();
    }

    #[tokio::test]
    async fn test_current_version() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body(r#"{"dist-tags":{"latest":"1.2.0","next":"1.10.0"}}"#)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_status(404)
            .create_async()
            .await;

        let gateway = NpmGateway::new(RealRuntime, "npm", registry(&server.url()));
        assert_eq!(gateway.current_version("a", "latest").await.unwrap(), "1.2.0");
        // Unknown tag falls back to the highest version
        assert_eq!(gateway.current_version("a", "beta").await.unwrap(), "1.10.0");
        assert!(matches!(
            gateway.current_version("b", "latest").await,
            Err(Error::PackageNotReleased { .. })
        ));
        assert!(gateway.exists("a").await.unwrap());
        assert!(!gateway.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_current_version_set_uses_channel_registry() {
        let mut private = mockito::Server::new_async().await;
        let _a = private
            .mock("GET", "/a")
            .with_status(200)
            .with_body(r#"{"dist-tags":{"latest":"3.1.0"}}"#)
            .expect(1)
            .create_async()
            .await;

        // The default registry is unreachable
        let gateway = NpmGateway::new(RealRuntime, "npm", registry("http://127.0.0.1:1"));
        let versions = gateway
            .current_version_set(&["a".into()], "latest", Some(private.url()))
            .await
            .unwrap();
        assert_eq!(versions["a"], "3.1.0");
        _a.assert_async().await;
    }

    #[tokio::test]
    async fn test_current_version_set_skips_unpublished() {
        let mut server = mockito::Server::new_async().await;
        let _a = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body(r#"{"dist-tags":{"latest":"2.0.0"}}"#)
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/b")
            .with_status(404)
            .create_async()
            .await;
        let _c = server
            .mock("GET", "/c")
            .with_status(500)
            .create_async()
            .await;

        let gateway = NpmGateway::new(RealRuntime, "npm", registry(&server.url()));
        let versions = gateway
            .current_version_set(&["a".into(), "b".into()], "latest", None)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions["a"], "2.0.0");

        assert!(matches!(
            gateway
                .current_version_set(&["a".into(), "c".into()], "latest", None)
                .await,
            Err(Error::GatewayError { .. })
        ));
    }
}
