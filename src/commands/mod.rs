//! Entry points behind the command line, one per subcommand.
//!
//! Each function resolves the workspace from the configuration, performs a
//! single workspace operation and prints the result.

use log::debug;

use crate::error::Result;
use crate::gateway::NpmGateway;
use crate::package::CreateOptions;
use crate::runtime::Runtime;
use crate::workspace::{InstallOptions, RecallOptions, ReleaseOptions, Workspace};

pub mod config;
pub mod services;
mod show;

pub use show::{format_list, format_package};

use config::Config;
use services::build_workspace;

/// Find and load the workspace containing `config.root`.
fn open<R: Runtime + Clone>(runtime: R, config: &Config) -> Result<Workspace<R, NpmGateway<R>>> {
    let mut workspace = build_workspace(runtime, config)?;
    workspace.ensure_root()?;
    workspace.reload()?;
    debug!("Opened workspace at {:?}", workspace.root());
    Ok(workspace)
}

#[tracing::instrument(skip(runtime, config))]
pub fn create<R: Runtime + Clone>(runtime: R, config: &Config, options: &CreateOptions) -> Result<()> {
    open(runtime, config)?.create_package(options)?;
    Ok(())
}

#[tracing::instrument(skip(runtime, config))]
pub async fn install<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    deps: &[String],
    packages: &[String],
    options: InstallOptions,
) -> Result<()> {
    open(runtime, config)?
        .install(deps, packages, options)
        .await
}

#[tracing::instrument(skip(runtime, config))]
pub async fn uninstall<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    deps: &[String],
    packages: &[String],
) -> Result<()> {
    open(runtime, config)?.uninstall(deps, packages).await
}

#[tracing::instrument(skip(runtime, config))]
pub async fn release<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    options: &ReleaseOptions,
) -> Result<()> {
    let version = open(runtime, config)?.release(options).await?;
    if options.confirmed {
        println!("Released version \"v{}\".", version);
    } else {
        println!("Simulated release of version \"v{}\".", version);
    }
    Ok(())
}

#[tracing::instrument(skip(runtime, config))]
pub async fn recall<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    options: &RecallOptions,
) -> Result<()> {
    open(runtime, config)?.recall(options).await
}

#[tracing::instrument(skip(runtime, config))]
pub async fn deprecate<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    scope: &str,
    message: &str,
) -> Result<()> {
    open(runtime, config)?.deprecate(scope, message).await
}

/// List every package, or describe one.
#[tracing::instrument(skip(runtime, config))]
pub fn show<R: Runtime + Clone>(runtime: R, config: &Config, name: Option<&str>) -> Result<()> {
    let workspace = open(runtime, config)?;
    match name {
        Some(name) => print!("{}", format_package(&workspace.get_package(name)?)),
        None => print!("{}", format_list(&workspace.packages())),
    }
    Ok(())
}

#[tracing::instrument(skip(runtime, config))]
pub async fn run<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    packages: &[String],
    script: &str,
    args: &[String],
    with_root: bool,
    root_only: bool,
) -> Result<()> {
    open(runtime, config)?
        .run(packages, script, args, with_root, root_only)
        .await
}

/// Set up a workspace root in `config.root` itself; no upward search.
#[tracing::instrument(skip(runtime, config))]
pub async fn initialize<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    confirmed: bool,
) -> Result<()> {
    build_workspace(runtime, config)?.initialize(confirmed).await
}

#[tracing::instrument(skip(runtime, config))]
pub async fn clean<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    packages: &[String],
    full: bool,
) -> Result<()> {
    open(runtime, config)?.clean(packages, full).await
}

#[tracing::instrument(skip(runtime, config))]
pub async fn bootstrap<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
    no_install: bool,
    ci: bool,
) -> Result<()> {
    open(runtime, config)?.bootstrap(no_install, ci).await
}
