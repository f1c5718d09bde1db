use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tandem::commands::{
    self,
    config::{Config, ConfigOverrides},
};
use tandem::package::CreateOptions;
use tandem::runtime::RealRuntime;
use tandem::version::Bump;
use tandem::workspace::{InstallOptions, RecallOptions, ReleaseOptions};

/// tandem - npm monorepo orchestrator
///
/// Keeps the sub-packages under `packages/` linked to each other, tracks
/// which external dependencies are still in use, and releases every package
/// as one version.
///
/// If the NPM_TOKEN environment variable is set, it is sent to the registry.
///
/// Examples:
///   tandem install lodash -p app      # Add lodash to the app package
///   tandem install @@core             # Link the package aliased "core" everywhere
///   tandem release production -F -y   # Publish a feature release
#[derive(Parser, Debug)]
#[command(author, version = env!("TANDEM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory to start looking for the workspace root (also via TANDEM_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "TANDEM_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Registry URL (defaults to https://registry.npmjs.org)
    #[arg(
        long = "registry-url",
        env = "TANDEM_REGISTRY",
        value_name = "URL",
        global = true
    )]
    pub registry_url: Option<String>,

    /// Package manager executable (defaults to npm)
    #[arg(long = "npm", env = "TANDEM_NPM", value_name = "PROGRAM", global = true)]
    pub npm: Option<String>,

    /// Show debug output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create a new sub-package
    Create(CreateArgs),

    /// Install dependencies into sub-packages
    #[command(visible_alias = "i")]
    Install(InstallArgs),

    /// Remove dependencies from sub-packages
    #[command(visible_alias = "un")]
    Uninstall(UninstallArgs),

    /// Publish every releasable package as one version
    Release(ReleaseArgs),

    /// Unpublish a released version
    Recall(RecallArgs),

    /// Deprecate a version range of every releasable package
    Deprecate(DeprecateArgs),

    /// List packages, or show one package
    Show(ShowArgs),

    /// Run a script in sub-packages
    Run(RunArgs),

    /// Turn the current directory into a workspace root
    #[command(visible_alias = "init")]
    Initialize(InitializeArgs),

    /// Run clean scripts and optionally drop module caches
    Clean(CleanArgs),

    /// Install external dependencies and link local ones
    Bootstrap(BootstrapArgs),
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    /// Package name, e.g. "@org/core"
    pub name: String,

    /// Alias usable as "@@ALIAS"
    #[arg(long, short = 'a')]
    pub alias: Option<String>,

    /// Directory under packages/ (defaults to the unscoped name)
    #[arg(long, short = 'd')]
    pub dir: Option<String>,

    /// Template file or directory containing template.json
    #[arg(long, short = 't', value_name = "PATH")]
    pub template: Option<PathBuf>,

    /// Never publish this package
    #[arg(long)]
    pub no_release: bool,

    /// Publish with restricted access
    #[arg(long)]
    pub private_access: bool,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Dependencies, e.g. "lodash@^4", "@org/core" or "@@core"
    #[arg(required = true)]
    pub deps: Vec<String>,

    /// Target packages (defaults to all)
    #[arg(long = "package", short = 'p', value_name = "NAME")]
    pub packages: Vec<String>,

    /// Record as peer dependencies
    #[arg(long, short = 'P')]
    pub peer: bool,

    /// Install as development dependencies of the root
    #[arg(long, short = 'D', conflicts_with = "peer")]
    pub dev: bool,

    /// Link only, do not touch manifests
    #[arg(long)]
    pub no_save: bool,

    /// Skip relinking the whole tree afterwards
    #[arg(long)]
    pub no_bootstrap: bool,
}

#[derive(clap::Args, Debug)]
pub struct UninstallArgs {
    #[arg(required = true)]
    pub deps: Vec<String>,

    /// Target packages (defaults to all)
    #[arg(long = "package", short = 'p', value_name = "NAME")]
    pub packages: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReleaseArgs {
    /// Release channel configured in the root manifest
    #[arg(default_value = "production")]
    pub channel: String,

    /// Release exactly this version
    #[arg(long = "as-version", value_name = "VERSION")]
    pub version: Option<String>,

    /// Bump the major component
    #[arg(long, short = 'B')]
    pub breaking: bool,

    /// Bump the minor component
    #[arg(long, short = 'F')]
    pub feature: bool,

    /// Bump the patch component (default)
    #[arg(long, short = 'P')]
    pub patch: bool,

    /// Really publish instead of a dry run
    #[arg(long = "confirm", short = 'y')]
    pub confirmed: bool,

    /// Skip the clean step
    #[arg(long)]
    pub no_clean: bool,
}

#[derive(clap::Args, Debug)]
pub struct RecallArgs {
    pub channel: String,
    pub version: String,

    #[arg(long = "confirm", short = 'y')]
    pub confirmed: bool,
}

#[derive(clap::Args, Debug)]
pub struct DeprecateArgs {
    /// Version range, e.g. "<2.0.0"
    pub scope: String,
    pub message: String,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Package name or "@@alias"
    pub name: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    pub script: String,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Target packages (defaults to all)
    #[arg(long = "package", short = 'p', value_name = "NAME")]
    pub packages: Vec<String>,

    /// Also run in the root package
    #[arg(long)]
    pub with_root: bool,

    /// Only run in the root package
    #[arg(long, conflicts_with = "with_root")]
    pub root_only: bool,
}

#[derive(clap::Args, Debug)]
pub struct InitializeArgs {
    /// Adopt an existing package.json
    #[arg(long = "yes", short = 'y')]
    pub confirmed: bool,
}

#[derive(clap::Args, Debug)]
pub struct CleanArgs {
    #[arg(long = "package", short = 'p', value_name = "NAME")]
    pub packages: Vec<String>,

    /// Also remove every node_modules directory
    #[arg(long)]
    pub full: bool,
}

#[derive(clap::Args, Debug)]
pub struct BootstrapArgs {
    /// Only link local packages
    #[arg(long)]
    pub no_install: bool,

    /// Use `npm ci`
    #[arg(long)]
    pub ci: bool,
}

impl ReleaseArgs {
    fn bump(&self) -> Bump {
        Bump {
            breaking: self.breaking,
            feature: self.feature,
            patch: self.patch,
        }
    }
}

async fn execute(cli: Cli) -> tandem::Result<()> {
    let runtime = RealRuntime;
    let config = Config::load(
        &runtime,
        ConfigOverrides {
            root: cli.root,
            registry_url: cli.registry_url,
            npm: cli.npm,
        },
    )?;

    match cli.command {
        Commands::Create(args) => {
            let options = CreateOptions {
                name: args.name,
                alias: args.alias,
                dir: args.dir,
                template: args.template,
                no_release: args.no_release,
                private_access: args.private_access,
            };
            commands::create(runtime, &config, &options)
        }
        Commands::Install(args) => {
            let options = InstallOptions {
                peer: args.peer,
                dev: args.dev,
                no_save: args.no_save,
                no_bootstrap: args.no_bootstrap,
            };
            commands::install(runtime, &config, &args.deps, &args.packages, options).await
        }
        Commands::Uninstall(args) => {
            commands::uninstall(runtime, &config, &args.deps, &args.packages).await
        }
        Commands::Release(args) => {
            let options = ReleaseOptions {
                bump: args.bump(),
                channel: args.channel,
                version: args.version,
                confirmed: args.confirmed,
                no_clean: args.no_clean,
            };
            commands::release(runtime, &config, &options).await
        }
        Commands::Recall(args) => {
            let options = RecallOptions {
                channel: args.channel,
                version: args.version,
                confirmed: args.confirmed,
            };
            commands::recall(runtime, &config, &options).await
        }
        Commands::Deprecate(args) => {
            commands::deprecate(runtime, &config, &args.scope, &args.message).await
        }
        Commands::Show(args) => commands::show(runtime, &config, args.name.as_deref()),
        Commands::Run(args) => {
            commands::run(
                runtime,
                &config,
                &args.packages,
                &args.script,
                &args.args,
                args.with_root,
                args.root_only,
            )
            .await
        }
        Commands::Initialize(args) => {
            commands::initialize(runtime, &config, args.confirmed).await
        }
        Commands::Clean(args) => commands::clean(runtime, &config, &args.packages, args.full).await,
        Commands::Bootstrap(args) => {
            commands::bootstrap(runtime, &config, args.no_install, args.ci).await
        }
    }
}

/// Filter for verbose runs; `RUST_LOG` wins when set.
fn verbose_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("warn,tandem=debug"))
}

/// Plain `log` output by default. Verbose runs switch to a tracing
/// subscriber so instrumented spans show up next to the log records.
fn init_logging(verbose: bool) {
    if verbose {
        let directives = std::env::var("RUST_LOG").ok();
        tracing_subscriber::fmt()
            .with_env_filter(verbose_filter(directives.as_deref()))
            .with_writer(std::io::stderr)
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
