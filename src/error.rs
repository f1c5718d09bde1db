//! Failure kinds surfaced by workspace operations.
//!
//! Every variant carries the context needed to print a useful message.
//! Filesystem and other low-level failures from the runtime layer arrive as
//! `anyhow::Error` and are wrapped in [`Error::Runtime`].

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    // Lookup
    #[error("No such package: {name}")]
    PackageNotFound { name: String },

    #[error("Unknown sub-package(s): {}", .packages.join(", "))]
    UnknownSubPackage { packages: Vec<String> },

    #[error("No such dependency: {}", .dependencies.join(", "))]
    DependencyNotFound { dependencies: Vec<String> },

    #[error(
        "Dependency \"{dependency}\" of package \"{package}\" is not locked by the root package"
    )]
    DependencyNotLocked { package: String, dependency: String },

    // Validation
    #[error("Invalid package name(s): {}", .names.join(", "))]
    InvalidPackageName { names: Vec<String> },

    #[error("Invalid package manifest {path:?}: {reason}")]
    InvalidPackage { path: PathBuf, reason: String },

    #[error("Invalid package template {path:?}: {reason}")]
    InvalidTemplate { path: PathBuf, reason: String },

    #[error("Malformed JSON file {path:?}: {reason}")]
    InvalidManifestFile { path: PathBuf, reason: String },

    #[error("Path {path:?} is not accessible")]
    InvalidPath { path: PathBuf },

    #[error("Invalid root package {path:?}: {reason}")]
    InvalidRootPackage { path: PathBuf, reason: String },

    #[error("No root package found in {cwd:?} or any of its parents")]
    NoRootPackage { cwd: PathBuf },

    // State conflict
    #[error("Package \"{name}\" already exists")]
    DuplicatePackage { name: String },

    #[error("Alias \"{alias}\" is claimed by more than one package: {}", .packages.join(", "))]
    DuplicatePackageAlias { alias: String, packages: Vec<String> },

    #[error("Recursive dependency: \"{package}\" can not depend on \"{dependency}\"")]
    RecursiveDependency { package: String, dependency: String },

    #[error(
        "Package \"{package}\" can not be released with a dependency on unreleased package \"{dependency}\""
    )]
    PrivateDependencyViolation { package: String, dependency: String },

    #[error("Manifest {path:?} already exists")]
    ExistingManifest { path: PathBuf },

    // External operation
    #[error("Package manager failed: {message}")]
    GatewayError { message: String },

    #[error("Command `{command}` failed in {cwd:?} (exit code {code:?}):\n{output}")]
    ShellFailed {
        command: String,
        cwd: PathBuf,
        code: Option<i32>,
        output: String,
    },

    #[error("Package \"{name}\" has never been published")]
    PackageNotReleased { name: String },

    #[error("No release configuration for channel \"{channel}\"")]
    ReleaseConfigNotFound { channel: String },

    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl Error {
    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::PackageNotFound { .. }
            | Error::UnknownSubPackage { .. }
            | Error::DependencyNotFound { .. }
            | Error::DependencyNotLocked { .. } => 2,

            Error::InvalidPackageName { .. }
            | Error::InvalidPackage { .. }
            | Error::InvalidTemplate { .. }
            | Error::InvalidManifestFile { .. }
            | Error::InvalidPath { .. }
            | Error::InvalidRootPackage { .. }
            | Error::NoRootPackage { .. } => 3,

            Error::DuplicatePackage { .. }
            | Error::DuplicatePackageAlias { .. }
            | Error::RecursiveDependency { .. }
            | Error::PrivateDependencyViolation { .. }
            | Error::ExistingManifest { .. } => 4,

            Error::GatewayError { .. }
            | Error::ShellFailed { .. }
            | Error::PackageNotReleased { .. }
            | Error::ReleaseConfigNotFound { .. } => 5,

            Error::Runtime(_) => 1,
        }
    }

    pub fn is_not_released(&self) -> bool {
        matches!(self, Error::PackageNotReleased { .. })
    }
}
