//! Manifest snapshots taken around mutating operations.

use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::runtime::Runtime;

/// Relative location of manifest backups under the workspace root.
pub const BACKUP_DIR: &str = ".tandem/tmp/packages.d";

/// Backup key of the root manifest; package names never start with a dot.
pub const ROOT_KEY: &str = ".root";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    manifest: PathBuf,
    backup: PathBuf,
}

/// Copies of a set of manifests that can be put back byte for byte.
#[derive(Debug, PartialEq, Eq)]
pub struct ManifestBackup {
    entries: Vec<Entry>,
}

impl ManifestBackup {
    /// Copy every `(key, manifest)` into `dir`.
    ///
    /// If any copy fails the copies made so far are removed and nothing is
    /// left behind.
    #[tracing::instrument(skip(runtime, manifests))]
    pub fn create<R: Runtime>(
        runtime: &R,
        dir: &Path,
        manifests: Vec<(String, PathBuf)>,
    ) -> Result<Self> {
        runtime.create_dir_all(dir)?;

        let mut backup = Self {
            entries: Vec::with_capacity(manifests.len()),
        };
        for (key, manifest) in manifests {
            let target = dir.join(format!("{}.json", key.replace('/', "-")));
            if let Err(e) = runtime.copy(&manifest, &target) {
                backup.discard(runtime);
                return Err(e.into());
            }
            backup.entries.push(Entry {
                manifest,
                backup: target,
            });
        }
        debug!("Backed up {} manifest(s)", backup.entries.len());
        Ok(backup)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Put every manifest back. Stops at the first failure.
    #[tracing::instrument(skip(self, runtime))]
    pub fn restore<R: Runtime>(&self, runtime: &R) -> Result<()> {
        for entry in &self.entries {
            runtime.copy(&entry.backup, &entry.manifest)?;
        }
        debug!("Restored {} manifest(s)", self.entries.len());
        Ok(())
    }

    /// Delete the backup files. Failures are logged, not returned.
    #[tracing::instrument(skip(self, runtime))]
    pub fn discard<R: Runtime>(self, runtime: &R) {
        for entry in &self.entries {
            if let Err(e) = runtime.remove_file(&entry.backup) {
                warn!("Failed to remove backup {:?}: {:#}", entry.backup, e);
            }
        }
    }
}
