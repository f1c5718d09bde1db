//! File system operations (read, write, copy, directory).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("Failed to write to {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_impl(&self, from: &Path, to: &Path) -> Result<u64> {
        fs::copy(from, to).with_context(|| format!("Failed to copy {:?} to {:?}", from, to))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_file_impl(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to remove file {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_dir_impl(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_file_impl(&self, path: &Path) -> bool {
        path.is_file()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_dir_impl(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {:?}", path))?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use tempfile::tempdir;

    #[test]
    fn test_real_runtime_file_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("package.json");

        runtime.write(&file_path, b"{}").unwrap();
        assert!(runtime.exists(&file_path));
        assert!(runtime.is_file(&file_path));
        assert!(!runtime.is_dir(&file_path));

        assert_eq!(runtime.read_to_string(&file_path).unwrap(), "{}");

        let copy_path = dir.path().join("copy.json");
        runtime.copy(&file_path, &copy_path).unwrap();
        assert_eq!(runtime.read_to_string(&copy_path).unwrap(), "{}");

        runtime.remove_file(&copy_path).unwrap();
        assert!(!runtime.exists(&copy_path));
    }

    #[test]
    fn test_real_runtime_dir_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let nested = dir.path().join("packages/b");

        runtime.create_dir_all(&nested).unwrap();
        runtime
            .create_dir_all(&dir.path().join("packages/a"))
            .unwrap();
        assert!(runtime.is_dir(&nested));

        // Entries come back sorted
        let entries = runtime.read_dir(&dir.path().join("packages")).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with("a"));
        assert!(entries[1].ends_with("b"));

        runtime
            .remove_dir_all(&dir.path().join("packages"))
            .unwrap();
        assert!(!runtime.exists(&nested));
    }

    #[test]
    fn test_real_runtime_errors() {
        let runtime = RealRuntime;

        let result = runtime.read_to_string(std::path::Path::new("/nonexistent/package.json"));
        assert!(result.is_err());

        let result = runtime.remove_file(std::path::Path::new("/nonexistent/package.json"));
        assert!(result.is_err());
    }
}
