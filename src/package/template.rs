//! Package scaffolding from a template description.
//!
//! A template is a JSON list of files relative to the template file. Each
//! entry is either `"file"` (copied to the same relative path) or
//! `["source", "destination"]`. A directory template means
//! `<dir>/template.json`. Exactly one entry must produce `package.json`;
//! its name and flags are overwritten for the new package.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::manifest::{self, MANIFEST_FILE};
use crate::runtime::Runtime;

pub(crate) const TEMPLATE_FILE: &str = "template.json";

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum TemplateEntry {
    Same(String),
    Mapped(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Template {
    path: PathBuf,
    files: Vec<(PathBuf, PathBuf)>,
}

/// Fields stamped into the scaffolded manifest.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ManifestStamp<'a> {
    pub name: &'a str,
    pub alias: Option<&'a str>,
    pub no_release: bool,
    pub private_access: bool,
}

impl ManifestStamp<'_> {
    fn apply(&self, value: &mut Value) {
        if let Value::Object(map) = value {
            map.insert("name".into(), Value::String(self.name.to_string()));
            if self.no_release {
                map.insert("private".into(), Value::Bool(true));
            } else {
                map.remove("private");
            }
            let access = if self.private_access {
                "private"
            } else {
                "public"
            };
            map.insert("access".into(), Value::String(access.into()));
            match self.alias {
                Some(alias) => {
                    map.insert("tandem:alias".into(), Value::String(alias.to_string()));
                }
                None => {
                    map.remove("tandem:alias");
                }
            }
        }
    }

    /// Manifest used when no template is given.
    pub fn default_manifest(&self) -> Value {
        let mut value = serde_json::json!({
            "name": self.name,
            "version": "0.1.0",
            "main": "index.js",
            "scripts": {},
            "dependencies": {},
            "devDependencies": {},
            "peerDependencies": {}
        });
        self.apply(&mut value);
        value
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> Error {
    Error::InvalidTemplate {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn is_contained(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

impl Template {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let path = if runtime.is_dir(path) {
            path.join(TEMPLATE_FILE)
        } else {
            path.to_path_buf()
        };
        if !runtime.is_file(&path) {
            return Err(invalid(&path, "template file not found"));
        }

        let content = runtime.read_to_string(&path)?;
        let entries: Vec<TemplateEntry> = serde_json::from_str(&content).map_err(|e| {
            invalid(
                &path,
                format!("expected a list of files or [source, destination] pairs: {}", e),
            )
        })?;

        let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            let (source, destination) = match entry {
                TemplateEntry::Same(file) => (file.clone(), file),
                TemplateEntry::Mapped(source, destination) => (source, destination),
            };
            let destination = PathBuf::from(destination);
            if !is_contained(&destination) {
                return Err(invalid(
                    &path,
                    format!("destination {:?} escapes the package directory", destination),
                ));
            }
            let source = base.join(source);
            if !runtime.is_file(&source) {
                return Err(invalid(&path, format!("missing template file {:?}", source)));
            }
            files.push((source, destination));
        }

        if !files.iter().any(|(_, dest)| dest == Path::new(MANIFEST_FILE)) {
            return Err(invalid(&path, "template does not produce package.json"));
        }

        Ok(Self { path, files })
    }

    /// Copy every template file into `target`, stamping the manifest.
    #[tracing::instrument(skip(self, runtime))]
    pub fn render<R: Runtime>(
        &self,
        runtime: &R,
        target: &Path,
        stamp: &ManifestStamp<'_>,
    ) -> Result<()> {
        for (source, destination) in &self.files {
            let output = target.join(destination);
            if let Some(parent) = output.parent() {
                runtime.create_dir_all(parent)?;
            }
            if destination == Path::new(MANIFEST_FILE) {
                let mut value = manifest::read_json(runtime, source)?;
                if !value.is_object() {
                    return Err(invalid(&self.path, "template package.json is not an object"));
                }
                stamp.apply(&mut value);
                manifest::write_json(runtime, &output, &value)?;
            } else {
                runtime.copy(source, &output)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use std::fs;
    use tempfile::tempdir;

    fn stamp() -> ManifestStamp<'static> {
        ManifestStamp {
            name: "@org/app",
            alias: Some("app"),
            no_release: false,
            private_access: false,
        }
    }

    #[test]
    fn test_load_directory_and_render() {
        let dir = tempdir().unwrap();
        let template_dir = dir.path().join("tpl");
        fs::create_dir_all(template_dir.join("src")).unwrap();
        fs::write(
            template_dir.join(TEMPLATE_FILE),
            r#"["package.json", ["src/main.js", "lib/index.js"]]"#,
        )
        .unwrap();
        fs::write(
            template_dir.join("package.json"),
            r#"{ "name": "template", "private": true, "license": "MIT" }"#,
        )
        .unwrap();
        fs::write(template_dir.join("src/main.js"), "module.exports = 1;\n").unwrap();

        let template = Template::load(&RealRuntime, &template_dir).unwrap();
        let target = dir.path().join("packages/app");
        template.render(&RealRuntime, &target, &stamp()).unwrap();

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(target.join("package.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["name"], "@org/app");
        assert_eq!(manifest["license"], "MIT");
        assert_eq!(manifest["access"], "public");
        assert_eq!(manifest["tandem:alias"], "app");
        assert!(manifest.get("private").is_none());
        assert_eq!(
            fs::read_to_string(target.join("lib/index.js")).unwrap(),
            "module.exports = 1;\n"
        );
    }

    #[test]
    fn test_load_rejects_bad_templates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.json");

        // Not a list
        fs::write(&path, r#"{ "files": [] }"#).unwrap();
        assert!(matches!(
            Template::load(&RealRuntime, &path),
            Err(Error::InvalidTemplate { .. })
        ));

        // No manifest produced
        fs::write(dir.path().join("README.md"), "# readme").unwrap();
        fs::write(&path, r#"["README.md"]"#).unwrap();
        assert!(matches!(
            Template::load(&RealRuntime, &path),
            Err(Error::InvalidTemplate { .. })
        ));

        // Missing source
        fs::write(&path, r#"["package.json"]"#).unwrap();
        assert!(matches!(
            Template::load(&RealRuntime, &path),
            Err(Error::InvalidTemplate { .. })
        ));

        // Escaping destination
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(&path, r#"["package.json", ["README.md", "../README.md"]]"#).unwrap();
        assert!(matches!(
            Template::load(&RealRuntime, &path),
            Err(Error::InvalidTemplate { .. })
        ));

        // Missing template
        assert!(matches!(
            Template::load(&RealRuntime, &dir.path().join("nope.json")),
            Err(Error::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_default_manifest() {
        let value = ManifestStamp {
            name: "a",
            alias: None,
            no_release: true,
            private_access: true,
        }
        .default_manifest();
        assert_eq!(value["name"], "a");
        assert_eq!(value["private"], true);
        assert_eq!(value["access"], "private");
        assert!(value.get("tandem:alias").is_none());
    }
}
