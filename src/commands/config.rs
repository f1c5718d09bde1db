use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::gateway::DEFAULT_REGISTRY_URL;
use crate::runtime::Runtime;

pub const DEFAULT_NPM: &str = "npm";

/// Values given on the command line (or through their environment variables).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub registry_url: Option<String>,
    pub npm: Option<String>,
}

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where root discovery starts.
    pub root: PathBuf,
    pub registry_url: String,
    pub npm: String,
    /// Registry token from `NPM_TOKEN`.
    pub token: Option<String>,
}

impl Config {
    pub fn load<R: Runtime>(runtime: &R, overrides: ConfigOverrides) -> Result<Self> {
        let root = match overrides.root {
            Some(root) => root,
            None => runtime.current_dir()?,
        };

        let token = runtime.env_var("NPM_TOKEN").ok().filter(|t| !t.is_empty());
        if let Some(token) = &token {
            debug!(
                "Using NPM_TOKEN for registry queries: ****{}",
                &token[token.len().saturating_sub(4)..]
            );
        }

        Ok(Self {
            root,
            registry_url: overrides
                .registry_url
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            npm: overrides.npm.unwrap_or_else(|| DEFAULT_NPM.to_string()),
            token,
        })
    }
}
