use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::http::HttpClient;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

#[derive(Deserialize, Debug, Default)]
struct PackageDocument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: BTreeMap<String, String>,
}

/// Read-only access to the package registry.
#[derive(Clone)]
pub struct RegistryClient {
    http: HttpClient,
    base_url: String,
}

impl RegistryClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The same client pointed at another registry.
    pub fn with_base_url(&self, base_url: &str) -> Self {
        Self::new(self.http.clone(), base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn package_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.replace('/', "%2f"))
    }

    /// Tag to version map of `name`; `None` when the registry has never seen it.
    #[tracing::instrument(skip(self))]
    pub async fn dist_tags(&self, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        let document: Option<PackageDocument> = self
            .http
            .get_json_optional(&self.package_url(name))
            .await
            .map_err(|e| Error::GatewayError {
                message: format!("{:#}", e),
            })?;
        Ok(document.map(|document| document.dist_tags))
    }
}
