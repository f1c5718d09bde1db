//! Builds the collaborators a workspace needs from the configuration.

use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::gateway::{NpmGateway, RegistryClient};
use crate::http::HttpClient;
use crate::runtime::Runtime;
use crate::workspace::Workspace;

use super::config::Config;

/// Build an HTTP client with optional authentication token
pub fn build_http_client(token: Option<&str>) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);
        debug!("HTTP client configured with authentication");
    }

    let client = Client::builder()
        .user_agent("tandem-cli")
        .default_headers(headers)
        .build()?;

    Ok(HttpClient::new(client))
}

pub fn build_registry(config: &Config) -> Result<RegistryClient> {
    let http_client = build_http_client(config.token.as_deref())?;
    Ok(RegistryClient::new(http_client, &config.registry_url))
}

pub fn build_gateway<R: Runtime>(runtime: R, config: &Config) -> Result<NpmGateway<R>> {
    Ok(NpmGateway::new(runtime, config.npm.clone(), build_registry(config)?))
}

/// A workspace over the real package manager, not yet loaded.
pub fn build_workspace<R: Runtime + Clone>(
    runtime: R,
    config: &Config,
) -> Result<Workspace<R, NpmGateway<R>>> {
    let gateway = build_gateway(runtime.clone(), config)?;
    Ok(Workspace::new(runtime, gateway, config.root.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use mockito::{Matcher, Server};
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_build_http_client_with_token() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/")
            .match_header(
                "Authorization",
                Matcher::Exact("Bearer test_token".to_string()),
            )
            .create();

        let http_client = build_http_client(Some("test_token")).unwrap();
        let _ = http_client.inner().get(server.url()).send().await;

        mock.assert();
    }

    #[tokio::test]
    async fn test_build_http_client_without_token() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/")
            .match_header("Authorization", Matcher::Missing)
            .create();

        let http_client = build_http_client(None).unwrap();
        let _ = http_client.inner().get(server.url()).send().await;

        mock.assert();
    }

    #[test]
    fn test_build_workspace_uses_config() {
        let config = Config {
            root: PathBuf::from("/work/mono"),
            registry_url: "https://r.example/".to_string(),
            npm: "npm".to_string(),
            token: None,
        };

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.base_url(), "https://r.example");

        let workspace = build_workspace(RealRuntime, &config).unwrap();
        assert_eq!(workspace.root(), PathBuf::from("/work/mono"));
        assert!(workspace.registry().is_empty());
    }
}
