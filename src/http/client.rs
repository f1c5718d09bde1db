//! Thin JSON client over reqwest. Requests are issued once; there are no retries.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and deserializes the JSON response.
    /// A 404 yields `Ok(None)`; any other error status is an error.
    #[tracing::instrument(skip(self))]
    pub async fn get_json_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("GET JSON from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("{} responded 404", url);
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .with_context(|| format!("Request to {} failed", url))?;

        let result = response
            .json::<T>()
            .await
            .context("Failed to parse JSON response")?;

        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct TestResponse {
        name: String,
        value: i32,
    }

    #[tokio::test]
    async fn test_get_json_optional_success() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "test", "value": 42}"#)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Option<TestResponse> = client
            .get_json_optional(&format!("{}/test", url))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            result,
            Some(TestResponse {
                name: "test".into(),
                value: 42
            })
        );
    }

    #[tokio::test]
    async fn test_get_json_optional_not_found() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/test")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Option<TestResponse> = client
            .get_json_optional(&format!("{}/test", url))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_json_optional_server_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/test")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Result<Option<TestResponse>> =
            client.get_json_optional(&format!("{}/test", url)).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_json_optional_bad_body() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/test")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = HttpClient::new(Client::new());
        let result: Result<Option<TestResponse>> =
            client.get_json_optional(&format!("{}/test", url)).await;
        assert!(result.is_err());
    }
}
