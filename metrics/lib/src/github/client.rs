//! HTTP plumbing shared by the GraphQL and REST adapters.

use super::errors::GitHubError;
use crate::config::GitHubSettings;
use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Public GitHub REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = "metrics-lib";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub API error response.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Authenticated access to one GitHub instance.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    settings: GitHubSettings,
}

impl GitHubClient {
    pub fn new(http: Client, settings: GitHubSettings) -> Self {
        Self { http, settings }
    }

    /// Builds a client with its own connection pool.
    ///
    /// ## Errors
    ///
    /// Returns `GitHubError::Http` if the HTTP client cannot be initialized.
    pub fn from_settings(settings: GitHubSettings) -> Result<Self, GitHubError> {
        let http = Client::builder().build()?;
        Ok(Self::new(http, settings))
    }

    /// REST API root without trailing slash.
    pub fn api_url(&self) -> &str {
        &self.settings.api_url
    }

    pub fn graphql_url(&self) -> &str {
        &self.settings.graphql_url
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.post(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .timeout(REQUEST_TIMEOUT);

        match &self.settings.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends `request` and decodes a JSON body, returning the response
    /// headers alongside.
    ///
    /// ## Errors
    ///
    /// - `GitHubError::Http` - network failure
    /// - `GitHubError::RateLimitExceeded` - 429, or 403 with no requests left
    /// - `GitHubError::Api` - any other non-success status
    /// - `GitHubError::MalformedResponse` - the body is not the expected JSON
    pub(crate) async fn send_json<T>(&self, request: RequestBuilder) -> Result<(T, HeaderMap), GitHubError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        debug!(status = status.as_u16(), url = %response.url(), "received response");

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GitHubError::RateLimitExceeded);
        }

        if !status.is_success() {
            if status == StatusCode::FORBIDDEN && rate_limit_exhausted(&headers) {
                return Err(GitHubError::RateLimitExceeded);
            }

            let error_text = response.text().await?;
            let message = match serde_json::from_str::<ApiErrorBody>(&error_text) {
                Ok(body) => body.message,
                Err(_) => error_text,
            };
            return Err(GitHubError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok((serde_json::from_str(&body)?, headers))
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("X-RateLimit-Remaining")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u32>().ok())
        .is_some_and(|remaining| remaining == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Ping {
        ok: bool,
    }

    fn client(server: &MockServer, token: Option<&str>) -> GitHubClient {
        GitHubClient::new(
            Client::new(),
            GitHubSettings::new(server.uri(), token.map(str::to_string)),
        )
    }

    #[tokio::test]
    async fn test_send_json_sets_headers_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("User-Agent", "metrics-lib"))
            .and(header("Authorization", "Bearer s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
            .mount(&server)
            .await;

        let client = client(&server, Some("s3cr3t"));
        let url = format!("{}/ping", client.api_url());
        let (ping, _): (Ping, _) = client.send_json(client.get(&url)).await.unwrap();

        assert!(ping.ok);
    }

    #[tokio::test]
    async fn test_send_json_maps_api_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message": "Not Found"}"#))
            .mount(&server)
            .await;

        let client = client(&server, None);
        let url = format!("{}/ping", client.api_url());
        let err = client.send_json::<Ping>(client.get(&url)).await.unwrap_err();

        assert_eq!(err.to_string(), "GitHub API error (404): Not Found");
    }

    #[tokio::test]
    async fn test_send_json_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/exhausted"))
            .respond_with(ResponseTemplate::new(403).insert_header("X-RateLimit-Remaining", "0"))
            .mount(&server)
            .await;

        let client = client(&server, None);
        for endpoint in ["limited", "exhausted"] {
            let url = format!("{}/{endpoint}", client.api_url());
            let err = client.send_json::<Ping>(client.get(&url)).await.unwrap_err();
            assert!(matches!(err, GitHubError::RateLimitExceeded));
        }
    }

    #[tokio::test]
    async fn test_send_json_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client(&server, None);
        let url = format!("{}/ping", client.api_url());
        let err = client.send_json::<Ping>(client.get(&url)).await.unwrap_err();

        assert!(matches!(err, GitHubError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_send_json_network_error() {
        let client = GitHubClient::new(Client::new(), GitHubSettings::new("http://127.0.0.1:1", None));
        let err = client
            .send_json::<Ping>(client.get("http://127.0.0.1:1/ping"))
            .await
            .unwrap_err();

        assert!(matches!(err, GitHubError::Http(_)));
    }
}
