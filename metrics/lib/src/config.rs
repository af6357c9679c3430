//! Environment-variable configuration.
//!
//! Keys are built from a fixed prefix and path parts joined by `__`, so the
//! GitHub token lives in `METRICS__GITHUB__TOKEN`.

use crate::github::client::DEFAULT_API_URL;
use thiserror::Error;

/// Prefix for application specific environment variables.
pub const ENV_PREFIX: &str = "METRICS";

/// Configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {key} not set")]
    MissingEnv { key: String },
}

/// Returns the full environment variable name for the given key parts.
///
/// ## Examples
///
/// ```
/// use metrics_lib::config::env_key;
///
/// assert_eq!(env_key(&["GITHUB", "TOKEN"]), "METRICS__GITHUB__TOKEN");
/// ```
pub fn env_key(parts: &[&str]) -> String {
    std::iter::once(ENV_PREFIX)
        .chain(parts.iter().copied())
        .collect::<Vec<_>>()
        .join("__")
}

/// Reads the variable for `parts`; unset and empty both yield `None`.
pub fn read_from_env(parts: &[&str]) -> Option<String> {
    std::env::var(env_key(parts))
        .ok()
        .filter(|value| !value.is_empty())
}

/// Reads the variable for `parts`, failing when it is unset or empty.
pub fn read_from_env_required(parts: &[&str]) -> Result<String, ConfigError> {
    read_from_env(parts).ok_or_else(|| ConfigError::MissingEnv { key: env_key(parts) })
}

/// Connection settings for the GitHub APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSettings {
    pub token: Option<String>,
    /// REST API root, e.g. `https://api.github.com`.
    pub api_url: String,
    /// GraphQL endpoint, e.g. `https://api.github.com/graphql`.
    pub graphql_url: String,
}

impl GitHubSettings {
    /// Settings for a given API root, with the GraphQL endpoint beneath it.
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            token,
            graphql_url: format!("{api_url}/graphql"),
            api_url,
        }
    }

    /// Reads `METRICS__GITHUB__{TOKEN,API_URL,GRAPHQL_URL}`.
    ///
    /// ## Errors
    ///
    /// Returns `ConfigError::MissingEnv` if the token is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = read_from_env_required(&["GITHUB", "TOKEN"])?;
        let api_url = read_from_env(&["GITHUB", "API_URL"]).unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let mut settings = Self::new(api_url, Some(token));
        if let Some(graphql_url) = read_from_env(&["GITHUB", "GRAPHQL_URL"]) {
            settings.graphql_url = graphql_url;
        }
        Ok(settings)
    }
}

/// Default repository owner and name from `METRICS__GITHUB__REPO_OWNER` and
/// `METRICS__GITHUB__REPO_NAME`.
pub fn default_repo_from_env() -> (Option<String>, Option<String>) {
    (
        read_from_env(&["GITHUB", "REPO_OWNER"]),
        read_from_env(&["GITHUB", "REPO_NAME"]),
    )
}
