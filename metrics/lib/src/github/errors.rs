//! Error types for GitHub queries and deployment correlation.

use thiserror::Error;

/// Renders the optional "search limit N reached, " prefix of locator errors.
fn limit_prefix(search_limit: &Option<usize>) -> String {
    match search_limit {
        Some(limit) => format!("search limit {limit} reached, "),
        None => String::new(),
    }
}

/// Errors returned by the GitHub adapters and the correlation engine.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GitHubError {
    /// No deployment for the target commit in the environment.
    ///
    /// `search_limit` is set when the search budget ran out before the feed did.
    #[error("{}no deployment found for SHA {sha} in {environment}", limit_prefix(search_limit))]
    DeploymentNotFound {
        environment: String,
        sha: String,
        search_limit: Option<usize>,
    },

    /// The target deployment exists but no older deployment was reachable.
    #[error(
        "{}found deployment but no previous deployment for SHA {sha} in {environment}",
        limit_prefix(search_limit)
    )]
    PredecessorNotFound {
        environment: String,
        sha: String,
        search_limit: Option<usize>,
    },

    /// Upstream reported zero commits between the two references.
    #[error("no commits between commits {base}..{head}")]
    EmptyCommitRange { base: String, head: String },

    /// A commit walk hit its limit before reaching the base commit.
    #[error("reached limit of {limit} without finding {base}")]
    HistoryLimitReached { limit: usize, base: String },

    /// A reference is unknown to the repository
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// A count the caller passed must be positive
    #[error("{0} must be at least 1")]
    InvalidLimit(&'static str),

    /// A pagination cursor was not issued by this source
    #[error("invalid page cursor: {0}")]
    InvalidCursor(String),

    /// Request URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the GitHub API
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// GitHub API rate limit exceeded
    #[error("GitHub API rate limit exceeded")]
    RateLimitExceeded,

    /// GraphQL response carried an `errors` payload
    #[error("GraphQL query failed: {0}")]
    GraphQl(String),

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// Response decoded but lacks a field the unified model requires
    #[error("malformed response: missing {0}")]
    MissingField(&'static str),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,
}

/// Errors from the correlation entry points, tagged with the failing stage.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("error querying deployments: {0}")]
    QueryDeployments(#[source] GitHubError),

    #[error("error comparing commits for {base}..{head}: {source}")]
    CompareCommits {
        base: String,
        head: String,
        #[source]
        source: GitHubError,
    },
}

impl CorrelationError {
    /// The underlying GitHub error.
    pub fn github_error(&self) -> &GitHubError {
        match self {
            Self::QueryDeployments(source) => source,
            Self::CompareCommits { source, .. } => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_not_found_messages() {
        let limited = GitHubError::DeploymentNotFound {
            environment: "stage".into(),
            sha: "3abc111ccccccccccc".into(),
            search_limit: Some(2),
        };
        assert_eq!(
            limited.to_string(),
            "search limit 2 reached, no deployment found for SHA 3abc111ccccccccccc in stage"
        );

        let exhausted = GitHubError::DeploymentNotFound {
            environment: "stage".into(),
            sha: "abc".into(),
            search_limit: None,
        };
        assert_eq!(exhausted.to_string(), "no deployment found for SHA abc in stage");
    }

    #[test]
    fn test_predecessor_not_found_messages() {
        let err = GitHubError::PredecessorNotFound {
            environment: "prod".into(),
            sha: "1abc111aaaaaaaaaaa".into(),
            search_limit: None,
        };
        assert_eq!(
            err.to_string(),
            "found deployment but no previous deployment for SHA 1abc111aaaaaaaaaaa in prod"
        );
    }

    #[test]
    fn test_correlation_error_prefixes() {
        let err = CorrelationError::QueryDeployments(GitHubError::GraphQl("nope".into()));
        assert_eq!(err.to_string(), "error querying deployments: GraphQL query failed: nope");

        let err = CorrelationError::CompareCommits {
            base: "b".into(),
            head: "h".into(),
            source: GitHubError::EmptyCommitRange {
                base: "b".into(),
                head: "h".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "error comparing commits for b..h: no commits between commits b..h"
        );
        assert!(matches!(err.github_error(), GitHubError::EmptyCommitRange { .. }));
    }

    #[test]
    fn test_history_limit_message() {
        let err = GitHubError::HistoryLimitReached {
            limit: 2,
            base: "3abc111".into(),
        };
        assert_eq!(err.to_string(), "reached limit of 2 without finding 3abc111");
    }
}
