//! Paginated query sources consumed by the correlation engine.
//!
//! The locator, comparator and orchestrator only ever see these traits. The
//! GraphQL and REST adapters implement them against GitHub; tests implement
//! them with in-memory fixtures.

use super::errors::GitHubError;
use super::types::{Commit, Deployment, Repo};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Upstream ceiling on records per page for both GitHub APIs.
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of the deployment feed.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPage {
    pub deployments: Vec<Deployment>,
    pub has_next_page: bool,
    /// Cursor to pass back for the following page.
    pub end_cursor: Option<String>,
}

/// One page of a base..head commit comparison.
#[derive(Debug, Clone, Default)]
pub struct CommitRangePage {
    /// Upstream total for the whole comparison.
    pub total_commits: usize,
    pub commits: Vec<Commit>,
    pub has_next_page: bool,
    /// Cursor to pass back for the following page.
    pub end_cursor: Option<String>,
}

/// One page of the history of a commit, newest first.
#[derive(Debug, Clone, Default)]
pub struct CommitHistoryPage {
    pub commits: Vec<Commit>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Supplies pages of deployments, newest created first.
///
/// An empty `environments` slice means no environment filter.
pub trait DeploymentPageSource: Send + Sync {
    fn fetch_deployments(
        &self,
        repo: &Repo,
        environments: &[String],
        page_size: usize,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<DeploymentPage, GitHubError>> + Send;
}

/// Supplies pages of the commits between `base` and `head`.
///
/// Implementations deliver commits oldest first whatever the upstream
/// convention: within a page, and across pages, so the first page holds the
/// oldest commits. Callers never branch on the source. Cursors are
/// opaque: `None` asks for the first page, later pages pass back the
/// `end_cursor` of the previous one.
pub trait CommitRangePageSource: Send + Sync {
    fn fetch_commit_range(
        &self,
        repo: &Repo,
        base: &str,
        head: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<CommitRangePage, GitHubError>> + Send;
}

/// Supplies pages of the ancestors of `head`, newest first, starting with
/// `head` itself.
pub trait CommitHistoryPageSource: Send + Sync {
    fn fetch_history(
        &self,
        repo: &Repo,
        head: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<CommitHistoryPage, GitHubError>> + Send;
}

/// Runs `request` unless `cancel` fires first.
///
/// A fired token drops the in-flight request.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, request: F) -> Result<T, GitHubError>
where
    F: Future<Output = Result<T, GitHubError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GitHubError::Cancelled),
        result = request => result,
    }
}
