//! Walking the history of a commit back to an older one.

use super::errors::GitHubError;
use super::source::{CommitHistoryPageSource, MAX_PAGE_SIZE, cancellable};
use super::types::{Commit, Repo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Collects the ancestors of `head` down to, and excluding, `base`.
///
/// Commits are returned newest first, starting with `head`. `base` matches
/// either the full or the abbreviated SHA. If the history ends before `base`
/// shows up, everything walked so far is returned.
///
/// ## Errors
///
/// - `GitHubError::InvalidLimit` - `limit` is 0; nothing is requested
/// - `GitHubError::HistoryLimitReached` - `limit` commits were collected
///   without meeting `base`
/// - any error of the page source, and `GitHubError::Cancelled`
pub async fn walk_history<H>(
    source: &H,
    repo: &Repo,
    head: &str,
    base: &str,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Commit>, GitHubError>
where
    H: CommitHistoryPageSource,
{
    debug!(repo = %repo, head, base, limit, "walking commit history");

    if limit == 0 {
        return Err(GitHubError::InvalidLimit("history limit"));
    }

    let page_size = limit.min(MAX_PAGE_SIZE);
    let mut cursor: Option<String> = None;
    let mut commits = Vec::new();

    loop {
        let page = cancellable(cancel, source.fetch_history(repo, head, page_size, cursor.as_deref())).await?;
        let exhausted = page.commits.is_empty();

        for commit in page.commits {
            if commit.sha == base || commit.abbreviated_sha == base {
                debug!(count = commits.len(), "reached base commit");
                return Ok(commits);
            }

            commits.push(commit);
            if commits.len() == limit {
                return Err(GitHubError::HistoryLimitReached {
                    limit,
                    base: base.to_string(),
                });
            }
        }

        match page.end_cursor {
            Some(next) if page.has_next_page && !exhausted => cursor = Some(next),
            _ => break,
        }
    }

    debug!(count = commits.len(), "history ended before base commit");
    Ok(commits)
}
