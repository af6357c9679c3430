//! Paginated retrieval of the commits between two references.

use super::errors::GitHubError;
use super::source::{CommitRangePageSource, MAX_PAGE_SIZE, cancellable};
use super::types::{CommitsComparison, Repo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fetches the commits of `base..head`, at most `limit` of them.
///
/// Commits keep the order the source delivers them in, oldest first. The
/// result never holds more than `limit` commits, even when the last page would
/// add more. A page without commits or without a cursor ends the walk.
///
/// ## Errors
///
/// - `GitHubError::InvalidLimit` - `limit` is 0; nothing is requested
/// - `GitHubError::EmptyCommitRange` - upstream reports zero commits, which
///   usually means identical or swapped references
/// - any error of the page source, and `GitHubError::Cancelled`
pub async fn compare_commits<C>(
    source: &C,
    repo: &Repo,
    base: &str,
    head: &str,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<CommitsComparison, GitHubError>
where
    C: CommitRangePageSource,
{
    debug!(repo = %repo, base, head, limit, "comparing commits");

    if limit == 0 {
        return Err(GitHubError::InvalidLimit("commit limit"));
    }

    let page_size = limit.min(MAX_PAGE_SIZE);
    let mut cursor: Option<String> = None;
    let mut page = 1;
    let mut comparison = CommitsComparison {
        total_commits: 0,
        commits: Vec::new(),
    };

    loop {
        debug!(page, page_size, "requesting page");

        let range = cancellable(
            cancel,
            source.fetch_commit_range(repo, base, head, page_size, cursor.as_deref()),
        )
        .await?;

        if range.total_commits == 0 {
            return Err(GitHubError::EmptyCommitRange {
                base: base.to_string(),
                head: head.to_string(),
            });
        }

        debug!(
            count = range.commits.len(),
            total = range.total_commits,
            page,
            "found commits"
        );

        let exhausted = range.commits.is_empty();
        comparison.total_commits = range.total_commits;
        comparison.commits.extend(range.commits);

        if comparison.commits.len() >= limit {
            debug!(limit, page, "reached limit, truncating");
            comparison.commits.truncate(limit);
            break;
        }

        match range.end_cursor {
            Some(next) if range.has_next_page && !exhausted => cursor = Some(next),
            _ => break,
        }
        page += 1;
    }

    Ok(comparison)
}
