//! GitHub REST API adapter for commit comparisons.

use super::client::GitHubClient;
use super::errors::GitHubError;
use super::source::{CommitRangePage, CommitRangePageSource, MAX_PAGE_SIZE};
use super::types::{Commit, CommitParent, Repo, abbreviate_sha};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Deserialize)]
struct CompareResponse {
    total_commits: usize,
    #[serde(default)]
    commits: Vec<RestCommit>,
}

#[derive(Deserialize)]
struct RestCommit {
    sha: String,
    commit: RestCommitDetail,
    #[serde(default)]
    parents: Vec<RestParent>,
}

#[derive(Deserialize)]
struct RestCommitDetail {
    message: String,
    author: Option<RestSignature>,
    committer: Option<RestSignature>,
}

#[derive(Deserialize)]
struct RestSignature {
    date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RestParent {
    sha: String,
}

impl RestSignature {
    fn date_or_epoch(signature: Option<Self>) -> DateTime<Utc> {
        signature.and_then(|s| s.date).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl From<RestCommit> for Commit {
    fn from(c: RestCommit) -> Self {
        Commit {
            abbreviated_sha: abbreviate_sha(&c.sha),
            authored_date: RestSignature::date_or_epoch(c.commit.author),
            committed_date: RestSignature::date_or_epoch(c.commit.committer),
            message: c.commit.message,
            parents: c.parents.into_iter().map(|p| CommitParent::from_sha(p.sha)).collect(),
            sha: c.sha,
        }
    }
}

/// Returns true if a `Link` header advertises a `rel="next"` page.
///
/// ## Examples
///
/// ```
/// use metrics_lib::github::rest::has_next_link;
///
/// let link = r#"<https://api.github.com/x?page=2>; rel="next", <https://api.github.com/x?page=5>; rel="last""#;
/// assert!(has_next_link(link));
/// assert!(!has_next_link(r#"<https://api.github.com/x?page=1>; rel="prev""#));
/// ```
pub fn has_next_link(link: &str) -> bool {
    link.split(',').any(|entry| {
        entry
            .split(';')
            .skip(1)
            .any(|param| matches!(param.trim(), r#"rel="next""# | "rel=next"))
    })
}

fn next_page_advertised(headers: &HeaderMap) -> bool {
    headers
        .get(LINK)
        .and_then(|value| value.to_str().ok())
        .is_some_and(has_next_link)
}

/// Builds the compare endpoint for `base...head`.
///
/// Every path segment is percent-encoded, so references holding `#`, `?` or
/// `/` stay part of the path.
fn compare_url(api_url: &str, repo: &Repo, base: &str, head: &str) -> Result<Url, GitHubError> {
    let range = format!("{base}...{head}");
    let mut url = Url::parse(api_url)?;
    url.path_segments_mut()
        .map_err(|()| GitHubError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(["repos", repo.owner.as_str(), repo.name.as_str(), "compare", range.as_str()]);
    Ok(url)
}

/// Page number behind a REST cursor; the first page has none.
fn page_number(cursor: Option<&str>) -> Result<u32, GitHubError> {
    match cursor {
        None => Ok(1),
        Some(cursor) => cursor
            .parse()
            .ok()
            .filter(|page| *page > 0)
            .ok_or_else(|| GitHubError::InvalidCursor(cursor.to_string())),
    }
}

/// Access to GitHub's REST API.
#[derive(Debug, Clone)]
pub struct RestApi {
    client: GitHubClient,
}

impl RestApi {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

impl CommitRangePageSource for RestApi {
    /// Commits arrive in the order GitHub lists them, oldest first. Cursors
    /// are page numbers.
    async fn fetch_commit_range(
        &self,
        repo: &Repo,
        base: &str,
        head: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<CommitRangePage, GitHubError> {
        let page = page_number(cursor)?;
        let url = compare_url(self.client.api_url(), repo, base, head)?;
        debug!(url = %url, page, "requesting commit comparison page");

        let request = self
            .client
            .get(url.as_str())
            .query(&[("per_page", page_size.min(MAX_PAGE_SIZE) as u32), ("page", page)]);
        let (response, headers): (CompareResponse, _) = self.client.send_json(request).await?;

        let has_next_page = next_page_advertised(&headers);
        Ok(CommitRangePage {
            total_commits: response.total_commits,
            commits: response.commits.into_iter().map(Commit::from).collect(),
            has_next_page,
            end_cursor: has_next_page.then(|| (page + 1).to_string()),
        })
    }
}
