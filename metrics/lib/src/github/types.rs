//! Core records shared by the GitHub adapters, the correlation engine and the
//! exporters.
//!
//! These are the unified models: both the GraphQL and the REST adapters convert
//! their wire payloads into these types before anything else sees them.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Number of characters in an abbreviated commit SHA.
pub const ABBREVIATED_SHA_LEN: usize = 7;

/// Returns the abbreviated form of a commit SHA.
///
/// ## Examples
///
/// ```
/// use metrics_lib::github::types::abbreviate_sha;
///
/// assert_eq!(abbreviate_sha("1abc111aaaaaaaaaaa"), "1abc111");
/// assert_eq!(abbreviate_sha("1abc"), "1abc");
/// ```
pub fn abbreviate_sha(sha: &str) -> String {
    sha.chars().take(ABBREVIATED_SHA_LEN).collect()
}

/// A GitHub repository, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parent reference of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitParent {
    pub abbreviated_sha: String,
    pub sha: String,
}

impl CommitParent {
    pub fn from_sha(sha: impl Into<String>) -> Self {
        let sha = sha.into();
        Self {
            abbreviated_sha: abbreviate_sha(&sha),
            sha,
        }
    }
}

/// A Git commit snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub abbreviated_sha: String,
    pub sha: String,
    pub authored_date: DateTime<Utc>,
    pub committed_date: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub parents: Vec<CommitParent>,
}

impl Commit {
    /// Returns true if `sha` is either the full or the abbreviated SHA of
    /// this commit.
    pub fn matches(&self, sha: &str) -> bool {
        self.sha == sha || self.abbreviated_sha == sha
    }
}

/// Commits between two references.
///
/// `total_commits` is the count reported upstream; `commits` may be shorter
/// when the caller asked for fewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitsComparison {
    pub total_commits: usize,
    pub commits: Vec<Commit>,
}

/// A GitHub deployment.
///
/// An environment can be promoted, so `original_environment` and
/// `latest_environment` may differ. Grouping always uses the latter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub original_environment: String,
    pub latest_environment: String,
    pub task: String,
    pub state: String,
    pub ref_name: Option<String>,
    pub commit: Commit,
}

/// A deployment together with the commits it introduced to its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentWithCommits {
    #[serde(flatten)]
    pub deployment: Deployment,
    pub deployed_commits: Vec<Commit>,
}

/// Deployments with their commits, grouped by latest environment.
///
/// Each list is ordered newest first. The map itself has no defined order.
pub type DeploymentsByEnv = HashMap<String, Vec<DeploymentWithCommits>>;

/// A merged pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// A GitHub release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub name: String,
    pub tag_name: String,
    pub is_draft: bool,
    pub is_latest: bool,
    pub is_prerelease: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Auto-generated release notes list merged PRs as
/// `* Title by @user in https://github.com/owner/repo/pull/123`.
static RELEASE_NOTES_PR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\* .*by @\w+ in .+/pull/(?P<pr>\d+)").expect("release notes pattern is valid")
});

/// A release plus the pull request numbers referenced by its generated notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseWithPrs {
    #[serde(flatten)]
    pub release: Release,
    pub prs: Vec<u64>,
}

impl From<Release> for ReleaseWithPrs {
    fn from(release: Release) -> Self {
        let prs = RELEASE_NOTES_PR
            .captures_iter(&release.description)
            .filter_map(|caps| caps.name("pr")?.as_str().parse().ok())
            .collect();

        Self { release, prs }
    }
}
