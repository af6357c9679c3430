//! In-memory GitHub fixtures shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use metrics_lib::github::{
    Commit, CommitParent, CommitRangePage, CommitRangePageSource, Deployment, DeploymentPage,
    DeploymentPageSource, GitHubError, Repo,
};
use std::collections::HashMap;
use std::sync::Mutex;

pub const SHA_1: &str = "1abc111aaaaaaaaaaa";
pub const SHA_2: &str = "2abc111bbbbbbbbbbb";
pub const SHA_3: &str = "3abc111ccccccccccc";
pub const SHA_5: &str = "5abc111yyyyyyyyyyy";
pub const SHA_8: &str = "8abc222eeeeeeeeeee";

pub fn repo() -> Repo {
    Repo::new("hackebrot", "turtle")
}

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

pub fn commit(sha: &str, date: &str, message: &str, parent: Option<&str>) -> Commit {
    Commit {
        abbreviated_sha: sha[..7].to_string(),
        sha: sha.to_string(),
        authored_date: at(date),
        committed_date: at(date),
        message: message.to_string(),
        parents: parent.map(CommitParent::from_sha).into_iter().collect(),
    }
}

pub fn commit_1() -> Commit {
    commit(SHA_1, "2022-05-01T20:18:05Z", "commit changes 333", Some(SHA_2))
}

pub fn commit_2() -> Commit {
    commit(SHA_2, "2022-04-01T20:24:05Z", "commit changes 2222", Some(SHA_5))
}

pub fn commit_3() -> Commit {
    commit(SHA_3, "2022-02-01T18:25:05Z", "commit changes", None)
}

pub fn commit_5() -> Commit {
    commit(SHA_5, "2022-04-01T18:22:01Z", "commit 3", Some(SHA_8))
}

pub fn commit_8() -> Commit {
    commit(SHA_8, "2022-03-08T10:05:02Z", "commit 2", Some(SHA_3))
}

pub fn deployment(description: &str, environment: &str, created_at: &str, state: &str, commit: Commit) -> Deployment {
    Deployment {
        description: description.to_string(),
        created_at: at(created_at),
        updated_at: at(created_at),
        original_environment: environment.to_string(),
        latest_environment: environment.to_string(),
        task: "deploy".to_string(),
        state: state.to_string(),
        ref_name: None,
        commit,
    }
}

pub fn deployment_03() -> Deployment {
    deployment("Deployment03", "stage", "2022-05-01T20:20:05Z", "ACTIVE", commit_1())
}

pub fn deployment_02() -> Deployment {
    deployment("Deployment02", "stage", "2022-04-01T20:25:05Z", "INACTIVE", commit_2())
}

pub fn deployment_01() -> Deployment {
    deployment("Deployment01", "stage", "2022-02-01T20:25:05Z", "INACTIVE", commit_3())
}

pub fn production_deployment() -> Deployment {
    deployment("Production01", "production", "2022-05-02T08:00:00Z", "ACTIVE", commit_1())
}

/// Deployment feed keyed by environment filter and cursor.
///
/// Pages are served as registered, whatever page size is requested. The
/// `helloworld` environment fails.
#[derive(Default)]
pub struct FixtureDeployments {
    pages: HashMap<(String, Option<String>), DeploymentPage>,
    pub requests: Mutex<Vec<(Vec<String>, usize, Option<String>)>>,
}

impl FixtureDeployments {
    pub fn with_page(mut self, environments: &[&str], cursor: Option<&str>, page: DeploymentPage) -> Self {
        self.pages
            .insert((environments.join(","), cursor.map(str::to_string)), page);
        self
    }

    /// Two pages of stage deployments: 03 and 02, then 01.
    pub fn stage() -> Self {
        Self::default()
            .with_page(
                &["stage"],
                None,
                DeploymentPage {
                    deployments: vec![deployment_03(), deployment_02()],
                    has_next_page: true,
                    end_cursor: Some("abc123".to_string()),
                },
            )
            .with_page(
                &["stage"],
                Some("abc123"),
                DeploymentPage {
                    deployments: vec![deployment_01()],
                    has_next_page: false,
                    end_cursor: Some("abc456".to_string()),
                },
            )
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl DeploymentPageSource for FixtureDeployments {
    async fn fetch_deployments(
        &self,
        _repo: &Repo,
        environments: &[String],
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<DeploymentPage, GitHubError> {
        self.requests
            .lock()
            .unwrap()
            .push((environments.to_vec(), page_size, cursor.map(str::to_string)));

        if environments.iter().any(|e| e == "helloworld") {
            return Err(GitHubError::GraphQl("nope".to_string()));
        }

        let key = (environments.join(","), cursor.map(str::to_string));
        Ok(self.pages.get(&key).cloned().unwrap_or_default())
    }
}

/// Commit comparisons keyed by base, head and cursor.
///
/// Unknown comparisons fail with a 404.
#[derive(Default)]
pub struct FixtureCommits {
    pages: HashMap<(String, String, Option<String>), CommitRangePage>,
    pub requests: Mutex<Vec<(String, String, usize, Option<String>)>>,
}

impl FixtureCommits {
    pub fn with_page(mut self, base: &str, head: &str, cursor: Option<&str>, range: CommitRangePage) -> Self {
        self.pages
            .insert((base.to_string(), head.to_string(), cursor.map(str::to_string)), range);
        self
    }

    /// `2abc..1abc` in one page and `3abc..2abc` in two.
    pub fn stage() -> Self {
        Self::default()
            .with_page(
                SHA_2,
                SHA_1,
                None,
                CommitRangePage {
                    total_commits: 2,
                    commits: vec![commit_1(), commit_2()],
                    has_next_page: false,
                    end_cursor: None,
                },
            )
            .with_page(
                SHA_3,
                SHA_2,
                None,
                CommitRangePage {
                    total_commits: 3,
                    commits: vec![commit_2(), commit_5(), commit_8()],
                    has_next_page: true,
                    end_cursor: Some("page2".to_string()),
                },
            )
            .with_page(
                SHA_3,
                SHA_2,
                Some("page2"),
                CommitRangePage {
                    total_commits: 1,
                    commits: vec![commit_3()],
                    has_next_page: false,
                    end_cursor: None,
                },
            )
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl CommitRangePageSource for FixtureCommits {
    async fn fetch_commit_range(
        &self,
        _repo: &Repo,
        base: &str,
        head: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<CommitRangePage, GitHubError> {
        let cursor = cursor.map(str::to_string);
        self.requests
            .lock()
            .unwrap()
            .push((base.to_string(), head.to_string(), page_size, cursor.clone()));

        self.pages
            .get(&(base.to_string(), head.to_string(), cursor))
            .cloned()
            .ok_or_else(|| GitHubError::Api {
                status: 404,
                message: "Not Found".to_string(),
            })
    }
}
