//! GitHub GraphQL API adapter.
//!
//! Provides the deployment feed and a commit-range source for the
//! correlation engine, the commit history of a single commit, and the plain
//! paginated listings of merged pull requests and releases.

use super::client::GitHubClient;
use super::errors::GitHubError;
use super::source::{
    CommitHistoryPage, CommitHistoryPageSource, CommitRangePage, CommitRangePageSource, DeploymentPage,
    DeploymentPageSource, MAX_PAGE_SIZE, cancellable,
};
use super::types::{Commit, CommitParent, Deployment, PullRequest, Release, Repo};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const COMMIT_FIELDS: &str = r#"
    abbreviatedOid
    oid
    authoredDate
    committedDate
    message
    parents(first: 2) { nodes { abbreviatedOid oid } }
"#;

fn deployments_query() -> String {
    format!(
        r#"query($owner: String!, $name: String!, $perPage: Int!, $endCursor: String, $environments: [String!]) {{
  repository(owner: $owner, name: $name) {{
    deployments(first: $perPage, after: $endCursor, orderBy: {{field: CREATED_AT, direction: DESC}}, environments: $environments) {{
      pageInfo {{ hasNextPage endCursor }}
      nodes {{
        description
        createdAt
        updatedAt
        originalEnvironment
        latestEnvironment
        task
        state
        ref {{ name }}
        commit {{ {COMMIT_FIELDS} }}
      }}
    }}
  }}
}}"#
    )
}

// GitHub lists comparison commits newest first. Paging backwards from the end
// yields the oldest window first.
fn compare_query() -> String {
    format!(
        r#"query($owner: String!, $name: String!, $baseRef: String!, $headRef: String!, $perPage: Int!, $startCursor: String) {{
  repository(owner: $owner, name: $name) {{
    ref(qualifiedName: $baseRef) {{
      compare(headRef: $headRef) {{
        commits(last: $perPage, before: $startCursor) {{
          totalCount
          pageInfo {{ hasPreviousPage startCursor }}
          nodes {{ {COMMIT_FIELDS} }}
        }}
      }}
    }}
  }}
}}"#
    )
}

fn history_query() -> String {
    format!(
        r#"query($owner: String!, $name: String!, $oid: GitObjectID!, $perPage: Int!, $endCursor: String) {{
  repository(owner: $owner, name: $name) {{
    object(oid: $oid) {{
      ... on Commit {{
        history(first: $perPage, after: $endCursor) {{
          pageInfo {{ hasNextPage endCursor }}
          nodes {{ {COMMIT_FIELDS} }}
        }}
      }}
    }}
  }}
}}"#
    )
}

const PULL_REQUESTS_QUERY: &str = r#"query($owner: String!, $name: String!, $perPage: Int!, $endCursor: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(states: [MERGED], first: $perPage, after: $endCursor, orderBy: {field: UPDATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes { number title createdAt updatedAt closedAt mergedAt }
    }
  }
}"#;

const RELEASES_QUERY: &str = r#"query($owner: String!, $name: String!, $perPage: Int!, $endCursor: String) {
  repository(owner: $owner, name: $name) {
    releases(first: $perPage, after: $endCursor, orderBy: {field: CREATED_AT, direction: DESC}) {
      pageInfo { hasNextPage endCursor }
      nodes { name tagName isDraft isLatest isPrerelease description createdAt publishedAt }
    }
  }
}"#;

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Deserialize)]
struct RepositoryData<T> {
    repository: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackwardPageInfo {
    has_previous_page: bool,
    start_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparedCommits {
    total_count: usize,
    page_info: BackwardPageInfo,
    nodes: Vec<GqlCommit>,
}

#[derive(Deserialize)]
struct Comparison {
    commits: ComparedCommits,
}

#[derive(Deserialize)]
struct ComparedRef {
    compare: Option<Comparison>,
}

#[derive(Deserialize)]
struct BaseRef {
    #[serde(rename = "ref")]
    base: Option<ComparedRef>,
}

#[derive(Deserialize)]
struct HistoryCommit {
    history: Option<Connection<GqlCommit>>,
}

#[derive(Deserialize)]
struct HistoryObject {
    object: Option<HistoryCommit>,
}

#[derive(Deserialize)]
struct Deployments {
    deployments: Connection<GqlDeployment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequests {
    pull_requests: Connection<GqlPullRequest>,
}

#[derive(Deserialize)]
struct Releases {
    releases: Connection<GqlRelease>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlCommitParent {
    abbreviated_oid: String,
    oid: String,
}

#[derive(Deserialize)]
struct GqlParents {
    nodes: Vec<GqlCommitParent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlCommit {
    abbreviated_oid: String,
    oid: String,
    authored_date: DateTime<Utc>,
    committed_date: DateTime<Utc>,
    message: String,
    parents: Option<GqlParents>,
}

#[derive(Deserialize)]
struct GqlRef {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlDeployment {
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    original_environment: Option<String>,
    latest_environment: Option<String>,
    task: Option<String>,
    state: Option<String>,
    #[serde(rename = "ref")]
    git_ref: Option<GqlRef>,
    commit: Option<GqlCommit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPullRequest {
    number: u64,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlRelease {
    name: Option<String>,
    tag_name: String,
    is_draft: bool,
    is_latest: bool,
    is_prerelease: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl From<GqlCommit> for Commit {
    fn from(c: GqlCommit) -> Self {
        let parents = c
            .parents
            .map(|p| p.nodes)
            .unwrap_or_default()
            .into_iter()
            .map(|p| CommitParent {
                abbreviated_sha: p.abbreviated_oid,
                sha: p.oid,
            })
            .collect();

        Commit {
            abbreviated_sha: c.abbreviated_oid,
            sha: c.oid,
            authored_date: c.authored_date,
            committed_date: c.committed_date,
            message: c.message,
            parents,
        }
    }
}

impl TryFrom<GqlDeployment> for Deployment {
    type Error = GitHubError;

    fn try_from(d: GqlDeployment) -> Result<Self, Self::Error> {
        let commit = d.commit.ok_or(GitHubError::MissingField("deployment.commit"))?;

        Ok(Deployment {
            description: d.description.unwrap_or_default(),
            created_at: d.created_at,
            updated_at: d.updated_at,
            original_environment: d.original_environment.unwrap_or_default(),
            latest_environment: d.latest_environment.unwrap_or_default(),
            task: d.task.unwrap_or_default(),
            state: d.state.unwrap_or_default(),
            ref_name: d.git_ref.map(|r| r.name),
            commit: commit.into(),
        })
    }
}

impl From<GqlPullRequest> for PullRequest {
    fn from(p: GqlPullRequest) -> Self {
        PullRequest {
            number: p.number,
            title: p.title,
            created_at: p.created_at,
            updated_at: p.updated_at,
            closed_at: p.closed_at,
            merged_at: p.merged_at,
        }
    }
}

impl From<GqlRelease> for Release {
    fn from(r: GqlRelease) -> Self {
        Release {
            name: r.name.unwrap_or_default(),
            tag_name: r.tag_name,
            is_draft: r.is_draft,
            is_latest: r.is_latest,
            is_prerelease: r.is_prerelease,
            description: r.description.unwrap_or_default(),
            created_at: r.created_at,
            published_at: r.published_at,
        }
    }
}

/// Collects up to `limit` nodes from a cursor-paginated connection.
async fn collect_nodes<T, F, Fut>(limit: usize, mut fetch_page: F) -> Result<Vec<T>, GitHubError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Connection<T>, GitHubError>>,
{
    let mut cursor = None;
    let mut nodes = Vec::new();

    while nodes.len() < limit {
        let page = fetch_page(cursor).await?;
        let remaining = limit - nodes.len();
        let exhausted = page.nodes.is_empty();
        nodes.extend(page.nodes.into_iter().take(remaining));

        if !page.page_info.has_next_page || exhausted {
            break;
        }
        cursor = page.page_info.end_cursor;
    }

    Ok(nodes)
}

/// Access to GitHub's GraphQL API.
#[derive(Debug, Clone)]
pub struct GraphQlApi {
    client: GitHubClient,
}

impl GraphQlApi {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    async fn query<T>(&self, query: &str, variables: serde_json::Value) -> Result<T, GitHubError>
    where
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.client.graphql_url())
            .json(&GraphQlRequest { query, variables });

        let (response, _): (GraphQlResponse<T>, _) = self.client.send_json(request).await?;

        if !response.errors.is_empty() {
            let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(GitHubError::GraphQl(messages.join("; ")));
        }

        response.data.ok_or(GitHubError::MissingField("data"))
    }

    async fn repository<T>(&self, query: &str, variables: serde_json::Value) -> Result<T, GitHubError>
    where
        T: DeserializeOwned,
    {
        let data: RepositoryData<T> = self.query(query, variables).await?;
        data.repository.ok_or(GitHubError::MissingField("repository"))
    }

    /// Fetches merged pull requests, most recently updated first.
    pub async fn pull_requests(
        &self,
        repo: &Repo,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        debug!(repo = %repo, limit, "querying pull requests");
        let per_page = limit.clamp(1, MAX_PAGE_SIZE);

        let nodes = collect_nodes(limit, |cursor| async move {
            let variables = json!({
                "owner": repo.owner,
                "name": repo.name,
                "perPage": per_page,
                "endCursor": cursor,
            });
            let data: PullRequests =
                cancellable(cancel, self.repository(PULL_REQUESTS_QUERY, variables)).await?;
            Ok(data.pull_requests)
        })
        .await?;

        Ok(nodes.into_iter().map(PullRequest::from).collect())
    }

    /// Fetches releases, newest first.
    pub async fn releases(
        &self,
        repo: &Repo,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Release>, GitHubError> {
        debug!(repo = %repo, limit, "querying releases");
        let per_page = limit.clamp(1, MAX_PAGE_SIZE);

        let nodes = collect_nodes(limit, |cursor| async move {
            let variables = json!({
                "owner": repo.owner,
                "name": repo.name,
                "perPage": per_page,
                "endCursor": cursor,
            });
            let data: Releases = cancellable(cancel, self.repository(RELEASES_QUERY, variables)).await?;
            Ok(data.releases)
        })
        .await?;

        Ok(nodes.into_iter().map(Release::from).collect())
    }
}

impl DeploymentPageSource for GraphQlApi {
    async fn fetch_deployments(
        &self,
        repo: &Repo,
        environments: &[String],
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<DeploymentPage, GitHubError> {
        debug!(repo = %repo, ?environments, page_size, cursor, "requesting deployments page");

        // An empty list would filter out every deployment.
        let environments = (!environments.is_empty()).then_some(environments);
        let variables = json!({
            "owner": repo.owner,
            "name": repo.name,
            "perPage": page_size.min(MAX_PAGE_SIZE),
            "endCursor": cursor,
            "environments": environments,
        });

        let data: Deployments = self.repository(&deployments_query(), variables).await?;
        let Connection { page_info, nodes } = data.deployments;

        Ok(DeploymentPage {
            deployments: nodes
                .into_iter()
                .map(Deployment::try_from)
                .collect::<Result<_, _>>()?,
            has_next_page: page_info.has_next_page,
            end_cursor: page_info.end_cursor,
        })
    }
}

impl CommitRangePageSource for GraphQlApi {
    /// Walks the comparison backwards and reverses each page, so commits
    /// arrive oldest first across pages. Cursors are GraphQL start cursors.
    async fn fetch_commit_range(
        &self,
        repo: &Repo,
        base: &str,
        head: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<CommitRangePage, GitHubError> {
        debug!(repo = %repo, base, head, page_size, cursor, "requesting commit comparison page");

        let variables = json!({
            "owner": repo.owner,
            "name": repo.name,
            "baseRef": base,
            "headRef": head,
            "perPage": page_size.min(MAX_PAGE_SIZE),
            "startCursor": cursor,
        });

        let data: BaseRef = self.repository(&compare_query(), variables).await?;
        let compared = data.base.ok_or_else(|| GitHubError::RefNotFound(base.to_string()))?;
        let ComparedCommits {
            total_count,
            page_info,
            nodes,
        } = compared
            .compare
            .ok_or_else(|| GitHubError::RefNotFound(head.to_string()))?
            .commits;

        Ok(CommitRangePage {
            total_commits: total_count,
            commits: nodes.into_iter().rev().map(Commit::from).collect(),
            has_next_page: page_info.has_previous_page,
            end_cursor: page_info.start_cursor,
        })
    }
}

impl CommitHistoryPageSource for GraphQlApi {
    async fn fetch_history(
        &self,
        repo: &Repo,
        head: &str,
        page_size: usize,
        cursor: Option<&str>,
    ) -> Result<CommitHistoryPage, GitHubError> {
        debug!(repo = %repo, head, page_size, cursor, "requesting commit history page");

        let variables = json!({
            "owner": repo.owner,
            "name": repo.name,
            "oid": head,
            "perPage": page_size.min(MAX_PAGE_SIZE),
            "endCursor": cursor,
        });

        let data: HistoryObject = self.repository(&history_query(), variables).await?;
        let Connection { page_info, nodes } = data
            .object
            .and_then(|object| object.history)
            .ok_or_else(|| GitHubError::RefNotFound(head.to_string()))?;

        Ok(CommitHistoryPage {
            commits: nodes.into_iter().map(Commit::from).collect(),
            has_next_page: page_info.has_next_page,
            end_cursor: page_info.end_cursor,
        })
    }
}
