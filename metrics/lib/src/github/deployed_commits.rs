//! Correlation of deployments with the commits they shipped.
//!
//! Two entry points:
//!
//! - [`query_deployed_commits`] finds one deployment by commit SHA, locates
//!   the deployment before it, and compares the two.
//! - [`query_deployments_with_commits`] fetches the most recent deployments of
//!   several environments at once and pairs consecutive deployments within
//!   each environment.
//!
//! Both are read-only and issue their requests one after another.

use super::compare::compare_commits;
use super::errors::{CorrelationError, GitHubError};
use super::locate::locate_deployment;
use super::source::{
    CommitRangePageSource, DeploymentPage, DeploymentPageSource, MAX_PAGE_SIZE, cancellable,
};
use super::types::{Deployment, DeploymentWithCommits, DeploymentsByEnv, Repo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Which deployment to look for.
#[derive(Debug, Clone)]
pub struct DeploymentOpts {
    pub environment: String,
    pub sha: String,
    /// Maximum number of deployment records to inspect.
    pub search_limit: usize,
}

/// How many commits to fetch per deployment.
#[derive(Debug, Clone)]
pub struct CommitsOpts {
    pub limit: usize,
}

/// Options for [`query_deployed_commits`].
#[derive(Debug, Clone)]
pub struct DeployedCommitsOptions {
    pub deployment: DeploymentOpts,
    pub commits: CommitsOpts,
}

/// Which deployments to fetch in batch mode.
#[derive(Debug, Clone)]
pub struct DeploymentsOpts {
    /// Environment filter; empty means all environments.
    pub environments: Vec<String>,
    /// Total number of deployments to fetch across all environments.
    pub limit: usize,
}

/// Options for [`query_deployments_with_commits`].
#[derive(Debug, Clone)]
pub struct DeploymentsWithCommitsOptions {
    pub deployments: DeploymentsOpts,
    pub commits: CommitsOpts,
}

/// Fetches up to `limit` deployments of `environments`, newest first.
///
/// This is a fixed-size fetch: pages of `min(limit, 100)` until `limit`
/// records or the end of the feed.
pub async fn fetch_deployments<D>(
    source: &D,
    repo: &Repo,
    environments: &[String],
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Deployment>, GitHubError>
where
    D: DeploymentPageSource,
{
    let page_size = limit.clamp(1, MAX_PAGE_SIZE);
    let mut cursor: Option<String> = None;
    let mut deployments = Vec::new();

    while deployments.len() < limit {
        let DeploymentPage {
            deployments: page,
            has_next_page,
            end_cursor,
        } = cancellable(
            cancel,
            source.fetch_deployments(repo, environments, page_size, cursor.as_deref()),
        )
        .await?;

        let remaining = limit - deployments.len();
        let exhausted = page.is_empty();
        deployments.extend(page.into_iter().take(remaining));

        if !has_next_page || exhausted {
            break;
        }
        cursor = end_cursor;
    }

    Ok(deployments)
}

/// Retrieves the deployment of a commit together with the commits it
/// introduced since the previous deployment in the same environment.
///
/// ## Errors
///
/// - `CorrelationError::QueryDeployments` - the deployment or its predecessor
///   could not be found, or the deployment feed failed
/// - `CorrelationError::CompareCommits` - the commit comparison failed
#[instrument(
    name = "query_deployed_commits",
    skip_all,
    fields(
        repo = %repo,
        environment = %opts.deployment.environment,
        sha = %opts.deployment.sha,
        search_limit = opts.deployment.search_limit,
        commit_limit = opts.commits.limit
    )
)]
pub async fn query_deployed_commits<D, C>(
    deployments: &D,
    commits: &C,
    repo: &Repo,
    opts: &DeployedCommitsOptions,
    cancel: &CancellationToken,
) -> Result<DeploymentWithCommits, CorrelationError>
where
    D: DeploymentPageSource,
    C: CommitRangePageSource,
{
    debug!("querying deployed commits");

    let (deployment, previous) = locate_deployment(
        deployments,
        repo,
        &opts.deployment.environment,
        &opts.deployment.sha,
        opts.deployment.search_limit,
        cancel,
    )
    .await
    .map_err(CorrelationError::QueryDeployments)?;

    debug!(
        deployment.ref_name = deployment.ref_name.as_deref().unwrap_or_default(),
        deployment.sha = %deployment.commit.sha,
        previous.ref_name = previous.ref_name.as_deref().unwrap_or_default(),
        previous.sha = %previous.commit.sha,
        "found deployment"
    );

    let base = &previous.commit.sha;
    let head = &deployment.commit.sha;

    let comparison = compare_commits(commits, repo, base, head, opts.commits.limit, cancel)
        .await
        .map_err(|source| CorrelationError::CompareCommits {
            base: base.clone(),
            head: head.clone(),
            source,
        })?;

    debug!(
        count = comparison.commits.len(),
        head = %head,
        base = %base,
        "found commits between deployments"
    );

    Ok(DeploymentWithCommits {
        deployment,
        deployed_commits: comparison.commits,
    })
}

/// Groups deployments by latest environment, keeping feed order (newest first).
fn group_by_environment(deployments: Vec<Deployment>) -> DeploymentsByEnv {
    let mut by_env = DeploymentsByEnv::new();

    for deployment in deployments {
        by_env
            .entry(deployment.latest_environment.clone())
            .or_default()
            .push(DeploymentWithCommits {
                deployment,
                deployed_commits: Vec::new(),
            });
    }

    by_env
}

/// Fetches recent deployments and the commits each one introduced.
///
/// Within every environment each deployment is compared with the next older
/// one. The oldest deployment of an environment has nothing to compare with
/// inside the fetched window; its deployed commits are its own commit only.
///
/// The batch is all-or-nothing: one failed comparison fails the whole call.
///
/// ## Errors
///
/// - `CorrelationError::QueryDeployments` - the deployment feed failed
/// - `CorrelationError::CompareCommits` - a comparison failed; names the pair
#[instrument(
    name = "query_deployments_with_commits",
    skip_all,
    fields(
        repo = %repo,
        environments = ?opts.deployments.environments,
        limit = opts.deployments.limit,
        commit_limit = opts.commits.limit
    )
)]
pub async fn query_deployments_with_commits<D, C>(
    deployments: &D,
    commits: &C,
    repo: &Repo,
    opts: &DeploymentsWithCommitsOptions,
    cancel: &CancellationToken,
) -> Result<DeploymentsByEnv, CorrelationError>
where
    D: DeploymentPageSource,
    C: CommitRangePageSource,
{
    debug!("querying deployments with commits");

    let fetched = fetch_deployments(
        deployments,
        repo,
        &opts.deployments.environments,
        opts.deployments.limit,
        cancel,
    )
    .await
    .map_err(CorrelationError::QueryDeployments)?;

    let mut by_env = group_by_environment(fetched);

    for (environment, env_deployments) in &by_env {
        debug!(environment = %environment, count = env_deployments.len(), "found deployments");
    }

    for env_deployments in by_env.values_mut() {
        for i in 0..env_deployments.len().saturating_sub(1) {
            let head = env_deployments[i].deployment.commit.sha.clone();
            let base = env_deployments[i + 1].deployment.commit.sha.clone();

            let comparison = compare_commits(commits, repo, &base, &head, opts.commits.limit, cancel)
                .await
                .map_err(|source| CorrelationError::CompareCommits {
                    base: base.clone(),
                    head: head.clone(),
                    source,
                })?;

            debug!(
                count = comparison.commits.len(),
                head = %head,
                base = %base,
                "found commits for deployment"
            );

            env_deployments[i].deployed_commits = comparison.commits;
        }

        if let Some(oldest) = env_deployments.last_mut() {
            oldest.deployed_commits = vec![oldest.deployment.commit.clone()];
        }
    }

    Ok(by_env)
}
