//! GitHub queries and deployment correlation.
//!
//! ## Examples
//!
//! ```no_run
//! use metrics_lib::config::GitHubSettings;
//! use metrics_lib::github::{
//!     CommitsOpts, DeployedCommitsOptions, DeploymentOpts, GitHubClient, GraphQlApi, Repo,
//!     RestApi, query_deployed_commits,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GitHubClient::new(reqwest::Client::new(), GitHubSettings::from_env()?);
//! let graphql = GraphQlApi::new(client.clone());
//! let rest = RestApi::new(client);
//!
//! let opts = DeployedCommitsOptions {
//!     deployment: DeploymentOpts {
//!         environment: "production".into(),
//!         sha: "1abc111".into(),
//!         search_limit: 10,
//!     },
//!     commits: CommitsOpts { limit: 250 },
//! };
//! let repo = Repo::new("hackebrot", "turtle");
//! let deployed = query_deployed_commits(&graphql, &rest, &repo, &opts, &CancellationToken::new()).await?;
//! println!("{} commits", deployed.deployed_commits.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod compare;
pub mod deployed_commits;
pub mod errors;
pub mod graphql;
pub mod history;
pub mod locate;
pub mod rest;
pub mod source;
pub mod types;

pub use client::GitHubClient;
pub use compare::compare_commits;
pub use deployed_commits::{
    CommitsOpts, DeployedCommitsOptions, DeploymentOpts, DeploymentsOpts,
    DeploymentsWithCommitsOptions, fetch_deployments, query_deployed_commits,
    query_deployments_with_commits,
};
pub use errors::{CorrelationError, GitHubError};
pub use graphql::GraphQlApi;
pub use history::walk_history;
pub use locate::locate_deployment;
pub use rest::RestApi;
pub use source::{
    CommitHistoryPage, CommitHistoryPageSource, CommitRangePage, CommitRangePageSource,
    DeploymentPage, DeploymentPageSource,
};
pub use types::{
    Commit, CommitParent, CommitsComparison, Deployment, DeploymentWithCommits, DeploymentsByEnv,
    PullRequest, Release, ReleaseWithPrs, Repo,
};
