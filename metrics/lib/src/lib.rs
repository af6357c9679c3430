//! Metrics Library - Software delivery metrics from GitHub
//!
//! Queries pull requests, releases and deployments of a GitHub repository and
//! correlates each deployment with the commits it shipped.
//!
//! ## Modules
//!
//! - [`github`] - GraphQL and REST adapters, plus the correlation engine built
//!   on the paginated [`DeploymentPageSource`](github::DeploymentPageSource) and
//!   [`CommitRangePageSource`](github::CommitRangePageSource) traits
//! - [`config`] - `METRICS__*` environment configuration
//! - [`export`] - JSON, CSV and plain text output

pub mod config;
pub mod export;
pub mod github;
