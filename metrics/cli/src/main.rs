//! Metrics CLI - Retrieve data for measuring software delivery performance

use clap::{Parser, Subcommand, ValueEnum};
use metrics_lib::config::{GitHubSettings, default_repo_from_env};
use metrics_lib::export::{Encoding, Exporter, Target};
use metrics_lib::github::{
    CommitsOpts, DeployedCommitsOptions, DeploymentOpts, DeploymentsOpts,
    DeploymentsWithCommitsOptions, GitHubClient, GraphQlApi, ReleaseWithPrs, Repo, RestApi,
    compare_commits, fetch_deployments, query_deployed_commits, query_deployments_with_commits,
    walk_history,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "metrics")]
#[command(about = "Retrieve data for measuring software delivery performance", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Enable debug logging (same as -vv)
    #[arg(long, global = true)]
    debug: bool,

    /// Output logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Export encoding (json, csv, plain)
    #[arg(short, long, global = true, default_value = "json")]
    encoding: Encoding,

    /// Export to file instead of stdout
    #[arg(short, long, global = true, value_name = "FILE")]
    filename: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Retrieve metrics from GitHub
    Github {
        /// Owner of the GitHub repo [env: METRICS__GITHUB__REPO_OWNER]
        #[arg(short = 'o', long)]
        repo_owner: Option<String>,

        /// Name of the GitHub repo [env: METRICS__GITHUB__REPO_NAME]
        #[arg(short = 'n', long)]
        repo_name: Option<String>,

        #[command(subcommand)]
        command: GithubCommands,
    },
}

#[derive(Subcommand, Debug)]
enum GithubCommands {
    /// Retrieve data about merged GitHub Pull Requests
    Prs {
        /// Maximum number of pull requests to fetch
        #[arg(short, long, default_value_t = 10, value_parser = parse_limit)]
        limit: usize,
    },

    /// Retrieve data about GitHub Releases
    Releases {
        /// Maximum number of releases to fetch
        #[arg(short, long, default_value_t = 10, value_parser = parse_limit)]
        limit: usize,

        /// Parse PR numbers from auto-generated release notes
        #[arg(long)]
        prs: bool,
    },

    /// Retrieve data about GitHub Deployments
    Deployments {
        /// Maximum number of deployments to fetch
        #[arg(short, long, default_value_t = 10, value_parser = parse_limit)]
        limit: usize,

        /// Deployment environment (repeatable: --env stage --env production)
        #[arg(long = "env", value_name = "ENV")]
        environments: Vec<String>,

        /// Include deployed commits for each deployment
        #[arg(long)]
        commits: bool,

        /// Maximum number of commits to fetch per deployment
        #[arg(long, default_value_t = 250, value_parser = parse_limit, requires = "commits")]
        commit_limit: usize,
    },

    /// Retrieve a deployment with its commits
    DeployedCommits {
        /// Git commit SHA of the deployment (full or abbreviated)
        #[arg(long)]
        sha: String,

        /// Deployment environment
        #[arg(long = "env", default_value = "production")]
        environment: String,

        /// Maximum number of deployments to search
        #[arg(long, default_value_t = 10, value_parser = parse_limit)]
        search_limit: usize,

        /// Maximum number of commits to fetch for the deployment
        #[arg(long, default_value_t = 250, value_parser = parse_limit)]
        commit_limit: usize,
    },

    /// Retrieve the commits between two Git refs
    Compare {
        /// Base Git ref
        #[arg(long)]
        base: String,

        /// Head Git ref
        #[arg(long)]
        head: String,

        /// Maximum number of commits to fetch
        #[arg(short, long, default_value_t = 100, value_parser = parse_limit)]
        limit: usize,

        /// GitHub API to compare with
        #[arg(long, value_enum, default_value_t = CompareApi::Graphql)]
        api: CompareApi,
    },

    /// Retrieve the commits from a head commit back to a base commit
    History {
        /// Base Git commit, excluded from the result
        #[arg(long)]
        base: String,

        /// Head Git commit (full SHA)
        #[arg(long)]
        head: String,

        /// Maximum number of commits to walk before giving up
        #[arg(short, long, default_value_t = 100, value_parser = parse_limit)]
        limit: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CompareApi {
    Graphql,
    Rest,
}

fn parse_limit(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("cannot be smaller than 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,metrics_lib=info,metrics=info".to_string(),
            2 => "info,metrics_lib=debug,metrics=debug".to_string(),
            _ => "debug,metrics_lib=trace,metrics=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

/// Resolves the repository from flags, falling back to the environment.
fn resolve_repo(owner: Option<String>, name: Option<String>) -> Result<Repo, String> {
    let (env_owner, env_name) = default_repo_from_env();
    let owner = owner.filter(|o| !o.is_empty()).or(env_owner);
    let name = name.filter(|n| !n.is_empty()).or(env_name);

    match (owner, name) {
        (Some(owner), Some(name)) => Ok(Repo::new(owner, name)),
        _ => Err("repo owner and repo name are required. Set env vars or pass flags".to_string()),
    }
}

async fn run_github(
    repo: Repo,
    command: GithubCommands,
    exporter: &Exporter,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = GitHubClient::from_settings(GitHubSettings::from_env()?)?;
    let graphql = GraphQlApi::new(client.clone());
    let rest = RestApi::new(client);

    match command {
        GithubCommands::Prs { limit } => {
            let prs = graphql.pull_requests(&repo, limit, cancel).await?;
            exporter.export(&prs)?;
        }

        GithubCommands::Releases { limit, prs } => {
            let releases = graphql.releases(&repo, limit, cancel).await?;
            if prs {
                let with_prs: Vec<ReleaseWithPrs> = releases.into_iter().map(ReleaseWithPrs::from).collect();
                exporter.export(&with_prs)?;
            } else {
                exporter.export(&releases)?;
            }
        }

        GithubCommands::Deployments {
            limit,
            environments,
            commits,
            commit_limit,
        } => {
            if commits {
                let opts = DeploymentsWithCommitsOptions {
                    deployments: DeploymentsOpts { environments, limit },
                    commits: CommitsOpts { limit: commit_limit },
                };
                let by_env = query_deployments_with_commits(&graphql, &rest, &repo, &opts, cancel)
                    .await
                    .map_err(|e| format!("error querying deployments with commits: {e}"))?;
                let sorted: BTreeMap<_, _> = by_env.into_iter().collect();
                exporter.export(&sorted)?;
            } else {
                let deployments = fetch_deployments(&graphql, &repo, &environments, limit, cancel)
                    .await
                    .map_err(|e| format!("error querying deployments: {e}"))?;
                exporter.export(&deployments)?;
            }
        }

        GithubCommands::DeployedCommits {
            sha,
            environment,
            search_limit,
            commit_limit,
        } => {
            let opts = DeployedCommitsOptions {
                deployment: DeploymentOpts {
                    environment,
                    sha,
                    search_limit,
                },
                commits: CommitsOpts { limit: commit_limit },
            };
            let deployment = query_deployed_commits(&graphql, &rest, &repo, &opts, cancel)
                .await
                .map_err(|e| format!("error querying deployed commits: {e}"))?;
            exporter.export(&deployment)?;
        }

        GithubCommands::Compare {
            base,
            head,
            limit,
            api,
        } => {
            let comparison = match api {
                CompareApi::Graphql => compare_commits(&graphql, &repo, &base, &head, limit, cancel).await,
                CompareApi::Rest => compare_commits(&rest, &repo, &base, &head, limit, cancel).await,
            }
            .map_err(|e| format!("error comparing refs: {e}"))?;
            exporter.export(&comparison)?;
        }

        GithubCommands::History { base, head, limit } => {
            let commits = walk_history(&graphql, &repo, &head, &base, limit, cancel)
                .await
                .map_err(|e| format!("error querying commit history: {e}"))?;
            exporter.export(&commits)?;
        }
    }

    Ok(())
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
    let target = match cli.filename {
        Some(path) => Target::File(path),
        None => Target::Stdout,
    };
    let exporter = Exporter::new(cli.encoding, target);

    match cli.command {
        Commands::Github {
            repo_owner,
            repo_name,
            command,
        } => {
            let repo = resolve_repo(repo_owner, repo_name)?;
            debug!(repo = %repo, ?command, encoding = %cli.encoding, "running github command");
            run_github(repo, command, &exporter, &cancel).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let verbosity = if cli.debug { cli.log_verbosity.max(2) } else { cli.log_verbosity };
    init_tracing(verbosity, cli.log_json);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
