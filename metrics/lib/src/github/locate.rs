//! Search for the deployment of a commit and the deployment before it.
//!
//! Deployments of one environment are paged newest first. The page size starts
//! small and doubles after every page that did not settle the search, capped by
//! the upstream page limit and by what is left of the caller's record budget.
//! That keeps the number of requests logarithmic in the budget while never
//! inspecting more than `search_limit` records.

use super::errors::GitHubError;
use super::source::{DeploymentPage, DeploymentPageSource, MAX_PAGE_SIZE, cancellable};
use super::types::{Deployment, Repo};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Page size of the first request when the budget allows it.
pub const INITIAL_PAGE_SIZE: usize = 10;

/// Size of the page following one of size `current`.
///
/// ## Examples
///
/// ```
/// use metrics_lib::github::locate::next_page_size;
///
/// // budget 50: 10, 20, then capped at the 20 records left
/// assert_eq!(next_page_size(10, 10, 50), 20);
/// assert_eq!(next_page_size(20, 30, 50), 20);
///
/// // budget 15: 10, then the 5 records left
/// assert_eq!(next_page_size(10, 10, 15), 5);
///
/// // never above the upstream limit of 100
/// assert_eq!(next_page_size(80, 150, 1000), 100);
/// ```
pub fn next_page_size(current: usize, scanned: usize, search_limit: usize) -> usize {
    current
        .saturating_mul(2)
        .min(MAX_PAGE_SIZE)
        .min(search_limit.saturating_sub(scanned))
}

/// Accumulated state of one search.
#[derive(Debug)]
struct Search {
    scanned: usize,
    page_size: usize,
    cursor: Option<String>,
    matched: Option<Deployment>,
}

/// Outcome of scanning one page.
enum Scan {
    Found(Deployment, Deployment),
    Continue(Search),
}

impl Search {
    fn new(search_limit: usize) -> Self {
        Self {
            scanned: 0,
            page_size: INITIAL_PAGE_SIZE.min(search_limit),
            cursor: None,
            matched: None,
        }
    }

    /// Consumes the records of `deployments` in arrival order, stopping at the
    /// budget. The first record after the match is its predecessor.
    fn scan(mut self, deployments: Vec<Deployment>, sha: &str, search_limit: usize) -> Scan {
        let remaining = search_limit.saturating_sub(self.scanned);

        for deployment in deployments.into_iter().take(remaining) {
            self.scanned += 1;

            debug!(
                sha = %deployment.commit.sha,
                created_at = %deployment.created_at,
                ref_name = deployment.ref_name.as_deref().unwrap_or_default(),
                "processing deployment"
            );

            if let Some(matched) = self.matched.take() {
                debug!(sha = %deployment.commit.sha, "found previous deployment");
                return Scan::Found(matched, deployment);
            }

            if deployment.commit.matches(sha) {
                debug!(sha = %deployment.commit.sha, "found matching deployment");
                self.matched = Some(deployment);
            }
        }

        Scan::Continue(self)
    }
}

/// Finds the deployment of `sha` in `environment` and the deployment that
/// preceded it there.
///
/// `sha` may be a full or abbreviated commit SHA. At most `search_limit`
/// deployment records are inspected.
///
/// ## Errors
///
/// - `GitHubError::DeploymentNotFound` - no matching deployment within the
///   budget or the feed
/// - `GitHubError::PredecessorNotFound` - the match was the last record
///   reachable within the budget or the feed
/// - any error of the page source, and `GitHubError::Cancelled`
pub async fn locate_deployment<D>(
    source: &D,
    repo: &Repo,
    environment: &str,
    sha: &str,
    search_limit: usize,
    cancel: &CancellationToken,
) -> Result<(Deployment, Deployment), GitHubError>
where
    D: DeploymentPageSource,
{
    debug!(
        repo = %repo,
        environment,
        sha,
        search_limit,
        "querying deployment"
    );

    let not_found = |search_limit| GitHubError::DeploymentNotFound {
        environment: environment.to_string(),
        sha: sha.to_string(),
        search_limit,
    };
    let no_predecessor = |search_limit| GitHubError::PredecessorNotFound {
        environment: environment.to_string(),
        sha: sha.to_string(),
        search_limit,
    };

    if search_limit == 0 {
        return Err(not_found(Some(search_limit)));
    }

    let environments = [environment.to_string()];
    let mut search = Search::new(search_limit);

    loop {
        let DeploymentPage {
            deployments,
            has_next_page,
            end_cursor,
        } = cancellable(
            cancel,
            source.fetch_deployments(
                repo,
                &environments,
                search.page_size,
                search.cursor.as_deref(),
            ),
        )
        .await?;

        let end_of_feed = !has_next_page || deployments.is_empty();

        search = match search.scan(deployments, sha, search_limit) {
            Scan::Found(matched, previous) => return Ok((matched, previous)),
            Scan::Continue(search) => search,
        };

        if search.scanned >= search_limit {
            return Err(match search.matched {
                None => not_found(Some(search_limit)),
                Some(_) => no_predecessor(Some(search_limit)),
            });
        }

        if end_of_feed {
            return Err(match search.matched {
                None => not_found(None),
                Some(_) => no_predecessor(None),
            });
        }

        search.page_size = next_page_size(search.page_size, search.scanned, search_limit);
        search.cursor = end_cursor;

        debug!(page_size = search.page_size, scanned = search.scanned, "increasing page size");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::Commit;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn sha(i: usize) -> String {
        format!("{:07x}{}", i + 1, "f".repeat(33))
    }

    fn deployment(i: usize) -> Deployment {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() - Duration::hours(i as i64);
        let sha = sha(i);
        Deployment {
            description: format!("Deployment{i}"),
            created_at: ts,
            updated_at: ts,
            original_environment: "stage".into(),
            latest_environment: "stage".into(),
            task: "deploy".into(),
            state: "INACTIVE".into(),
            ref_name: None,
            commit: Commit {
                abbreviated_sha: sha[..7].to_string(),
                sha,
                authored_date: ts,
                committed_date: ts,
                message: format!("commit {i}"),
                parents: vec![],
            },
        }
    }

    /// Newest-first feed that honours the requested page size. The cursor is
    /// the offset of the next record.
    struct SyntheticFeed {
        deployments: Vec<Deployment>,
        requests: Mutex<Vec<usize>>,
    }

    impl SyntheticFeed {
        fn new(len: usize) -> Self {
            Self {
                deployments: (0..len).map(deployment).collect(),
                requests: Mutex::new(vec![]),
            }
        }

        fn requests(&self) -> Vec<usize> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl DeploymentPageSource for SyntheticFeed {
        async fn fetch_deployments(
            &self,
            _repo: &Repo,
            _environments: &[String],
            page_size: usize,
            cursor: Option<&str>,
        ) -> Result<DeploymentPage, GitHubError> {
            self.requests.lock().unwrap().push(page_size);

            let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (start + page_size).min(self.deployments.len());
            Ok(DeploymentPage {
                deployments: self.deployments[start..end].to_vec(),
                has_next_page: end < self.deployments.len(),
                end_cursor: Some(end.to_string()),
            })
        }
    }

    fn repo() -> Repo {
        Repo::new("hackebrot", "turtle")
    }

    #[tokio::test]
    async fn test_page_size_doubles_and_respects_budget() {
        let feed = SyntheticFeed::new(100);
        let cancel = CancellationToken::new();

        let (matched, previous) = locate_deployment(&feed, &repo(), "stage", &sha(45), 50, &cancel)
            .await
            .unwrap();

        assert_eq!(matched.description, "Deployment45");
        assert_eq!(previous.description, "Deployment46");
        assert_eq!(feed.requests(), vec![10, 20, 20]);
    }

    #[tokio::test]
    async fn test_small_budget_caps_second_page() {
        let feed = SyntheticFeed::new(100);
        let cancel = CancellationToken::new();

        let err = locate_deployment(&feed, &repo(), "stage", "nothere", 15, &cancel)
            .await
            .unwrap_err();

        assert_eq!(feed.requests(), vec![10, 5]);
        assert!(matches!(
            err,
            GitHubError::DeploymentNotFound {
                search_limit: Some(15),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_page_size_capped_at_upstream_limit() {
        let feed = SyntheticFeed::new(1000);
        let cancel = CancellationToken::new();

        let err = locate_deployment(&feed, &repo(), "stage", "nothere", 500, &cancel)
            .await
            .unwrap_err();

        assert_eq!(feed.requests(), vec![10, 20, 40, 80, 100, 100, 100, 50]);
        assert_eq!(
            err.to_string(),
            "search limit 500 reached, no deployment found for SHA nothere in stage"
        );
    }

    #[tokio::test]
    async fn test_initial_page_size_bounded_by_budget() {
        let feed = SyntheticFeed::new(10);
        let cancel = CancellationToken::new();

        let (matched, previous) = locate_deployment(&feed, &repo(), "stage", &sha(0), 3, &cancel)
            .await
            .unwrap();

        assert_eq!(feed.requests(), vec![3]);
        assert_eq!(matched.description, "Deployment0");
        assert_eq!(previous.description, "Deployment1");
    }

    #[tokio::test]
    async fn test_predecessor_found_across_page_boundary() {
        let feed = SyntheticFeed::new(30);
        let cancel = CancellationToken::new();

        let (matched, previous) = locate_deployment(&feed, &repo(), "stage", &sha(9), 30, &cancel)
            .await
            .unwrap();

        assert_eq!(matched.description, "Deployment9");
        assert_eq!(previous.description, "Deployment10");
        assert_eq!(feed.requests(), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_matches_abbreviated_sha() {
        let feed = SyntheticFeed::new(5);
        let cancel = CancellationToken::new();

        let (matched, _) = locate_deployment(&feed, &repo(), "stage", &sha(2)[..7], 5, &cancel)
            .await
            .unwrap();

        assert_eq!(matched.commit.sha, sha(2));
    }

    #[tokio::test]
    async fn test_match_at_budget_edge_has_no_predecessor() {
        let feed = SyntheticFeed::new(30);
        let cancel = CancellationToken::new();

        let err = locate_deployment(&feed, &repo(), "stage", &sha(9), 10, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GitHubError::PredecessorNotFound {
                search_limit: Some(10),
                ..
            }
        ));
        assert_eq!(feed.requests(), vec![10]);
    }

    #[tokio::test]
    async fn test_oldest_deployment_has_no_predecessor() {
        let feed = SyntheticFeed::new(4);
        let cancel = CancellationToken::new();

        let err = locate_deployment(&feed, &repo(), "stage", &sha(3), 10, &cancel)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            format!(
                "found deployment but no previous deployment for SHA {} in stage",
                sha(3)
            )
        );
    }

    #[tokio::test]
    async fn test_zero_budget_makes_no_request() {
        let feed = SyntheticFeed::new(4);
        let cancel = CancellationToken::new();

        let err = locate_deployment(&feed, &repo(), "stage", &sha(0), 0, &cancel)
            .await
            .unwrap_err();

        assert!(feed.requests().is_empty());
        assert!(matches!(err, GitHubError::DeploymentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_search_stops_before_first_page() {
        let feed = SyntheticFeed::new(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = locate_deployment(&feed, &repo(), "stage", &sha(0), 10, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, GitHubError::Cancelled));
        assert!(feed.requests().is_empty());
    }

    proptest! {
        #[test]
        fn prop_requests_stay_within_budget(
            search_limit in 1usize..400,
            feed_len in 0usize..500,
            target in proptest::option::of(0usize..500),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let feed = SyntheticFeed::new(feed_len);
            let cancel = CancellationToken::new();
            let target = target.map(sha).unwrap_or_else(|| "absent".to_string());

            let _ = runtime.block_on(locate_deployment(
                &feed, &repo(), "stage", &target, search_limit, &cancel,
            ));

            let requests = feed.requests();
            prop_assert!(requests.iter().all(|&size| (1..=MAX_PAGE_SIZE).contains(&size)));
            prop_assert!(requests.iter().sum::<usize>() <= search_limit);

            let mut scanned = 0;
            for size in requests {
                prop_assert!(size <= search_limit - scanned);
                scanned += size;
            }
        }
    }
}
