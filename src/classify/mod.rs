pub mod issue;
pub mod pr;

pub use issue::classify_issue;
pub use pr::classify_pull_request;

use std::collections::HashSet;
use tracing::{debug, info, info_span, Instrument};

use crate::github::{EntityType, GitHubError, SearchClient, SearchQuery};
use crate::period::Period;
use crate::report::types::{AggregateResult, ClassifiedItem};

/// What one run looks at: an organization, optionally one author, and a window.
#[derive(Debug, Clone)]
pub struct Scope {
    pub organization: String,
    pub author: Option<String>,
    pub period: Period,
}

/// Find the merged PRs in scope, fetch each one's reviews in turn and bucket
/// them by whether a reviewer ever requested changes.
pub async fn analyze_pull_requests(
    client: &mut SearchClient,
    scope: &Scope,
) -> Result<AggregateResult, GitHubError> {
    let query = SearchQuery::merged_pull_requests(&scope.organization, scope.author.as_deref(), scope.period);
    let items = client
        .search_all(&query)
        .instrument(info_span!("search", kind = "pull_requests"))
        .await?;

    let total = items.len();
    let mut classified = Vec::with_capacity(total);
    for (index, raw) in items.into_iter().enumerate() {
        let reviews = client.reviews(&raw).await?;
        let category = classify_pull_request(&reviews);
        debug!(repo = %raw.repository, pr = raw.number, reviews = reviews.len(), category = ?category, "classified PR");
        info!("classified PR {}/{}", index + 1, total);
        classified.push(ClassifiedItem { raw, category });
    }

    Ok(AggregateResult::new(EntityType::PullRequest, scope.period, classified, 0))
}

/// Collect issues opened or closed in the window and bucket them by bug
/// label and by whether they are still open or were resolved in the window.
pub async fn analyze_issues(client: &mut SearchClient, scope: &Scope) -> Result<AggregateResult, GitHubError> {
    let organization = &scope.organization;
    let author = scope.author.as_deref();
    let created = client
        .search_all(&SearchQuery::issues_created(organization, author, scope.period))
        .instrument(info_span!("search", kind = "issues_created"))
        .await?;
    let closed = client
        .search_all(&SearchQuery::issues_closed(organization, author, scope.period))
        .instrument(info_span!("search", kind = "issues_closed"))
        .await?;

    let mut seen = HashSet::new();
    let mut classified = Vec::new();
    let mut excluded = 0;
    for raw in created.into_iter().chain(closed) {
        if !seen.insert((raw.repository.clone(), raw.number)) {
            continue;
        }
        match classify_issue(&raw, &scope.period) {
            Some(category) => classified.push(ClassifiedItem { raw, category }),
            None => {
                debug!(repo = %raw.repository, issue = raw.number, "issue outside both buckets");
                excluded += 1;
            }
        }
    }

    info!(classified = classified.len(), excluded, "classified issues");
    Ok(AggregateResult::new(EntityType::Issue, scope.period, classified, excluded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::github::transport::mock::MockTransport;
    use crate::github::types::fixtures::{issue_hit, pr_hit, search_page};
    use crate::period::parse_date;
    use crate::report::types::Category;
    use serde_json::json;
    use std::sync::Arc;

    const API: &str = "https://api.github.com";
    const SEARCH: &str = "https://api.github.com/search/issues";

    fn scope(from: &str, to: &str) -> Scope {
        Scope {
            organization: "acme".to_string(),
            author: None,
            period: Period::new(parse_date(from).unwrap(), parse_date(to).unwrap()).unwrap(),
        }
    }

    fn client(transport: &Arc<MockTransport>) -> SearchClient {
        SearchClient::new(Box::new(transport.clone()), API, SearchConfig::default())
    }

    fn reviews_url(number: u64) -> String {
        format!("https://api.github.com/repos/acme/widgets/pulls/{}/reviews", number)
    }

    #[tokio::test]
    async fn test_pull_request_scenario() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            SEARCH,
            search_page(
                3,
                vec![
                    pr_hit(42, "acme/widgets"),
                    pr_hit(43, "acme/widgets"),
                    pr_hit(44, "acme/widgets"),
                ],
            ),
        );
        transport.push_json(
            &reviews_url(42),
            json!([
                { "state": "CHANGES_REQUESTED", "submitted_at": "2024-02-01T10:00:00Z" },
                { "state": "APPROVED", "submitted_at": "2024-02-02T10:00:00Z" }
            ]),
        );
        transport.push_json(
            &reviews_url(43),
            json!([{ "state": "APPROVED", "submitted_at": "2024-02-01T10:00:00Z" }]),
        );
        transport.push_json(&reviews_url(44), json!([]));

        let mut client = client(&transport);
        let result = analyze_pull_requests(&mut client, &scope("2024-01-01", "2024-03-31"))
            .await
            .unwrap();

        assert_eq!(result.entity(), EntityType::PullRequest);
        assert_eq!(result.count(Category::RejectedThenApproved), 1);
        assert_eq!(result.count(Category::CleanApproval), 2);
        assert_eq!(result.items(Category::RejectedThenApproved)[0].raw.number, 42);
        let clean: Vec<u64> = result
            .items(Category::CleanApproval)
            .iter()
            .map(|i| i.raw.number)
            .collect();
        assert_eq!(clean, vec![43, 44]);
        // one search plus one review fetch per PR, in order
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls[1..], [reviews_url(42), reviews_url(43), reviews_url(44)]);
    }

    #[tokio::test]
    async fn test_review_fetch_failure_aborts_run() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(SEARCH, search_page(2, vec![pr_hit(1, "acme/widgets"), pr_hit(2, "acme/widgets")]));
        transport.push_json(&reviews_url(1), json!([]));
        // no reviews queued for #2: the mock answers 404

        let mut client = client(&transport);
        let err = analyze_pull_requests(&mut client, &scope("2024-01-01", "2024-03-31"))
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::UnexpectedStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_every_pull_request_lands_in_exactly_one_bucket() {
        let transport = Arc::new(MockTransport::new());
        let hits: Vec<_> = (1..=6).map(|n| pr_hit(n, "acme/widgets")).collect();
        transport.push_json(SEARCH, search_page(6, hits));
        for n in 1..=6u64 {
            let state = if n % 2 == 0 { "CHANGES_REQUESTED" } else { "COMMENTED" };
            transport.push_json(
                &reviews_url(n),
                json!([{ "state": state, "submitted_at": "2024-02-01T10:00:00Z" }]),
            );
        }

        let mut client = client(&transport);
        let result = analyze_pull_requests(&mut client, &scope("2024-01-01", "2024-03-31"))
            .await
            .unwrap();

        assert_eq!(result.total(), 6);
        let mut numbers: Vec<u64> = result
            .buckets()
            .flat_map(|(_, items)| items.iter().map(|i| i.raw.number))
            .collect();
        numbers.sort();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_issue_buckets() {
        let transport = Arc::new(MockTransport::new());
        // created in window
        transport.push_json(
            SEARCH,
            search_page(
                4,
                vec![
                    issue_hit(1, "open", "2024-04-01T00:00:00Z", None, &["bug"]),
                    issue_hit(2, "open", "2024-04-02T00:00:00Z", None, &["feature"]),
                    issue_hit(3, "closed", "2024-04-03T00:00:00Z", Some("2024-04-04T00:00:00Z"), &["bug"]),
                    issue_hit(4, "closed", "2024-12-30T00:00:00Z", Some("2025-01-10T00:00:00Z"), &[]),
                ],
            ),
        );
        // closed in window
        transport.push_json(
            SEARCH,
            search_page(
                2,
                vec![
                    issue_hit(3, "closed", "2024-04-03T00:00:00Z", Some("2024-04-04T00:00:00Z"), &["bug"]),
                    issue_hit(5, "closed", "2024-01-05T00:00:00Z", Some("2024-06-01T00:00:00Z"), &[]),
                ],
            ),
        );

        let mut client = client(&transport);
        let result = analyze_issues(&mut client, &scope("2024-03-01", "2024-12-31"))
            .await
            .unwrap();

        assert_eq!(result.entity(), EntityType::Issue);
        assert_eq!(result.count(Category::BugOpen), 1);
        assert_eq!(result.count(Category::NonBugOpen), 1);
        assert_eq!(result.count(Category::BugResolved), 1);
        assert_eq!(result.count(Category::NonBugResolved), 1);
        assert_eq!(result.items(Category::NonBugResolved)[0].raw.number, 5);
        assert_eq!(result.excluded(), 1);
        assert_eq!(result.total(), 4);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].param("q"),
            Some("org:acme is:issue created:2024-03-01..2024-12-31")
        );
        assert_eq!(
            requests[1].param("q"),
            Some("org:acme is:issue closed:2024-03-01..2024-12-31")
        );
    }
}
