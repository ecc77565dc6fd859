use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::period::Period;

/// Which kind of search hit a query enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    PullRequest,
    Issue,
}

impl EntityType {
    pub fn as_qualifier(&self) -> &'static str {
        match self {
            EntityType::PullRequest => "is:pr",
            EntityType::Issue => "is:issue",
        }
    }
}

/// Which timestamp the date range of a query applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Merged,
    Created,
    Closed,
}

impl DateField {
    fn as_str(&self) -> &'static str {
        match self {
            DateField::Merged => "merged",
            DateField::Created => "created",
            DateField::Closed => "closed",
        }
    }
}

/// A search to run against the issues search endpoint. Built once through
/// the constructors below and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    entity: EntityType,
    organization: String,
    author: Option<String>,
    date_field: DateField,
    period: Period,
}

impl SearchQuery {
    pub fn merged_pull_requests(organization: &str, author: Option<&str>, period: Period) -> Self {
        Self {
            entity: EntityType::PullRequest,
            organization: organization.to_string(),
            author: author.map(str::to_string),
            date_field: DateField::Merged,
            period,
        }
    }

    pub fn issues_created(organization: &str, author: Option<&str>, period: Period) -> Self {
        Self {
            entity: EntityType::Issue,
            organization: organization.to_string(),
            author: author.map(str::to_string),
            date_field: DateField::Created,
            period,
        }
    }

    pub fn issues_closed(organization: &str, author: Option<&str>, period: Period) -> Self {
        Self {
            entity: EntityType::Issue,
            organization: organization.to_string(),
            author: author.map(str::to_string),
            date_field: DateField::Closed,
            period,
        }
    }

    /// Render the `q=` parameter, e.g.
    /// `org:acme is:pr is:merged author:alice merged:2024-01-01..2024-03-31`.
    pub fn to_query_string(&self) -> String {
        let mut terms = vec![
            format!("org:{}", self.organization),
            self.entity.as_qualifier().to_string(),
        ];
        if self.date_field == DateField::Merged {
            terms.push("is:merged".to_string());
        }
        if let Some(author) = &self.author {
            terms.push(format!("author:{}", author));
        }
        terms.push(format!(
            "{}:{}",
            self.date_field.as_str(),
            self.period.as_range_qualifier()
        ));
        terms.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Open => write!(f, "open"),
            ItemState::Closed => write!(f, "closed"),
        }
    }
}

/// A search hit, reduced to the fields classification and reporting use.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub number: u64,
    pub title: String,
    /// Browser URL of the issue or PR
    pub url: String,
    /// `owner/repo`
    pub repository: String,
    pub state: ItemState,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub labels: Vec<String>,
    /// REST URL of the pull request, present only for PR hits
    pub pull_request_url: Option<String>,
}

impl RawItem {
    /// Merge date for PRs, close date otherwise.
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.merged_at.or(self.closed_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    #[serde(other)]
    Other,
}

/// One submitted review on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewEvent {
    pub state: ReviewState,
    /// Pending reviews have no submission time
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Wire shape of one `/search/issues` page.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    number: u64,
    title: String,
    html_url: String,
    repository_url: String,
    state: ItemState,
    created_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: Vec<LabelRef>,
    #[serde(default)]
    pull_request: Option<PullRequestRef>,
}

#[derive(Debug, Deserialize)]
struct LabelRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    url: String,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

impl TryFrom<SearchItem> for RawItem {
    type Error = String;

    fn try_from(item: SearchItem) -> Result<Self, Self::Error> {
        let repository = repository_name(&item.repository_url).ok_or_else(|| {
            format!(
                "item #{} has an unrecognised repository_url {:?}",
                item.number, item.repository_url
            )
        })?;
        let (pull_request_url, merged_at) = match item.pull_request {
            Some(pr) => (Some(pr.url), pr.merged_at),
            None => (None, None),
        };

        Ok(RawItem {
            number: item.number,
            title: item.title,
            url: item.html_url,
            repository,
            state: item.state,
            created_at: item.created_at,
            closed_at: item.closed_at,
            merged_at,
            labels: item.labels.into_iter().map(|l| l.name).collect(),
            pull_request_url,
        })
    }
}

/// `https://api.github.com/repos/acme/widgets` -> `acme/widgets`
fn repository_name(repository_url: &str) -> Option<String> {
    let (_, tail) = repository_url.split_once("/repos/")?;
    let mut parts = tail.trim_end_matches('/').split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(format!("{}/{}", owner, repo))
}
