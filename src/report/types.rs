use std::collections::BTreeMap;

use crate::github::{EntityType, RawItem};
use crate::period::Period;

/// Bucket an item lands in. The first two apply to pull requests, the
/// other four to issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    CleanApproval,
    RejectedThenApproved,
    BugOpen,
    BugResolved,
    NonBugOpen,
    NonBugResolved,
}

impl Category {
    pub const PULL_REQUESTS: [Category; 2] = [Category::CleanApproval, Category::RejectedThenApproved];

    pub const ISSUES: [Category; 4] = [
        Category::BugOpen,
        Category::BugResolved,
        Category::NonBugOpen,
        Category::NonBugResolved,
    ];

    /// Categories a run over the given entity type can produce.
    pub fn for_entity(entity: EntityType) -> &'static [Category] {
        match entity {
            EntityType::PullRequest => &Self::PULL_REQUESTS,
            EntityType::Issue => &Self::ISSUES,
        }
    }

    /// Stable machine key used in JSON and CSV output.
    pub fn key(&self) -> &'static str {
        match self {
            Category::CleanApproval => "clean_approval",
            Category::RejectedThenApproved => "rejected_then_approved",
            Category::BugOpen => "bug_open",
            Category::BugResolved => "bug_resolved",
            Category::NonBugOpen => "non_bug_open",
            Category::NonBugResolved => "non_bug_resolved",
        }
    }

    #[cfg(test)]
    pub fn from_key(key: &str) -> Option<Category> {
        [Self::PULL_REQUESTS.as_slice(), Self::ISSUES.as_slice()]
            .concat()
            .into_iter()
            .find(|c| c.key() == key)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Category::CleanApproval => "Approved without rejections",
            Category::RejectedThenApproved => "Rejected then approved",
            Category::BugOpen => "Open bugs",
            Category::BugResolved => "Resolved bugs",
            Category::NonBugOpen => "Open non-bugs",
            Category::NonBugResolved => "Resolved non-bugs",
        };
        f.write_str(label)
    }
}

/// A search hit together with the bucket it was assigned to.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedItem {
    pub raw: RawItem,
    pub category: Category,
}

/// Counts and per-category listings for one run. Built once from the
/// classified items and read-only afterwards.
#[derive(Debug, Clone)]
pub struct AggregateResult {
    entity: EntityType,
    period: Period,
    counts: BTreeMap<Category, usize>,
    items: BTreeMap<Category, Vec<ClassifiedItem>>,
    excluded: usize,
}

impl AggregateResult {
    /// Fold classified items into buckets, keeping the order they arrive in.
    /// Every category of the entity type is present, empty or not.
    pub fn new(
        entity: EntityType,
        period: Period,
        classified: impl IntoIterator<Item = ClassifiedItem>,
        excluded: usize,
    ) -> Self {
        let mut items: BTreeMap<Category, Vec<ClassifiedItem>> = Category::for_entity(entity)
            .iter()
            .map(|c| (*c, Vec::new()))
            .collect();
        for item in classified {
            items.entry(item.category).or_default().push(item);
        }
        let counts = items.iter().map(|(c, list)| (*c, list.len())).collect();

        Self {
            entity,
            period,
            counts,
            items,
            excluded,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn counts(&self) -> &BTreeMap<Category, usize> {
        &self.counts
    }

    pub fn count(&self, category: Category) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub fn items(&self, category: Category) -> &[ClassifiedItem] {
        self.items.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories in display order, with their items.
    pub fn buckets(&self) -> impl Iterator<Item = (Category, &[ClassifiedItem])> {
        self.items.iter().map(|(c, list)| (*c, list.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Items fetched but outside every bucket of the window.
    pub fn excluded(&self) -> usize {
        self.excluded
    }
}

/// Rendering requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}
