use crate::github::{ItemState, RawItem};
use crate::period::Period;
use crate::report::types::Category;

pub const BUG_LABEL: &str = "bug";

/// Whether the issue carries the `bug` label, ignoring case.
pub fn has_bug_label(item: &RawItem) -> bool {
    item.labels
        .iter()
        .any(|label| label.eq_ignore_ascii_case(BUG_LABEL))
}

/// Place an issue in its bucket for the window, or `None` if it belongs to
/// no bucket.
///
/// Closure inside the window means Resolved, whatever the creation date.
/// Open means created inside the window and still open now. An issue opened
/// before the window and still open is in neither bucket, and neither is one
/// opened in the window but closed after it.
pub fn classify_issue(item: &RawItem, period: &Period) -> Option<Category> {
    let bug = has_bug_label(item);

    let resolved = item
        .closed_at
        .as_ref()
        .is_some_and(|closed| period.contains(closed));
    let open = item.state == ItemState::Open && period.contains(&item.created_at);

    match (bug, resolved, open) {
        (true, true, _) => Some(Category::BugResolved),
        (false, true, _) => Some(Category::NonBugResolved),
        (true, false, true) => Some(Category::BugOpen),
        (false, false, true) => Some(Category::NonBugOpen),
        (_, false, false) => None,
    }
}
