use crate::github::{ReviewEvent, ReviewState};
use crate::report::types::Category;

/// Classify a merged pull request from its review timeline.
///
/// Any CHANGES_REQUESTED review, wherever it sits in the sequence, marks the
/// PR as rejected; later approvals do not clear it. A PR with no reviews at
/// all counts as a clean approval.
pub fn classify_pull_request(reviews: &[ReviewEvent]) -> Category {
    let rejected = reviews
        .iter()
        .any(|review| review.state == ReviewState::ChangesRequested);

    if rejected {
        Category::RejectedThenApproved
    } else {
        Category::CleanApproval
    }
}
