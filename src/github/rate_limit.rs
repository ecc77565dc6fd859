use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

use super::transport::HttpResponse;

/// Wait used when a rate-limit response carries neither Retry-After nor a reset time.
const FALLBACK_WAIT: Duration = Duration::from_secs(60);

/// Slack added on top of the reset timestamp so the retry lands after the
/// window has actually rolled over.
const RESET_SLACK: Duration = Duration::from_secs(1);

/// Quota bookkeeping for one client: the last remaining-request count and
/// reset instant the API reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    remaining: Option<u64>,
    reset_at: Option<DateTime<Utc>>,
}

impl RateLimit {
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    /// Record the `x-ratelimit-*` headers of a response.
    pub fn observe(&mut self, response: &HttpResponse) {
        if let Some(remaining) = response.header("x-ratelimit-remaining").and_then(|v| v.parse().ok()) {
            self.remaining = Some(remaining);
        }
        if let Some(reset) = response
            .header("x-ratelimit-reset")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        {
            self.reset_at = Some(reset);
        }
    }

    /// How long to hold off before the next request, if the quota is spent.
    pub fn wait_before_request(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining != Some(0) {
            return None;
        }
        self.until_reset(now)
    }

    /// Whether a response is the API refusing the call because of a rate
    /// limit (primary or secondary), as opposed to a permission problem.
    pub fn is_limited(response: &HttpResponse) -> bool {
        match response.status {
            429 => true,
            403 => {
                response.header("x-ratelimit-remaining") == Some("0")
                    || response.header("retry-after").is_some()
                    || response.body.to_ascii_lowercase().contains("rate limit")
            }
            _ => false,
        }
    }

    /// Wait after a rate-limited response: Retry-After first, then the reset
    /// clock, then a fixed fallback.
    pub fn backoff(&self, response: &HttpResponse, now: DateTime<Utc>) -> Duration {
        if let Some(secs) = response.header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
            return Duration::from_secs(secs.max(1));
        }
        self.until_reset(now).unwrap_or(FALLBACK_WAIT)
    }

    fn until_reset(&self, now: DateTime<Utc>) -> Option<Duration> {
        let reset = self.reset_at?;
        let wait = (reset - now).to_std().ok()?;
        Some(wait + RESET_SLACK)
    }
}
