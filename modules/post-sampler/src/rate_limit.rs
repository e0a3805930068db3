use std::time::Duration;

use bluesky_client::RateLimitInfo;

/// Wait used when a throttled response carries no usable hint.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Turns throttling headers into a wait duration. Only advises; the caller sleeps.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitAdvisor {
    default_wait: Duration,
}

impl Default for RateLimitAdvisor {
    fn default() -> Self {
        Self {
            default_wait: DEFAULT_RATE_LIMIT_WAIT,
        }
    }
}

impl RateLimitAdvisor {
    pub fn new(default_wait: Duration) -> Self {
        Self { default_wait }
    }

    /// Retry-After wins, then the bucket reset timestamp (clamped at zero),
    /// then the default.
    pub fn advise(&self, info: &RateLimitInfo, now_epoch: i64) -> Duration {
        if let Some(secs) = info.retry_after.as_deref().and_then(parse_digits) {
            return Duration::from_secs(secs);
        }

        if let Some(reset) = info.reset.as_deref().and_then(parse_digits) {
            let remaining = i128::from(reset) - i128::from(now_epoch);
            return Duration::from_secs(remaining.clamp(0, i128::from(u64::MAX)) as u64);
        }

        self.default_wait
    }
}

/// Accept only plain non-negative integers: no sign, no fraction, no HTTP-date.
fn parse_digits(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}
