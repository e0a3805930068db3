use std::time::Duration;

use bluesky_client::SearchOutcome;
use serde_json::Value;

use crate::rate_limit::RateLimitAdvisor;

/// Attempts per window unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What to do after one search call.
#[derive(Debug, Clone)]
pub enum Decision {
    Accept(Vec<Value>),
    /// Sleep for `wait`, then call again.
    RetryAfter { wait: Duration, reason: String },
    /// Give up on this window. `wait` is still honoured before moving on so the
    /// next window doesn't walk straight back into a throttled bucket.
    Abandon {
        wait: Option<Duration>,
        reason: String,
    },
}

/// Classifies a call outcome and decides wait, retry or abandonment.
/// Pure: it never sleeps and never issues calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    advisor: RateLimitAdvisor,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            advisor: RateLimitAdvisor::default(),
        }
    }

    pub fn with_advisor(mut self, advisor: RateLimitAdvisor) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another call is allowed after zero-based `attempt` failed.
    pub fn has_budget(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Server-error backoff: 1s, 2s, 4s, ...
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
    }

    pub fn decide(&self, outcome: SearchOutcome, attempt: u32, now_epoch: i64) -> Decision {
        match outcome {
            SearchOutcome::Success(posts) => Decision::Accept(posts),

            SearchOutcome::RateLimited { status, info } => {
                let wait = self.advisor.advise(&info, now_epoch);
                let reason = format!("{status} rate limited");
                if self.has_budget(attempt) {
                    Decision::RetryAfter { wait, reason }
                } else {
                    Decision::Abandon {
                        wait: Some(wait),
                        reason,
                    }
                }
            }

            SearchOutcome::ServerError { status, reason } => {
                let reason = format!("{status} {reason}");
                if self.has_budget(attempt) {
                    Decision::RetryAfter {
                        wait: Self::backoff(attempt),
                        reason,
                    }
                } else {
                    Decision::Abandon { wait: None, reason }
                }
            }

            SearchOutcome::ClientError { status, reason } => Decision::Abandon {
                wait: None,
                reason: format!("{status} {reason}"),
            },

            SearchOutcome::Network(message) => Decision::Abandon {
                wait: None,
                reason: message,
            },
        }
    }
}
