use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire format for `since`/`until` search bounds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// --- Session types ---

/// Input for com.atproto.server.createSession.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionInput {
    pub identifier: String,
    pub password: String,
}

/// Token pair returned by createSession / refreshSession.
/// refreshSession may omit the refresh token, in which case the caller keeps its old one.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionTokens {
    #[serde(rename = "accessJwt")]
    pub access_jwt: String,
    #[serde(rename = "refreshJwt", default)]
    pub refresh_jwt: Option<String>,
}

// --- Search types ---

/// Parameters for app.bsky.feed.searchPosts.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub q: String,
    pub lang: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub limit: u32,
}

impl SearchQuery {
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.q.clone()),
            ("lang", self.lang.clone()),
            ("since", self.since.format(TIMESTAMP_FORMAT).to_string()),
            ("until", self.until.format(TIMESTAMP_FORMAT).to_string()),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// Response body of app.bsky.feed.searchPosts. Posts stay opaque.
/// `posts` may be absent or `null`; both mean no results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPostsResponse {
    #[serde(default)]
    pub posts: Option<Vec<Value>>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Raw rate-limit metadata copied off a throttled response.
/// Values are left unparsed; interpreting them is the caller's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// `Retry-After`, in seconds.
    pub retry_after: Option<String>,
    /// `ratelimit-reset`, absolute epoch seconds when the bucket refills.
    pub reset: Option<String>,
}

/// Tagged result of a single search call.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Success(Vec<Value>),
    RateLimited {
        status: u16,
        info: RateLimitInfo,
    },
    ServerError {
        status: u16,
        reason: String,
    },
    ClientError {
        status: u16,
        reason: String,
    },
    Network(String),
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success(_))
    }
}
