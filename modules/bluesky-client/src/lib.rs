pub mod error;
pub mod types;

pub use error::{BlueskyError, Result};
pub use types::{
    CreateSessionInput, RateLimitInfo, SearchOutcome, SearchPostsResponse, SearchQuery,
    SessionTokens, TIMESTAMP_FORMAT,
};

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

pub const DEFAULT_BASE_URL: &str = "https://bsky.social/xrpc";

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";
const SEARCH_POSTS: &str = "app.bsky.feed.searchPosts";

/// Timeout for session endpoints. Search calls use the per-client search timeout.
const SESSION_TIMEOUT: Duration = Duration::from_secs(15);

pub struct BlueskyClient {
    client: reqwest::Client,
    base_url: String,
    search_timeout: Duration,
}

impl BlueskyClient {
    pub fn new(base_url: impl Into<String>, search_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            search_timeout,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Exchange identifier + password for a fresh token pair.
    pub async fn create_session(&self, identifier: &str, password: &str) -> Result<SessionTokens> {
        let input = CreateSessionInput {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };

        let resp = self
            .client
            .post(self.url(CREATE_SESSION))
            .timeout(SESSION_TIMEOUT)
            .json(&input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BlueskyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let tokens: SessionTokens = resp.json().await?;
        tracing::debug!("Session created");
        Ok(tokens)
    }

    /// Mint a new access token from a refresh token. A 401 means the refresh
    /// token itself is no longer accepted.
    pub async fn refresh_session(&self, refresh_jwt: &str) -> Result<SessionTokens> {
        let resp = self
            .client
            .post(self.url(REFRESH_SESSION))
            .timeout(SESSION_TIMEOUT)
            .bearer_auth(refresh_jwt)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BlueskyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let tokens: SessionTokens = resp.json().await?;
        tracing::debug!(rotated = tokens.refresh_jwt.is_some(), "Session refreshed");
        Ok(tokens)
    }

    /// Run one searchPosts call. Never fails: every HTTP or transport problem
    /// is folded into the returned outcome.
    pub async fn search_posts(&self, access_jwt: &str, query: &SearchQuery) -> SearchOutcome {
        let resp = match self
            .client
            .get(self.url(SEARCH_POSTS))
            .timeout(self.search_timeout)
            .bearer_auth(access_jwt)
            .query(&query.to_params())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return SearchOutcome::Network(e.to_string()),
        };

        let status = resp.status();
        if !status.is_success() {
            return classify_failure(status, resp.headers());
        }

        match resp.json::<SearchPostsResponse>().await {
            Ok(body) => SearchOutcome::Success(body.posts.unwrap_or_default()),
            Err(e) => SearchOutcome::Network(format!("invalid search response: {e}")),
        }
    }
}

/// Map a non-success status onto a search outcome.
/// 429 and 403 are both treated as throttling; the API uses either.
pub fn classify_failure(status: StatusCode, headers: &HeaderMap) -> SearchOutcome {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();

    match code {
        429 | 403 => SearchOutcome::RateLimited {
            status: code,
            info: rate_limit_info(headers),
        },
        500..=599 => SearchOutcome::ServerError {
            status: code,
            reason,
        },
        _ => SearchOutcome::ClientError {
            status: code,
            reason,
        },
    }
}

/// Pull the throttling headers off a response, untouched.
pub fn rate_limit_info(headers: &HeaderMap) -> RateLimitInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.trim().to_string())
    };

    RateLimitInfo {
        retry_after: header("retry-after"),
        reset: header("ratelimit-reset"),
    }
}
