// Trait seams for the sampling engine.
//
// SessionBackend and PostSearcher stand in for the provider API, Sleeper and
// Clock for wall time. Production impls wrap BlueskyClient, tokio and chrono;
// tests swap in the mocks from `testing` so no request or sleep ever happens.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bluesky_client::{BlueskyClient, BlueskyError, SearchOutcome, SearchQuery, SessionTokens};

use crate::session::AuthHeader;

// ---------------------------------------------------------------------------
// SessionBackend
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Exchange the primary credential for a token pair.
    async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionTokens, BlueskyError>;

    /// Exchange a refresh token for a new pair. Must surface a 401 as
    /// `BlueskyError::Api { status: 401, .. }`.
    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, BlueskyError>;
}

#[async_trait]
impl SessionBackend for BlueskyClient {
    async fn create_session(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SessionTokens, BlueskyError> {
        BlueskyClient::create_session(self, identifier, password).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, BlueskyError> {
        BlueskyClient::refresh_session(self, refresh_token).await
    }
}

// ---------------------------------------------------------------------------
// PostSearcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PostSearcher: Send + Sync {
    /// Issue exactly one search call.
    async fn search(&self, auth: &AuthHeader, query: &SearchQuery) -> SearchOutcome;
}

#[async_trait]
impl PostSearcher for BlueskyClient {
    async fn search(&self, auth: &AuthHeader, query: &SearchQuery) -> SearchOutcome {
        self.search_posts(auth.token(), query).await
    }
}

// ---------------------------------------------------------------------------
// Sleeper / Clock
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
