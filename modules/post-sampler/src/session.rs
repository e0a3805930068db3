//! Bearer credential lifecycle: create, refresh, reissue.
//!
//! Unauthenticated → Active → (near expiry) → Refreshing → Active, with
//! Refreshing → Authenticating → Active whenever the refresh token is rejected.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bluesky_client::{BlueskyError, SessionTokens};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::traits::{Clock, SessionBackend};

/// Lifetime assumed for an access token whose `exp` claim can't be read.
pub const FALLBACK_TOKEN_LIFETIME: Duration = Duration::from_secs(7200);

#[derive(Debug, Error)]
pub enum SessionError {
    /// No session could be obtained at all. Ends the run.
    #[error("Session creation failed: {0}")]
    Create(#[source] BlueskyError),

    /// Refresh failed for a reason other than a rejected refresh token.
    #[error("Session refresh failed: {0}")]
    Refresh(#[source] BlueskyError),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Create(_))
    }
}

/// Primary login credential. Debug output never shows the password.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// A ready-to-send `Authorization` value.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader(String);

impl AuthHeader {
    pub fn bearer(token: &str) -> Self {
        Self(token.to_string())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthHeader(Bearer [redacted])")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Active,
    Refreshing,
    Authenticating,
}

struct Session {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
}

pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    clock: Arc<dyn Clock>,
    credentials: Credentials,
    margin: Duration,
    session: Option<Session>,
    state: SessionState,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        clock: Arc<dyn Clock>,
        credentials: Credentials,
        margin: Duration,
    ) -> Self {
        Self {
            backend,
            clock,
            credentials,
            margin,
            session: None,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Epoch seconds at which the current access token expires.
    pub fn expires_at(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.expires_at)
    }

    /// True when the access token has no more than `margin` seconds left.
    /// With no session at all there is nothing valid to use.
    pub fn is_near_expiry(&self, now: i64) -> bool {
        match &self.session {
            Some(session) => session.expires_at - now <= self.margin.as_secs() as i64,
            None => true,
        }
    }

    /// Return a usable bearer header, creating or refreshing the session first
    /// when needed. Call before every request.
    pub async fn ensure_valid(&mut self) -> Result<AuthHeader, SessionError> {
        let now = self.clock.epoch_secs();
        match &self.session {
            Some(session) if !self.is_near_expiry(now) => {
                Ok(AuthHeader::bearer(&session.access_token))
            }
            Some(_) => self.refresh().await,
            None => self.create().await,
        }
    }

    /// Log in with the primary credential.
    pub async fn create(&mut self) -> Result<AuthHeader, SessionError> {
        self.transition(SessionState::Authenticating);

        let result = self
            .backend
            .create_session(&self.credentials.identifier, &self.credentials.password)
            .await;
        match result {
            Ok(tokens) => Ok(self.install(tokens, None)),
            Err(e) => {
                self.session = None;
                self.transition(SessionState::Unauthenticated);
                Err(SessionError::Create(e))
            }
        }
    }

    /// Swap the refresh token for a new pair. Falls back to a full login when
    /// there is no refresh token or the server rejects it.
    pub async fn refresh(&mut self) -> Result<AuthHeader, SessionError> {
        let refresh_token = match self.session.as_ref().and_then(|s| s.refresh_token.clone()) {
            Some(token) => token,
            None => {
                debug!("No refresh token held, creating a new session");
                return self.create().await;
            }
        };

        self.transition(SessionState::Refreshing);
        let result = self.backend.refresh_session(&refresh_token).await;
        match result {
            Ok(tokens) => Ok(self.install(tokens, Some(refresh_token))),
            Err(e) if e.is_unauthorized() => {
                warn!("Refresh token rejected, re-authenticating");
                self.create().await
            }
            Err(e) => {
                self.transition(SessionState::Active);
                Err(SessionError::Refresh(e))
            }
        }
    }

    fn install(&mut self, tokens: SessionTokens, previous_refresh: Option<String>) -> AuthHeader {
        let expires_at = jwt_expiry(&tokens.access_jwt).unwrap_or_else(|| {
            debug!("Access token carries no readable exp claim, assuming fallback lifetime");
            self.clock.epoch_secs() + FALLBACK_TOKEN_LIFETIME.as_secs() as i64
        });

        let header = AuthHeader::bearer(&tokens.access_jwt);
        self.session = Some(Session {
            access_token: tokens.access_jwt,
            refresh_token: tokens.refresh_jwt.or(previous_refresh),
            expires_at,
        });
        self.transition(SessionState::Active);
        info!(expires_at, "Session active");
        header
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Session state change");
            self.state = next;
        }
    }
}

/// Read the `exp` claim (epoch seconds) out of a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_f64().map(|exp| exp as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jwt_with_exp, tokens, FixedClock, MockBackend};

    const NOW: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z
    const MARGIN: Duration = Duration::from_secs(300);

    fn manager(backend: &Arc<MockBackend>, clock: &Arc<FixedClock>) -> SessionManager {
        SessionManager::new(
            backend.clone(),
            clock.clone(),
            Credentials::new("alice.example", "hunter2"),
            MARGIN,
        )
    }

    #[test]
    fn expiry_decoded_from_token_claim() {
        assert_eq!(jwt_expiry(&jwt_with_exp(NOW + 3600)), Some(NOW + 3600));
    }

    #[test]
    fn expiry_tolerates_padded_payload() {
        let token = jwt_with_exp(NOW);
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        parts[1].push_str("==");
        assert_eq!(jwt_expiry(&parts.join(".")), Some(NOW));
    }

    #[test]
    fn undecodable_tokens_have_no_expiry() {
        assert_eq!(jwt_expiry("not-a-jwt"), None);
        assert_eq!(jwt_expiry("a.%%%.c"), None);
        assert_eq!(jwt_expiry("a.b.c.d"), None);
    }

    #[tokio::test]
    async fn first_call_creates_session() {
        let backend = Arc::new(MockBackend::new().on_create(Ok(tokens(NOW + 7200, "r1"))));
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        assert_eq!(sessions.state(), SessionState::Unauthenticated);
        let header = sessions.ensure_valid().await.unwrap();

        assert!(header.value().starts_with("Bearer "));
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(sessions.state(), SessionState::Active);
        assert_eq!(sessions.expires_at(), Some(NOW + 7200));
    }

    #[tokio::test]
    async fn valid_token_is_reused_without_calls() {
        let backend = Arc::new(MockBackend::new().on_create(Ok(tokens(NOW + 7200, "r1"))));
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        let first = sessions.ensure_valid().await.unwrap();
        clock.advance(Duration::from_secs(3600));
        let second = sessions.ensure_valid().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn near_expiry_triggers_exactly_one_refresh() {
        let backend = Arc::new(
            MockBackend::new()
                .on_create(Ok(tokens(NOW + 7200, "r1")))
                .on_refresh(Ok(tokens(NOW + 14_400, "r2"))),
        );
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);
        let original = sessions.ensure_valid().await.unwrap();

        // Exactly at the margin counts as near expiry.
        clock.set(NOW + 7200 - 300);
        assert!(sessions.is_near_expiry(clock.epoch_secs()));
        let refreshed = sessions.ensure_valid().await.unwrap();

        assert_ne!(original, refreshed);
        assert_eq!(refreshed.token(), jwt_with_exp(NOW + 14_400));
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(backend.last_refresh_token().as_deref(), Some("r1"));
        assert_eq!(sessions.expires_at(), Some(NOW + 14_400));
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_none_returned() {
        let backend = Arc::new(
            MockBackend::new()
                .on_create(Ok(tokens(NOW + 600, "r1")))
                .on_refresh(Ok(SessionTokens {
                    access_jwt: jwt_with_exp(NOW + 900),
                    refresh_jwt: None,
                }))
                .on_refresh(Ok(tokens(NOW + 7200, "r2"))),
        );
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        sessions.ensure_valid().await.unwrap();
        clock.set(NOW + 400);
        sessions.ensure_valid().await.unwrap();
        clock.set(NOW + 700);
        sessions.ensure_valid().await.unwrap();

        assert_eq!(backend.refresh_calls(), 2);
        assert_eq!(backend.last_refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn unauthorized_refresh_falls_back_to_one_create() {
        let backend = Arc::new(
            MockBackend::new()
                .on_create(Ok(tokens(NOW + 600, "r1")))
                .on_refresh(Err(BlueskyError::Api {
                    status: 401,
                    message: "ExpiredToken".into(),
                }))
                .on_create(Ok(tokens(NOW + 7200, "r2"))),
        );
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        sessions.ensure_valid().await.unwrap();
        clock.set(NOW + 500);
        let header = sessions.ensure_valid().await.unwrap();

        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(backend.create_calls(), 2);
        assert_eq!(header.token(), jwt_with_exp(NOW + 7200));
        assert_eq!(sessions.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn missing_refresh_token_creates_instead_of_refreshing() {
        let backend = Arc::new(
            MockBackend::new()
                .on_create(Ok(SessionTokens {
                    access_jwt: jwt_with_exp(NOW + 600),
                    refresh_jwt: None,
                }))
                .on_create(Ok(tokens(NOW + 7200, "r1"))),
        );
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        sessions.ensure_valid().await.unwrap();
        clock.set(NOW + 400);
        sessions.ensure_valid().await.unwrap();

        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(backend.create_calls(), 2);
    }

    #[tokio::test]
    async fn other_refresh_failures_are_not_fatal() {
        let backend = Arc::new(
            MockBackend::new()
                .on_create(Ok(tokens(NOW + 600, "r1")))
                .on_refresh(Err(BlueskyError::Api {
                    status: 502,
                    message: "Bad Gateway".into(),
                })),
        );
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        sessions.ensure_valid().await.unwrap();
        clock.set(NOW + 400);
        let err = sessions.ensure_valid().await.unwrap_err();

        assert!(matches!(err, SessionError::Refresh(_)));
        assert!(!err.is_fatal());
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn create_failure_is_fatal() {
        let backend = Arc::new(
            MockBackend::new().on_create(Err(BlueskyError::Network("connection refused".into()))),
        );
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        let err = sessions.ensure_valid().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(sessions.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn unreadable_claim_uses_fallback_lifetime() {
        let backend = Arc::new(MockBackend::new().on_create(Ok(SessionTokens {
            access_jwt: "opaque-token".into(),
            refresh_jwt: Some("r1".into()),
        })));
        let clock = Arc::new(FixedClock::at(NOW));
        let mut sessions = manager(&backend, &clock);

        sessions.ensure_valid().await.unwrap();
        assert_eq!(sessions.expires_at(), Some(NOW + 7200));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(!creds.contains("hunter2"));
        let header = format!("{:?}", AuthHeader::bearer("secret-token"));
        assert!(!header.contains("secret-token"));
    }
}
