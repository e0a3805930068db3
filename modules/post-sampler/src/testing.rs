// Test mocks for the sampling engine.
//
// Four mocks matching the four trait boundaries:
// - MockBackend (SessionBackend): scripted create/refresh responses + call counters
// - ScriptedSearcher (PostSearcher): queued outcomes, then a fallback responder
// - RecordingSleeper (Sleeper): records requested waits, never sleeps
// - FixedClock (Clock): settable epoch seconds
//
// Plus helpers for building tokens, posts and configs.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};

use bluesky_client::{BlueskyError, SearchOutcome, SearchQuery, SessionTokens};

use crate::config::SamplerConfig;
use crate::session::{AuthHeader, Credentials};
use crate::traits::{Clock, PostSearcher, SessionBackend, Sleeper};
use crate::vocabulary::QuerySource;
use crate::window::WindowSpan;

// ---------------------------------------------------------------------------
// Token / post helpers
// ---------------------------------------------------------------------------

/// An unsigned JWT whose payload carries the given `exp` claim.
pub fn jwt_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "did:plc:test", "exp": exp }).to_string());
    format!("{header}.{payload}.signature")
}

pub fn tokens(exp: i64, refresh: &str) -> SessionTokens {
    SessionTokens {
        access_jwt: jwt_with_exp(exp),
        refresh_jwt: Some(refresh.to_string()),
    }
}

/// A minimal post record with identity and timestamp.
pub fn post(uri: &str, created_at: &str) -> Value {
    json!({
        "uri": uri,
        "cid": "bafyreitest",
        "record": { "text": "sample text", "createdAt": created_at },
        "indexedAt": created_at,
    })
}

/// A sampler config for tests: fixed query, seeded RNG, output into `out_dir`.
pub fn test_config(out_dir: &Path, start: NaiveDate, end: NaiveDate) -> SamplerConfig {
    SamplerConfig {
        start,
        end,
        query: QuerySource::Fixed("climatechange".to_string()),
        lang: "en".to_string(),
        probes_per_day: 10,
        target_per_day: None,
        limit_per_call: 1,
        max_retries: 3,
        token_margin: Duration::from_secs(300),
        request_timeout: Duration::from_secs(5),
        window_span: WindowSpan::HourCeiling,
        require_in_day: false,
        out_dir: out_dir.to_path_buf(),
        file_prefix: "bluesky".to_string(),
        seed: Some(7),
        base_url: "http://localhost".to_string(),
        credentials: Credentials::new("tester.example", "app-password"),
    }
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// Scripted session endpoints. Responses are consumed in order; an exhausted
/// script answers with a 500 so over-calling shows up as a failure.
pub struct MockBackend {
    creates: Mutex<VecDeque<Result<SessionTokens, BlueskyError>>>,
    refreshes: Mutex<VecDeque<Result<SessionTokens, BlueskyError>>>,
    create_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    last_refresh_token: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            creates: Mutex::new(VecDeque::new()),
            refreshes: Mutex::new(VecDeque::new()),
            create_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_refresh_token: Mutex::new(None),
        }
    }

    pub fn on_create(self, response: Result<SessionTokens, BlueskyError>) -> Self {
        self.creates.lock().unwrap().push_back(response);
        self
    }

    pub fn on_refresh(self, response: Result<SessionTokens, BlueskyError>) -> Self {
        self.refreshes.lock().unwrap().push_back(response);
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn unscripted() -> BlueskyError {
    BlueskyError::Api {
        status: 500,
        message: "no scripted response".to_string(),
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn create_session(
        &self,
        _identifier: &str,
        _password: &str,
    ) -> Result<SessionTokens, BlueskyError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.creates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, BlueskyError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        self.refreshes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedSearcher
// ---------------------------------------------------------------------------

type Responder = Box<dyn Fn(usize, &SearchQuery) -> SearchOutcome + Send + Sync>;

/// Answers from a queue first, then from a responder closure that receives
/// the zero-based call number. Every query is recorded.
pub struct ScriptedSearcher {
    queued: Mutex<VecDeque<SearchOutcome>>,
    responder: Responder,
    calls: AtomicUsize,
    queries: Mutex<Vec<SearchQuery>>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedSearcher {
    /// Always returns an empty result set once the queue is drained.
    pub fn new() -> Self {
        Self::with_responder(|_, _| SearchOutcome::Success(Vec::new()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(usize, &SearchQuery) -> SearchOutcome + Send + Sync + 'static,
    {
        Self {
            queued: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, outcome: SearchOutcome) -> Self {
        self.queued.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl Default for ScriptedSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostSearcher for ScriptedSearcher {
    async fn search(&self, auth: &AuthHeader, query: &SearchQuery) -> SearchOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        self.tokens.lock().unwrap().push(auth.token().to_string());
        if let Some(outcome) = self.queued.lock().unwrap().pop_front() {
            return outcome;
        }
        (self.responder)(n, query)
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper / FixedClock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub struct FixedClock {
    epoch: AtomicI64,
}

impl FixedClock {
    pub fn at(epoch: i64) -> Self {
        Self {
            epoch: AtomicI64::new(epoch),
        }
    }

    pub fn set(&self, epoch: i64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.epoch.fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}
