//! The sampling run: months → days → random-window probes.
//!
//! Exactly one search call is in flight at a time. Per probe only the first
//! returned post is considered; later results are ignored. Only a failure to
//! obtain a session at all escapes `run`; everything else is contained to the
//! window it happened in.

use std::path::PathBuf;
use std::sync::Arc;

use bluesky_client::{BlueskyClient, SearchQuery};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SamplerConfig;
use crate::dedup::{post_created_at, DedupStore};
use crate::error::{Result, SamplerError};
use crate::retry::{Decision, RetryPolicy};
use crate::session::SessionManager;
use crate::traits::{Clock, PostSearcher, SessionBackend, Sleeper, SystemClock, TokioSleeper};
use crate::window::{months_between, MonthSpan, SampleWindow, WindowSampler};
use crate::writer::{MonthlyOutput, ResultWriter};

/// External collaborators of a run.
pub struct Collaborators {
    pub backend: Arc<dyn SessionBackend>,
    pub searcher: Arc<dyn PostSearcher>,
    pub sleeper: Arc<dyn Sleeper>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Real network, real sleeps, wall-clock time.
    pub fn live(client: Arc<BlueskyClient>) -> Self {
        Self {
            backend: client.clone(),
            searcher: client,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub months: usize,
    pub days: usize,
    pub probes: u64,
    pub saved: u64,
    pub duplicates: u64,
    pub empty: u64,
    pub out_of_day: u64,
    pub abandoned: u64,
    pub files: Vec<PathBuf>,
}

enum ProbeResult {
    Saved,
    Skipped,
}

pub struct Sampler {
    config: SamplerConfig,
    session: SessionManager,
    searcher: Arc<dyn PostSearcher>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    windows: WindowSampler,
    dedup: DedupStore,
    writer: ResultWriter,
    rng: StdRng,
    summary: RunSummary,
}

impl Sampler {
    pub fn new(config: SamplerConfig, deps: Collaborators) -> Result<Self> {
        config.validate()?;

        let session = SessionManager::new(
            deps.backend,
            deps.clock.clone(),
            config.credentials.clone(),
            config.token_margin,
        );
        let writer = ResultWriter::new(&config.out_dir, &config.file_prefix)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            policy: RetryPolicy::new(config.max_retries),
            windows: WindowSampler::new(config.window_span),
            session,
            searcher: deps.searcher,
            sleeper: deps.sleeper,
            clock: deps.clock,
            dedup: DedupStore::new(),
            writer,
            rng,
            summary: RunSummary::default(),
            config,
        })
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Sample every month of the configured range.
    pub async fn run(&mut self) -> Result<RunSummary> {
        // Log in up front so bad credentials fail before any file is opened.
        self.session.ensure_valid().await?;

        let (start, end) = (self.config.start, self.config.end);
        for month in months_between(start, end) {
            let Some(span) = MonthSpan::clip(month, start, end) else {
                continue;
            };
            self.sample_month(&span).await?;
        }

        info!(
            months = self.summary.months,
            probes = self.summary.probes,
            saved = self.summary.saved,
            duplicates = self.summary.duplicates,
            abandoned = self.summary.abandoned,
            "Sampling run complete"
        );
        Ok(self.summary.clone())
    }

    async fn sample_month(&mut self, span: &MonthSpan) -> Result<()> {
        info!(month = %span.month, first = %span.first, last = %span.last, "Sampling posts");
        let mut output = self.writer.open_month(span.month)?;

        for day in span.days() {
            let saved = match self.sample_day(day, &mut output).await {
                Ok(saved) => saved,
                Err(e) => {
                    keep_interrupted(output, &e);
                    return Err(e);
                }
            };
            self.summary.days += 1;
            info!(%day, saved, "{saved} unique posts for day {day}");
        }

        let count = output.count();
        let path = output.finish()?;
        info!(path = %path.display(), count, "Saved monthly output");
        self.summary.months += 1;
        self.summary.files.push(path);
        Ok(())
    }

    async fn sample_day(&mut self, day: NaiveDate, output: &mut MonthlyOutput) -> Result<u32> {
        let mut saved = 0;
        for _ in 0..self.config.probes_per_day {
            if self.config.target_per_day.is_some_and(|target| saved >= target) {
                debug!(%day, saved, "Daily target reached");
                break;
            }
            if let ProbeResult::Saved = self.probe(day, output).await? {
                saved += 1;
            }
        }
        Ok(saved)
    }

    async fn probe(&mut self, day: NaiveDate, output: &mut MonthlyOutput) -> Result<ProbeResult> {
        let window = self.windows.draw(day, &mut self.rng);
        let term = self.config.query.pick(&mut self.rng).to_string();
        let query = self.build_query(term, &window);
        self.summary.probes += 1;

        let Some(posts) = self.fetch(&query).await? else {
            self.summary.abandoned += 1;
            return Ok(ProbeResult::Skipped);
        };

        let Some(candidate) = posts.into_iter().next().filter(|p| !is_blank(p)) else {
            debug!(since = %window.start(), until = %window.end(), "No post in window");
            self.summary.empty += 1;
            return Ok(ProbeResult::Skipped);
        };

        if self.config.require_in_day && !created_on(&candidate, day) {
            debug!(%day, "Candidate created outside the probed day, skipping");
            self.summary.out_of_day += 1;
            return Ok(ProbeResult::Skipped);
        }

        if !self.dedup.accept(&candidate) {
            debug!("Duplicate or identity-less candidate, skipping");
            self.summary.duplicates += 1;
            return Ok(ProbeResult::Skipped);
        }

        output.append(&candidate)?;
        self.summary.saved += 1;
        Ok(ProbeResult::Saved)
    }

    fn build_query(&self, term: String, window: &SampleWindow) -> SearchQuery {
        SearchQuery {
            q: term,
            lang: self.config.lang.clone(),
            since: window.start(),
            until: window.end(),
            limit: self.config.limit_per_call,
        }
    }

    /// Run the attempt loop for one window. `Ok(None)` means the window was
    /// abandoned; `Err` only for a fatal session failure.
    async fn fetch(&mut self, query: &SearchQuery) -> Result<Option<Vec<Value>>> {
        let mut attempt = 0;
        loop {
            let auth = match self.session.ensure_valid().await {
                Ok(auth) => auth,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        error = %e,
                        q = query.q.as_str(),
                        "Session refresh failed; skipping window"
                    );
                    return Ok(None);
                }
            };

            let outcome = self.searcher.search(&auth, query).await;
            match self.policy.decide(outcome, attempt, self.clock.epoch_secs()) {
                Decision::Accept(posts) => return Ok(Some(posts)),
                Decision::RetryAfter { wait, reason } => {
                    info!(
                        %reason,
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs(),
                        "Backing off before retry"
                    );
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
                Decision::Abandon { wait, reason } => {
                    if let Some(wait) = wait {
                        info!(
                            %reason,
                            wait_secs = wait.as_secs(),
                            "rate-limit: sleeping before next window"
                        );
                        self.sleeper.sleep(wait).await;
                    }
                    warn!(
                        %reason,
                        attempts = attempt + 1,
                        since = %query.since,
                        until = %query.until,
                        "{reason}; skipping"
                    );
                    return Ok(None);
                }
            }
        }
    }
}

/// Keep whatever an aborted month collected, and say where it went.
fn keep_interrupted(output: MonthlyOutput, cause: &SamplerError) {
    let count = output.count();
    match output.keep_partial() {
        Ok(Some(path)) => warn!(
            path = %path.display(),
            count,
            error = %cause,
            "Run stopped mid-month; partial output kept"
        ),
        Ok(None) => warn!(error = %cause, "Run stopped mid-month; nothing saved for the month"),
        Err(e) => warn!(error = %e, count, "Failed to keep partial monthly output"),
    }
}

fn is_blank(post: &Value) -> bool {
    match post {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn created_on(post: &Value, day: NaiveDate) -> bool {
    post_created_at(post).is_some_and(|ts| ts.date_naive() == day)
}
