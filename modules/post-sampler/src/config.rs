use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{Result, SamplerError};
use crate::session::Credentials;
use crate::vocabulary::QuerySource;
use crate::window::WindowSpan;

/// Everything one sampling run needs. Built once, then owned by the `Sampler`.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    // Range (inclusive)
    pub start: NaiveDate,
    pub end: NaiveDate,

    // Query
    pub query: QuerySource,
    pub lang: String,

    // Sampling
    pub probes_per_day: u32,
    pub target_per_day: Option<u32>,
    pub limit_per_call: u32,
    pub window_span: WindowSpan,
    pub require_in_day: bool,
    pub seed: Option<u64>,

    // Network
    pub base_url: String,
    pub max_retries: u32,
    pub token_margin: Duration,
    pub request_timeout: Duration,
    pub credentials: Credentials,

    // Output
    pub out_dir: PathBuf,
    pub file_prefix: String,
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(SamplerError::Config(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        if self.probes_per_day == 0 {
            return Err(SamplerError::Config("probes per day must be at least 1".into()));
        }
        if self.limit_per_call == 0 {
            return Err(SamplerError::Config("limit per call must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(SamplerError::Config("retry budget must be at least 1".into()));
        }
        if self.credentials.identifier.is_empty() || self.credentials.password.is_empty() {
            return Err(SamplerError::Config("credentials are required".into()));
        }
        if self.file_prefix.is_empty() {
            return Err(SamplerError::Config("file prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Log the effective settings without the password.
    pub fn log_redacted(&self) {
        info!(
            start = %self.start,
            end = %self.end,
            query = %self.query.describe(),
            lang = self.lang.as_str(),
            probes_per_day = self.probes_per_day,
            target_per_day = ?self.target_per_day,
            limit_per_call = self.limit_per_call,
            window = ?self.window_span,
            require_in_day = self.require_in_day,
            max_retries = self.max_retries,
            token_margin_secs = self.token_margin.as_secs(),
            timeout_secs = self.request_timeout.as_secs(),
            out_dir = %self.out_dir.display(),
            user = self.credentials.identifier.as_str(),
            "Sampler configuration"
        );
    }
}
