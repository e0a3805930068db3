use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bluesky_client::{BlueskyClient, DEFAULT_BASE_URL};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use post_sampler::{Collaborators, Credentials, QuerySource, Sampler, SamplerConfig, WindowSpan};

const DEFAULT_QUERY: &str = "climatechange";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WindowArg {
    /// From the random start to the end of that hour
    Hour,
    /// From the random start to the end of that day
    Day,
}

#[derive(Parser)]
#[command(name = "post-sampler")]
#[command(about = "Randomly sample posts per day into monthly JSON files")]
#[command(version)]
struct Cli {
    /// First day to sample (inclusive, YYYY-MM-DD)
    #[arg(long)]
    start: NaiveDate,

    /// Last day to sample (inclusive, YYYY-MM-DD)
    #[arg(long)]
    end: NaiveDate,

    /// Fixed search term for every probe [default: climatechange]
    #[arg(long, conflicts_with_all = ["vocabulary", "stopwords"])]
    query: Option<String>,

    /// Draw each probe's term from this word list (one per line)
    #[arg(long, conflicts_with = "stopwords")]
    vocabulary: Option<PathBuf>,

    /// Draw each probe's term from the built-in English stop words
    #[arg(long)]
    stopwords: bool,

    /// Post language filter
    #[arg(long, default_value = "en")]
    lang: String,

    /// Probes per day
    #[arg(long, default_value_t = 10)]
    probes_per_day: u32,

    /// Stop probing a day once this many posts were saved
    #[arg(long)]
    target_per_day: Option<u32>,

    /// Results requested per call (only the first is used)
    #[arg(long, default_value_t = 1)]
    limit_per_call: u32,

    /// Attempts per window before it is abandoned
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Refresh the token when fewer than this many seconds remain
    #[arg(long, default_value_t = 300)]
    token_margin: u64,

    /// Per-call search timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Window length after the random start
    #[arg(long, value_enum, default_value_t = WindowArg::Hour)]
    window: WindowArg,

    /// Drop candidates not created on the probed day
    #[arg(long)]
    require_in_day: bool,

    /// Output directory
    #[arg(long, default_value = "./dataset")]
    out_dir: PathBuf,

    /// Output file prefix ({prefix}_{YYYY-MM}.json)
    #[arg(long, default_value = "bluesky")]
    prefix: String,

    /// Seed for a reproducible sample
    #[arg(long)]
    seed: Option<u64>,

    /// XRPC base URL
    #[arg(long, env = "BLUESKY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "BLUESKY_USER")]
    user: String,

    #[arg(long, env = "BLUESKY_PASS", hide_env_values = true)]
    password: String,
}

impl Cli {
    fn into_config(self) -> Result<SamplerConfig> {
        let query = if self.stopwords {
            QuerySource::english_stopwords()
        } else if let Some(path) = &self.vocabulary {
            QuerySource::from_word_list(path)?
        } else {
            QuerySource::fixed(self.query.as_deref().unwrap_or(DEFAULT_QUERY))?
        };

        Ok(SamplerConfig {
            start: self.start,
            end: self.end,
            query,
            lang: self.lang,
            probes_per_day: self.probes_per_day,
            target_per_day: self.target_per_day,
            limit_per_call: self.limit_per_call,
            window_span: match self.window {
                WindowArg::Hour => WindowSpan::HourCeiling,
                WindowArg::Day => WindowSpan::EndOfDay,
            },
            require_in_day: self.require_in_day,
            seed: self.seed,
            base_url: self.base_url,
            max_retries: self.max_retries,
            token_margin: Duration::from_secs(self.token_margin),
            request_timeout: Duration::from_secs(self.timeout),
            credentials: Credentials::new(self.user, self.password),
            out_dir: self.out_dir,
            file_prefix: self.prefix,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("post_sampler=info".parse()?),
        )
        .init();

    let config = Cli::parse().into_config()?;
    config.log_redacted();

    let client = Arc::new(BlueskyClient::new(&config.base_url, config.request_timeout));
    let mut sampler = Sampler::new(config, Collaborators::live(client))?;
    let summary = sampler.run().await?;

    info!(
        files = summary.files.len(),
        saved = summary.saved,
        duplicates = summary.duplicates,
        empty = summary.empty,
        abandoned = summary.abandoned,
        "Done"
    );
    Ok(())
}
