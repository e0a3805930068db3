pub mod config;
pub mod dedup;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod sampler;
pub mod session;
pub mod traits;
pub mod vocabulary;
pub mod window;
pub mod writer;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::SamplerConfig;
pub use dedup::{DedupStore, PostIdentity};
pub use error::{Result, SamplerError};
pub use sampler::{Collaborators, RunSummary, Sampler};
pub use session::{AuthHeader, Credentials, SessionError, SessionManager, SessionState};
pub use vocabulary::QuerySource;
pub use window::{SampleWindow, WindowSampler, WindowSpan, YearMonth};
