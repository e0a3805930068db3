use thiserror::Error;

use crate::session::SessionError;

/// Result type alias for sampler operations.
pub type Result<T> = std::result::Result<T, SamplerError>;

/// Errors that end a sampling run. Everything window-scoped is logged and
/// swallowed inside the loop instead.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
