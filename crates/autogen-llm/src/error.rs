//! Errors raised while constructing a backend.
//!
//! Request-time failures use `autogen_core::BackendError` instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// API key contains characters not allowed in a header
    #[error("API key is not a valid header value")]
    InvalidApiKey,

    /// Model name missing
    #[error("no model configured")]
    MissingModel,
}

pub type Result<T> = std::result::Result<T, LlmError>;
