//! Error taxonomy for generation requests.
//!
//! `BackendError` is what adapters return; backend-specific vocabulary stops
//! there. `GenerationError` is what callers see. Its `Display` output is for
//! logs; [`GenerationError::user_message`] is the only text meant for end
//! users and never includes backend output.

use std::time::Duration;

use thiserror::Error;

use crate::finding::{summarize, ValidationFinding, ValidationStage};

/// Maximum number of findings quoted in user-facing messages.
const USER_FINDINGS_LIMIT: usize = 5;

/// Failures reported by a generation backend adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend transport failure: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend response could not be used: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout(_) => "timeout",
            BackendError::Transport(_) => "transport",
            BackendError::Status { .. } => "status",
            BackendError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Errors in loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Errors surfaced by a generation request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("registry snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("no document could be extracted: {reason}")]
    ParseFailure { reason: String },

    #[error("validation blocked at stage {stage} with {} finding(s)", .findings.len())]
    ValidationBlocked {
        stage: ValidationStage,
        findings: Vec<ValidationFinding>,
    },

    #[error("repair attempts exhausted after {attempts} generation(s)")]
    RepairExhausted {
        attempts: u32,
        /// Findings of the last attempt; empty when it failed to parse or timed out.
        findings: Vec<ValidationFinding>,
        /// Compact description of the last failure, produced by the validators.
        last_failure: String,
    },

    #[error("generation backend timed out after {attempts} attempt(s)")]
    BackendTimeout { attempts: u32 },

    #[error("generation backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::SnapshotUnavailable(_) => "snapshot_unavailable",
            GenerationError::ParseFailure { .. } => "parse_failure",
            GenerationError::ValidationBlocked { .. } => "validation_blocked",
            GenerationError::RepairExhausted { .. } => "repair_exhausted",
            GenerationError::BackendTimeout { .. } => "backend_timeout",
            GenerationError::Backend(_) => "backend_error",
            GenerationError::Config(_) => "config",
            GenerationError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Human-readable explanation safe to show to end users.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::SnapshotUnavailable(_) => {
                "The device inventory is unavailable. Refresh the registry snapshot and try again."
                    .to_string()
            }
            GenerationError::ParseFailure { reason } => {
                format!("The generator's reply did not contain a configuration document ({reason}).")
            }
            GenerationError::ValidationBlocked { stage, findings } => format!(
                "The document failed {stage} validation:\n{}",
                summarize(findings, USER_FINDINGS_LIMIT)
            ),
            GenerationError::RepairExhausted {
                attempts,
                findings,
                last_failure,
            } => {
                let detail = if findings.is_empty() {
                    format!("- {last_failure}")
                } else {
                    summarize(findings, USER_FINDINGS_LIMIT)
                };
                format!(
                    "Could not produce a valid document after {attempts} attempt(s). Last problems:\n{detail}"
                )
            }
            GenerationError::BackendTimeout { .. } => {
                "The generation service did not respond in time. Try again later.".to_string()
            }
            GenerationError::Backend(_) => {
                "The generation service returned an error. Check its configuration and try again."
                    .to_string()
            }
            GenerationError::Config(e) => format!("Configuration problem: {e}"),
            GenerationError::InvalidRequest(reason) => format!("The request is incomplete: {reason}."),
        }
    }
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;
