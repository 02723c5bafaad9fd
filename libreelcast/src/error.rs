//! Error types for Reelcast
//!
//! One enum per failure kind of the repost cycle, wrapped by [`ReelcastError`].
//! Every stage-level failure aborts the current cycle only; `ConfigError` is the
//! one kind that stops the process before any cycle runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReelcastError>;

#[derive(Error, Debug)]
pub enum ReelcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Caption error: {0}")]
    Caption(#[from] CaptionError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ReelcastError {
    /// Taxonomy kind of this error, as reported in cycle outcomes
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReelcastError::Config(_) => ErrorKind::ConfigError,
            ReelcastError::Acquisition(_) => ErrorKind::AcquisitionError,
            ReelcastError::Transform(_) => ErrorKind::TransformError,
            ReelcastError::Caption(_) => ErrorKind::CaptionError,
            ReelcastError::Publish(PublishError::AuthChallenge(_)) => ErrorKind::AuthChallenge,
            ReelcastError::Publish(_) => ErrorKind::PublishError,
            ReelcastError::Persistence(_) => ErrorKind::PersistenceError,
            ReelcastError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Failure kinds surfaced in cycle outcomes and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigError,
    AcquisitionError,
    TransformError,
    CaptionError,
    PublishError,
    AuthChallenge,
    PersistenceError,
    InvalidInput,
}

impl ErrorKind {
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::ConfigError | ErrorKind::InvalidInput => 2,
            ErrorKind::AuthChallenge => 3,
            ErrorKind::PersistenceError => 4,
            ErrorKind::AcquisitionError
            | ErrorKind::TransformError
            | ErrorKind::CaptionError
            | ErrorKind::PublishError => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::AcquisitionError => "AcquisitionError",
            ErrorKind::TransformError => "TransformError",
            ErrorKind::CaptionError => "CaptionError",
            ErrorKind::PublishError => "PublishError",
            ErrorKind::AuthChallenge => "AuthChallenge",
            ErrorKind::PersistenceError => "PersistenceError",
            ErrorKind::InvalidInput => "InvalidInput",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No creators configured; add at least one handle to `creators`")]
    EmptyCreators,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum AcquisitionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Browser session rejected: {0}")]
    SessionExpired(String),

    #[error("No media found: {0}")]
    MissingMedia(String),

    #[error("Unparseable response: {0}")]
    Unparseable(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AcquisitionError::Timeout(error.to_string())
        } else {
            AcquisitionError::Network(error.to_string())
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum TransformError {
    #[error("Media tool not available ({tool}): {reason}")]
    ToolMissing { tool: String, reason: String },

    #[error("{step} step failed (status {status}): {stderr}")]
    StepFailed {
        step: String,
        status: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}

#[derive(Error, Debug, Clone)]
pub enum CaptionError {
    #[error("Caption generator unreachable: {0}")]
    Unreachable(String),

    #[error("Caption generator returned no text")]
    Empty,
}

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// The platform session is missing, expired, or was refused. Needs a fresh login.
    #[error("Authentication required: {0}")]
    AuthChallenge(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Ledger IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger format invalid: {0}")]
    Format(#[from] serde_json::Error),
}

/// Problems with a stored login session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session file not found at {0}")]
    NotFound(String),

    #[error("session file unreadable: {0}")]
    Unreadable(String),

    #[error("session expired: {0}")]
    Expired(String),
}

impl From<SessionError> for AcquisitionError {
    fn from(error: SessionError) -> Self {
        AcquisitionError::SessionExpired(error.to_string())
    }
}

impl From<SessionError> for PublishError {
    fn from(error: SessionError) -> Self {
        PublishError::AuthChallenge(error.to_string())
    }
}
