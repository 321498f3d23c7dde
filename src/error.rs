//! Error types for FalLab
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for FalLab operations
///
/// Covers caller misuse of the conversation store, remote generation
/// failures, catalog fetch failures, configuration problems, and the
/// underlying I/O and serialization errors.
#[derive(Error, Debug)]
pub enum FallabError {
    /// Malformed caller input (empty model id, empty prompt, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A session or message id that does not exist in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// A generation is already in flight where only one is allowed
    #[error("Busy: {0}")]
    Busy(String),

    /// Remote submission or status query failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// Polling exceeded its maximum wait without a terminal status
    #[error("Generation request timed out after {waited_ms}ms (request {request_id})")]
    Timeout {
        /// The request that was being observed
        request_id: String,
        /// How long the poller waited before giving up
        waited_ms: u64,
    },

    /// The caller stopped observing the request
    #[error("Generation request cancelled: {0}")]
    Cancelled(String),

    /// Model catalog fetch failures
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Non-success HTTP status returned by the API
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Server-provided detail, or the raw body when none was provided
        message: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FallabError {
    /// Returns the typed error carried by an `anyhow::Error`, if any
    ///
    /// # Examples
    ///
    /// ```
    /// use fallab::error::FallabError;
    ///
    /// let err: anyhow::Error = FallabError::Busy("session s1".to_string()).into();
    /// assert!(matches!(FallabError::kind_of(&err), Some(FallabError::Busy(_))));
    /// ```
    pub fn kind_of(err: &anyhow::Error) -> Option<&FallabError> {
        err.downcast_ref::<FallabError>()
    }
}

/// Result type alias for FalLab operations
///
/// Uses `anyhow::Error` so context can be attached while the typed
/// [`FallabError`] stays recoverable through downcasting.
pub type Result<T> = anyhow::Result<T>;
