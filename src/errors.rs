/*!
 * Error types for the bookforge application.
 *
 * This module contains custom error types for different parts of the pipeline,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors raised by fetcher roles.
///
/// Both variants are task-fatal: a structure that cannot be fetched or parsed
/// leaves nothing for the rest of the pipeline to work with.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The remote source could not be reached
    #[error("Source unreachable: {0}")]
    Unreachable(String),

    /// The remote responded but its structure could not be parsed
    #[error("Failed to parse source structure: {0}")]
    StructureParse(String),
}

/// Errors raised by translator roles for a whole batch.
///
/// Per-line rejections are reported in-band as `LineOutcome::Rejected`, not
/// through this type.
#[derive(Error, Debug)]
pub enum TranslateError {
    /// Network or backend failure, retried with backoff
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend rate limit hit, retried honoring the declared limits
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// Error message from the backend
        message: String,
        /// Backend-suggested wait before the next attempt, if declared
        retry_after_secs: Option<u64>,
    },

    /// The per-call timeout elapsed; counts as one retry attempt
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

impl TranslateError {
    /// Whether the scheduler should retry the batch after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }
}

/// Errors raised when resolving roles from the registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No registered role carries the requested name
    #[error("No role registered under name '{0}'")]
    UnknownRole(String),

    /// A role with this name exists but belongs to another capability family
    #[error("Role '{name}' is not a {expected}")]
    WrongRole {
        /// The requested role name
        name: String,
        /// The capability family that was expected
        expected: &'static str,
    },

    /// A name was registered twice
    #[error("Role name '{0}' is already registered")]
    DuplicateRole(String),

    /// No registered fetcher accepted the task URL
    #[error("No fetcher matched URL '{0}'")]
    NoFetcherMatched(String),
}

/// Errors raised by the book store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted document failed to deserialize.
    /// Fatal to the process; the snapshot is never silently repaired.
    #[error("Store corruption in {path}: {reason}")]
    Corruption {
        /// Path of the offending document
        path: String,
        /// Deserialization failure detail
        reason: String,
    },

    /// A document could not be serialized for flushing
    #[error("Failed to serialize document for {0}")]
    Serialize(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a fetcher role
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error from a translator role
    #[error("Translation error: {0}")]
    Translate(#[from] TranslateError),

    /// Error resolving a role
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Error from the book store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error from configuration loading or validation
    #[error("Config error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}
