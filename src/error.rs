//! Error types for taleforge

use std::io;

use thiserror::Error;

/// Result type alias for taleforge
pub type Result<T> = std::result::Result<T, Error>;

/// Taleforge errors
///
/// Lock, cache, key and sanitizer operations never fail; these variants are
/// produced by configuration loading, orchestration and the CLI.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The text provider reported a failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// A sanitized reply still could not be parsed
    #[error("{0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error for a reply that did not deserialize
    pub fn parse(detail: impl std::fmt::Display) -> Self {
        Self::Parse(format!("failed to parse response: {detail}"))
    }

    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Returns `true` when the failure came from the provider collaborator
    #[must_use]
    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}
