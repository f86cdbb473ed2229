//! Export error types

use thiserror::Error;

/// Errors raised while building or streaming an export
#[derive(Debug, Error)]
pub enum ExportError {
    /// Request input that cannot be coerced into a filter
    #[error("Invalid export filter: {0}")]
    InvalidFilter(String),

    /// The content store failed or is unreachable
    #[error("Repository error: {0:#}")]
    Repository(#[from] anyhow::Error),

    /// The document could not be written
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ExportError {
    /// Create an invalid filter error
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter(message.into())
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}
