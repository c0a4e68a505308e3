//! Error types for the map data cache.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
///
/// "Not found" is never an error: fetch callbacks report a missing element
/// with `Ok(None)` or by omitting it from a returned list.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store failed; carries the store's message.
    #[error("Backing store error: {0}")]
    Source(String),

    /// The backing store failed with a structured error.
    #[error("Backing store error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A query bounding box is malformed.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Wrap any displayable backing-store failure.
    pub fn source(err: impl fmt::Display) -> Self {
        CacheError::Source(err.to_string())
    }

    /// Wrap a structured backing-store error, keeping it as the error source.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CacheError::Backend(Box::new(err))
    }
}
