//! Error type definitions for the live-status engine
//!
//! Validation, not-found and conflict errors are rejected synchronously at
//! the override-management boundary. Provider failures are never surfaced to
//! read-path callers; they are absorbed into the attempt tracker.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed override request; rejected before persistence, never retried
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Referenced schedule/program/channel does not exist
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// An override already exists for the same scope and week
    #[error("Conflict: override already exists for {scope} in week {week}")]
    Conflict { scope: String, week: String },

    /// External video-platform failure or empty result treated as an error
    #[error("External provider error: {provider} - {message}")]
    ExternalProvider { provider: String, message: String },

    /// A stored cache entry could not be decoded; treated as a miss upstream
    #[error("Cache corruption at key {key}: {message}")]
    CacheCorruption { key: String, message: String },

    /// Cache store (Redis) errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Cache store specific errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection pool failures
    #[error("Pool error: {message}")]
    Pool { message: String },

    /// Errors returned by the store backend
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Record (de)serialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error for a duplicate override scope+week
    pub fn conflict<S: Into<String>, W: Into<String>>(scope: S, week: W) -> Self {
        Self::Conflict {
            scope: scope.into(),
            week: week.into(),
        }
    }

    /// Create an external provider error
    pub fn provider<P: Into<String>, M: Into<String>>(provider: P, message: M) -> Self {
        Self::ExternalProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
