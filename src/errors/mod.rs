//! Error types for the live-status engine

mod types;

pub use types::{AppError, StoreError};

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;
