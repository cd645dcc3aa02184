//! Ticketing service — startup error types.

use thiserror::Error;
use ticketing_core::error::StoreError;
use ticketing_store::config::ConfigError;

/// Startup errors for the ticketing service.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store rejected index initialization.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
