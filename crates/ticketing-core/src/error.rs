//! Store error types.

use thiserror::Error;

/// Top-level error type for document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert collided with an existing value of a unique index.
    #[error("duplicate key in collection '{collection}' violates unique index '{index}'")]
    DuplicateKey {
        /// The collection the insert targeted.
        collection: String,
        /// The unique index that rejected the insert.
        index: String,
    },

    /// An index with the same name but a different definition already exists.
    #[error("index '{index}' on collection '{collection}' already exists with a different definition")]
    IndexConflict {
        /// The collection the index belongs to.
        collection: String,
        /// The conflicting index name.
        index: String,
    },

    /// A collection or field name that cannot be used as a store identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A document could not be converted to or from its stored form.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl StoreError {
    /// Returns `true` if this error is a unique index violation.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
