//! Store errors

use parley_types::ParleyError;
use thiserror::Error;

/// Errors that can occur in ledger store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Corrupt row: {message}")]
    Corrupt { message: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ParleyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidAmount { message } => ParleyError::InvalidAmount { reason: message },
            other => ParleyError::storage(other.to_string()),
        }
    }
}
