//! Shared error type for the Nexfluc crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap configuration or provider credentials unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record could not be encoded for storage
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored row present but undecodable
    #[error("Corrupt {table} row: {detail}")]
    CorruptRecord { table: &'static str, detail: String },
}
