//! Error types for the ingestion pipeline.

use thiserror::Error;

use quotedeck_market_data::MarketDataError;

// Create a type alias for Result using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the ingestion pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Lock operation failed: {0}")]
    Lock(#[from] LockError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration failed: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from the shared-store HTTP client.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Errors from the distributed lease lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lease expired mid-run and another owner reclaimed it.
    #[error("ingestion lease lost to another owner")]
    Lost,
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
