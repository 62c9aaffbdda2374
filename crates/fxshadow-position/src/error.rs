//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid quote for {symbol}: {reason}")]
    InvalidQuote { symbol: String, reason: String },
}

pub type PositionResult<T> = Result<T, PositionError>;
