//! Broker error types.
//!
//! Only a lost terminal connection is fatal. Everything else (missing quote,
//! bridge hiccup, unparsable payload) is treated by callers as "skip this
//! symbol this cycle".

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection lost: {0}")]
    Disconnected(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Broker data unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP bridge error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrokerError {
    /// Whether the error means the session is gone and must be re-established.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::LoginFailed(_))
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Downgrade a recoverable failure to the empty value, keeping fatal ones.
///
/// Used at every oracle call site in the engine: an unavailable quote or
/// position list means "nothing this cycle", a lost connection propagates.
pub fn recover<T: Default>(result: BrokerResult<T>, what: &str) -> BrokerResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(error = %e, what, "Broker query failed, skipping");
            Ok(T::default())
        }
    }
}
