//! Engine error types.

use fxshadow_broker::BrokerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Connection lost for account {account}: {source}")]
    ConnectionLost {
        account: String,
        #[source]
        source: BrokerError,
    },

    #[error("Account {0} is not connected")]
    NotConnected(String),

    #[error("Account {0} is already registered")]
    DuplicateAccount(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
