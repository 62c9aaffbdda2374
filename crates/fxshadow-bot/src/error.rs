//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Broker error: {0}")]
    Broker(#[from] fxshadow_broker::BrokerError),

    #[error("Engine error: {0}")]
    Engine(#[from] fxshadow_engine::EngineError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] fxshadow_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
