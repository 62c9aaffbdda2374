//! fxshadow runner.
//!
//! Loads the configuration, registers every configured account and rotates
//! through them one at a time:
//! - login
//! - one lifecycle cycle every few seconds until the session expires
//! - logout, pause, next account

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, SessionOutcome};
pub use config::{AccountConfig, AppConfig, SessionConfig};
pub use error::{AppError, AppResult};
