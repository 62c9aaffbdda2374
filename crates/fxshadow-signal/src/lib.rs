//! Directional signal generation.
//!
//! Compares a fast and a slow exponential moving average of closing prices
//! on the latest bar: fast above slow is a buy, below is a sell.

pub mod config;
pub mod ema;
pub mod error;
pub mod generator;

pub use config::SignalConfig;
pub use ema::ewm_mean;
pub use error::{SignalError, SignalResult};
pub use generator::{crossover_signal, SignalGenerator};
