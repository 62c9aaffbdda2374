//! Virtual order construction for fxshadow.
//!
//! # Key Components
//!
//! - [`VirtualOrderFactory`]: builds shadow orders with broker-safe real levels
//!   and virtual levels at half the real distance
//! - [`FactoryConfig`]: base distance, exotic-pair table and volume defaults
//! - [`ProfitModel`]: pluggable unrealized-profit estimate, [`PipValueModel`]
//!   being the fixed pip-value approximation

pub mod config;
pub mod error;
pub mod factory;
pub mod profit;

pub use config::FactoryConfig;
pub use error::{PositionError, PositionResult};
pub use factory::{Levels, VirtualOrderFactory};
pub use profit::{CurrencyContext, PipValueModel, Profit, ProfitModel};
