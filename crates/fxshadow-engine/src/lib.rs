//! Order lifecycle engine for fxshadow.
//!
//! Owns the per-account order book (pending, open and delayed orders plus
//! the two ban sets) and drives every transition through
//! [`LifecycleEngine::run_once`]:
//!
//! ```text
//! collect -> generate pending -> execute pending -> monitor
//!         -> swap evaluation / ban reset -> execute delayed
//! ```

pub mod account;
pub mod book;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;

pub use account::{Account, AccountSnapshot};
pub use book::{BookSnapshot, OrderBook};
pub use config::{EngineConfig, EngineSettings};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{CycleContext, CycleReport, LifecycleEngine};
pub use registry::AccountRegistry;
