//! Risk checks for fxshadow.
//!
//! - [`MarginGate`]: blocks new positions near stop-out or without free margin
//! - [`SwapGuard`]: daily overnight-financing decision per open order

pub mod error;
pub mod margin;
pub mod swap;

pub use error::{RiskError, RiskResult};
pub use margin::{GateResult, MarginConfig, MarginGate};
pub use swap::{KeepReason, SwapConfig, SwapDecision, SwapGuard};
