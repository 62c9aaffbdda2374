//! Order execution against the broker oracle.
//!
//! # Key Components
//!
//! - [`ExecutionGateway`]: submits shadow orders as market deals and closes
//!   real positions, negotiating the fill mode and confirming the result by
//!   polling broker positions
//! - [`RetryPolicy`]: bounded attempts with a fixed or growing pause, shared
//!   by every poll and retry loop

pub mod error;
pub mod gateway;
pub mod retry;

pub use error::{ExecutorError, ExecutorResult};
pub use gateway::{CloseTarget, ExecutionGateway, GatewayConfig, SubmitOutcome};
pub use retry::RetryPolicy;
