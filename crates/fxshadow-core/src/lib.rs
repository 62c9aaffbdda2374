//! Core domain types for the fxshadow trading engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Symbol`, `SymbolInfo`, `Tick`, `Bar`: Broker market data records
//! - `ShadowOrder`, `OrderState`: The virtual/real order record and its lifecycle tag
//! - `OrderRequest`, `OrderAck`, `RetCode`: Order submission types
//! - `Clock`, `DailyJob`: Time sources and daily windows

pub mod clock;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod market;
pub mod order;
pub mod schedule;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use execution::{OrderAck, OrderRequest, RetCode};
pub use market::{
    AccountSummary, Bar, BrokerPosition, PositionFilter, PositionId, StopOutMode, Symbol,
    SymbolInfo, Tick, Timeframe, TradeMode,
};
pub use order::{FillMode, OrderId, OrderSide, OrderState, ShadowOrder};
pub use schedule::{DailyJob, DailyWindow};
