//! Broker capability interface.
//!
//! Every call is awaited in sequence by the engine, so one account's cycle
//! never has two oracle requests in flight.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use fxshadow_core::{
    AccountSummary, Bar, BrokerPosition, OrderAck, OrderRequest, OrderSide, PositionFilter, Price,
    Size, Symbol, SymbolInfo, Tick, Timeframe,
};
use rust_decimal::Decimal;
use zeroize::Zeroizing;

use crate::error::BrokerResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Shared handle to an oracle implementation.
pub type DynBroker = Arc<dyn BrokerOracle>;

/// Market data, position and order access against the trading terminal.
///
/// Query methods return `Ok(None)` / an empty list when the terminal has
/// nothing to report; `Err` is reserved for transport problems.
pub trait BrokerOracle: Send + Sync {
    /// Most recent `count` bars ending now, oldest first.
    fn bars<'a>(
        &'a self,
        symbol: &'a Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<Bar>>>;

    /// Live top-of-book quote.
    fn tick<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, BrokerResult<Option<Tick>>>;

    /// Instrument metadata.
    fn symbol_info<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, BrokerResult<Option<SymbolInfo>>>;

    /// Metadata for every instrument the terminal offers.
    fn symbols(&self) -> BoxFuture<'_, BrokerResult<Vec<SymbolInfo>>>;

    /// Open positions matching the filter. An empty list means none are
    /// open; a terminal that cannot answer yields `BrokerError::Unavailable`.
    fn positions(&self, filter: PositionFilter) -> BoxFuture<'_, BrokerResult<Vec<BrokerPosition>>>;

    /// Send a deal request. `Ok(None)` means the terminal returned no result.
    fn send_order(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<Option<OrderAck>>>;

    /// Account summary of the logged-in session.
    fn account(&self) -> BoxFuture<'_, BrokerResult<Option<AccountSummary>>>;

    /// Margin the broker would require for a new position, if it can say.
    fn margin_required<'a>(
        &'a self,
        symbol: &'a Symbol,
        side: OrderSide,
        volume: Size,
        price: Price,
    ) -> BoxFuture<'a, BrokerResult<Option<Decimal>>>;
}

/// Terminal session control.
pub trait BrokerSession: Send + Sync {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, BrokerResult<()>>;

    fn logout(&self) -> BoxFuture<'_, BrokerResult<()>>;
}

/// Trading account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub login: u64,
    pub password: Zeroizing<String>,
    pub server: String,
}

impl Credentials {
    pub fn new(login: u64, password: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            login,
            password: Zeroizing::new(password.into()),
            server: server.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("server", &self.server)
            .finish()
    }
}
