//! Broker oracle access for fxshadow.
//!
//! The engine talks to the trading terminal only through [`BrokerOracle`]
//! (market data, positions, order submission) and [`BrokerSession`]
//! (login/logout). Two implementations are provided:
//!
//! - [`BridgeClient`]: JSON over HTTP to a terminal bridge process
//! - [`FakeBroker`]: deterministic in-memory broker for tests and dry runs

pub mod bridge;
pub mod error;
pub mod fake;
pub mod oracle;

pub use bridge::BridgeClient;
pub use error::{recover, BrokerError, BrokerResult};
pub use fake::{fx_symbol, FakeBroker};
pub use oracle::{BoxFuture, BrokerOracle, BrokerSession, Credentials, DynBroker};
