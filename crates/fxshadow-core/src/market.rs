//! Broker market data records.
//!
//! These are read-only views of the broker's authoritative state: quotes,
//! price history, instrument metadata, account summary and real positions.
//! The engine never treats its own copies as authoritative over these.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{FillMode, OrderSide};
use crate::{Price, Size};

// ============================================================================
// Symbol
// ============================================================================

/// Broker instrument name (e.g. "EURUSD", "USDJPY").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the currency code appears anywhere in the name.
    pub fn contains_currency(&self, currency: &str) -> bool {
        self.0.to_uppercase().contains(&currency.to_uppercase())
    }

    /// Whether the pair is quoted in yen (two-decimal pip).
    pub fn is_yen_quoted(&self) -> bool {
        self.contains_currency("JPY")
    }

    /// Whether any of the keywords appears in the name (case-insensitive).
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        let upper = self.0.to_uppercase();
        keywords.iter().any(|k| upper.contains(&k.to_uppercase()))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Quotes and history
// ============================================================================

/// Chart timeframe for price history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    #[default]
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Bar length in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1440,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Live top-of-book quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub bid: Price,
    pub ask: Price,
    pub time: DateTime<Utc>,
}

impl Tick {
    pub fn new(bid: Price, ask: Price, time: DateTime<Utc>) -> Self {
        Self { bid, ask, time }
    }

    /// Spread: ask - bid.
    pub fn spread(&self) -> Price {
        self.ask - self.bid
    }

    /// Price at which a new position on `side` is opened (ask for buy, bid for sell).
    pub fn entry_price(&self, side: OrderSide) -> Price {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }

    /// Price at which a position on `side` is closed (bid for buy, ask for sell).
    pub fn exit_price(&self, side: OrderSide) -> Price {
        match side {
            OrderSide::Buy => self.bid,
            OrderSide::Sell => self.ask,
        }
    }
}

/// OHLC price bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

impl Bar {
    /// Flat bar where all four prices equal `close`.
    pub fn flat(time: DateTime<Utc>, close: Price) -> Self {
        Self {
            time,
            open: close,
            high: close,
            low: close,
            close,
        }
    }
}

// ============================================================================
// Instrument metadata
// ============================================================================

/// Trading permission reported by the broker for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    Disabled,
    LongOnly,
    ShortOnly,
    CloseOnly,
    #[default]
    Full,
}

/// Instrument metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: Symbol,
    /// Point size (minimum price increment).
    pub point: Decimal,
    /// Quote digit precision.
    pub digits: u32,
    /// Broker minimum stop distance, in points.
    pub stops_level: u32,
    /// Supported fill modes as a bitmask (see [`FillMode::mask`]).
    pub filling_mode: u32,
    /// Overnight financing for long positions.
    pub swap_long: Decimal,
    /// Overnight financing for short positions.
    pub swap_short: Decimal,
    pub trade_mode: TradeMode,
}

impl SymbolInfo {
    /// Minimum stop distance as a price distance.
    pub fn min_stop_distance(&self) -> Price {
        Price::new(Decimal::from(self.stops_level) * self.point)
    }

    /// Distance of `points` points as a price distance.
    pub fn points(&self, points: u32) -> Price {
        Price::new(Decimal::from(points) * self.point)
    }

    /// Preferred fill mode: fill-or-kill when supported, else immediate-or-cancel,
    /// falling back to fill-or-kill when the broker reports neither.
    pub fn preferred_fill_mode(&self) -> FillMode {
        if self.filling_mode & FillMode::FillOrKill.mask() != 0 {
            FillMode::FillOrKill
        } else if self.filling_mode & FillMode::ImmediateOrCancel.mask() != 0 {
            FillMode::ImmediateOrCancel
        } else {
            FillMode::FillOrKill
        }
    }

    /// Overnight financing rate for a position on `side`.
    pub fn swap_for(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.swap_long,
            OrderSide::Sell => self.swap_short,
        }
    }

    pub fn is_fully_tradable(&self) -> bool {
        self.trade_mode == TradeMode::Full
    }
}

// ============================================================================
// Account
// ============================================================================

/// How the broker expresses the stop-out level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutMode {
    /// Level is a percentage of used margin.
    #[default]
    Percent,
    /// Level is an absolute equity amount.
    Money,
}

/// Account summary from the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub login: u64,
    /// Settlement currency (e.g. "USD", "EUR").
    pub currency: String,
    pub equity: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    pub stop_out_mode: StopOutMode,
    pub stop_out_level: Decimal,
}

impl AccountSummary {
    /// Settlement currency, upper-cased.
    pub fn currency_code(&self) -> String {
        self.currency.to_uppercase()
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Broker-assigned position identifier (ticket).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A real position held at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub ticket: PositionId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub volume: Size,
    pub price_open: Price,
    /// Realized stop, `None` when the position has no stop attached.
    pub stop_loss: Option<Price>,
    /// Realized target, `None` when the position has no target attached.
    pub take_profit: Option<Price>,
    pub opened_at: DateTime<Utc>,
}

/// Position query selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum PositionFilter {
    All,
    Ticket { ticket: PositionId },
    Symbol { symbol: Symbol },
}

impl PositionFilter {
    pub fn matches(&self, position: &BrokerPosition) -> bool {
        match self {
            Self::All => true,
            Self::Ticket { ticket } => position.ticket == *ticket,
            Self::Symbol { symbol } => position.symbol == *symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn info(filling_mode: u32) -> SymbolInfo {
        SymbolInfo {
            symbol: Symbol::new("EURUSD"),
            point: dec!(0.0001),
            digits: 4,
            stops_level: 100,
            filling_mode,
            swap_long: dec!(-1.5),
            swap_short: dec!(0.4),
            trade_mode: TradeMode::Full,
        }
    }

    #[test]
    fn test_min_stop_distance() {
        assert_eq!(info(1).min_stop_distance().inner(), dec!(0.0100));
    }

    #[test]
    fn test_preferred_fill_mode() {
        assert_eq!(info(1).preferred_fill_mode(), FillMode::FillOrKill);
        assert_eq!(info(3).preferred_fill_mode(), FillMode::FillOrKill);
        assert_eq!(info(2).preferred_fill_mode(), FillMode::ImmediateOrCancel);
        assert_eq!(info(0).preferred_fill_mode(), FillMode::FillOrKill);
    }

    #[test]
    fn test_swap_for_side() {
        assert_eq!(info(1).swap_for(OrderSide::Buy), dec!(-1.5));
        assert_eq!(info(1).swap_for(OrderSide::Sell), dec!(0.4));
    }

    #[test]
    fn test_symbol_currency_checks() {
        let s = Symbol::new("usdjpy");
        assert!(s.is_yen_quoted());
        assert!(s.contains_currency("USD"));
        assert!(!s.contains_currency("EUR"));
        assert!(s.matches_any(&["XAU".to_string(), "JPY".to_string()]));
    }

    #[test]
    fn test_tick_prices_by_side() {
        let tick = Tick::new(
            Price::new(dec!(1.0998)),
            Price::new(dec!(1.1000)),
            Utc::now(),
        );
        assert_eq!(tick.entry_price(OrderSide::Buy).inner(), dec!(1.1000));
        assert_eq!(tick.exit_price(OrderSide::Buy).inner(), dec!(1.0998));
        assert_eq!(tick.spread().inner(), dec!(0.0002));
    }
}
