//! Shadow order record and order-related enums.
//!
//! A [`ShadowOrder`] is the locally held view of one trade: tighter virtual
//! target/stop levels used to decide early exit, the real levels sent to the
//! broker, and an optional link to the broker position once it is confirmed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::{PositionId, Symbol};
use crate::{Price, Size};

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell.
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order completion semantics accepted by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FillMode {
    #[default]
    #[serde(rename = "fok")]
    FillOrKill,
    #[serde(rename = "ioc")]
    ImmediateOrCancel,
}

impl FillMode {
    /// Bit of this mode in the broker's supported-modes mask.
    pub fn mask(&self) -> u32 {
        match self {
            Self::FillOrKill => 1,
            Self::ImmediateOrCancel => 2,
        }
    }

    /// The other mode, used when the broker rejects this one.
    pub fn alternate(&self) -> Self {
        match self {
            Self::FillOrKill => Self::ImmediateOrCancel,
            Self::ImmediateOrCancel => Self::FillOrKill,
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FillOrKill => write!(f, "FOK"),
            Self::ImmediateOrCancel => write!(f, "IOC"),
        }
    }
}

/// Local identifier of a shadow order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new unique ID.
    ///
    /// Format: `vo_{symbol}_{timestamp_ms}_{uuid_short}`
    pub fn new(symbol: &Symbol) -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("vo_{symbol}_{ts}_{uuid_short}"))
    }

    /// ID for a shadow built around an existing broker position.
    pub fn for_position(ticket: PositionId) -> Self {
        Self(format!("pos_{ticket}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a shadow order.
///
/// `Pending -> Open -> Closed`, or `Delayed -> Open` for re-entries queued
/// after a signal reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Open,
    Delayed { execute_at: DateTime<Utc> },
    Closed,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Open => write!(f, "open"),
            Self::Delayed { execute_at } => write!(f, "delayed({execute_at})"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The shadow/real order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowOrder {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub volume: Size,
    /// Reference entry (ask for buy, bid for sell at creation; the broker's
    /// open price once linked).
    pub entry_price: Price,
    pub virtual_tp: Price,
    pub virtual_sl: Price,
    /// Real target sent to the broker. `None` for collected positions without one.
    pub real_tp: Option<Price>,
    /// Real stop sent to the broker. `None` for collected positions without one.
    pub real_sl: Option<Price>,
    /// Spread at creation.
    pub spread: Price,
    pub fill_mode: FillMode,
    /// Creation / signal time.
    pub created_at: DateTime<Utc>,
    /// When the order entered `Open`.
    pub opened_at: Option<DateTime<Utc>>,
    pub linked_position: Option<PositionId>,
    /// True until a real position is confirmed linked.
    pub is_virtual: bool,
    pub state: OrderState,
}

impl ShadowOrder {
    /// Scheduled execution time (delayed orders only).
    pub fn execute_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            OrderState::Delayed { execute_at } => Some(execute_at),
            _ => None,
        }
    }

    /// Whether a delayed order is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_at().is_some_and(|at| now >= at)
    }

    /// Link to a confirmed broker position.
    pub fn link(&mut self, ticket: PositionId, price_open: Price) {
        self.linked_position = Some(ticket);
        self.entry_price = price_open;
        self.is_virtual = false;
    }

    /// Whether `price` is beyond the virtual target in the favorable direction.
    pub fn hits_virtual_tp(&self, price: Price) -> bool {
        match self.side {
            OrderSide::Buy => price > self.virtual_tp,
            OrderSide::Sell => price < self.virtual_tp,
        }
    }

    /// Whether `price` is beyond the virtual stop in the adverse direction.
    pub fn hits_virtual_sl(&self, price: Price) -> bool {
        match self.side {
            OrderSide::Buy => price < self.virtual_sl,
            OrderSide::Sell => price > self.virtual_sl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(side: OrderSide) -> ShadowOrder {
        let (tp, sl) = match side {
            OrderSide::Buy => (dec!(1.1180), dec!(1.0818)),
            OrderSide::Sell => (dec!(1.0818), dec!(1.1180)),
        };
        ShadowOrder {
            id: OrderId::new(&Symbol::new("EURUSD")),
            symbol: Symbol::new("EURUSD"),
            side,
            volume: Size::new(dec!(0.01)),
            entry_price: Price::new(dec!(1.1000)),
            virtual_tp: Price::new(tp),
            virtual_sl: Price::new(sl),
            real_tp: None,
            real_sl: None,
            spread: Price::new(dec!(0.0002)),
            fill_mode: FillMode::FillOrKill,
            created_at: Utc::now(),
            opened_at: None,
            linked_position: None,
            is_virtual: true,
            state: OrderState::Pending,
        }
    }

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_fill_mode_alternate() {
        assert_eq!(FillMode::FillOrKill.alternate(), FillMode::ImmediateOrCancel);
        assert_eq!(FillMode::ImmediateOrCancel.alternate(), FillMode::FillOrKill);
    }

    #[test]
    fn test_order_id_unique() {
        let symbol = Symbol::new("EURUSD");
        assert_ne!(OrderId::new(&symbol), OrderId::new(&symbol));
        assert!(OrderId::new(&symbol).as_str().starts_with("vo_EURUSD_"));
    }

    #[test]
    fn test_virtual_hits_buy() {
        let order = sample(OrderSide::Buy);
        assert!(order.hits_virtual_tp(Price::new(dec!(1.1181))));
        assert!(!order.hits_virtual_tp(Price::new(dec!(1.1180))));
        assert!(order.hits_virtual_sl(Price::new(dec!(1.0817))));
        assert!(!order.hits_virtual_sl(Price::new(dec!(1.1000))));
    }

    #[test]
    fn test_virtual_hits_sell() {
        let order = sample(OrderSide::Sell);
        assert!(order.hits_virtual_tp(Price::new(dec!(1.0817))));
        assert!(order.hits_virtual_sl(Price::new(dec!(1.1181))));
        assert!(!order.hits_virtual_sl(Price::new(dec!(1.1000))));
    }

    #[test]
    fn test_delayed_due() {
        let mut order = sample(OrderSide::Buy);
        let now = Utc::now();
        assert!(!order.is_due(now));

        order.state = OrderState::Delayed {
            execute_at: now + chrono::Duration::minutes(9),
        };
        assert!(!order.is_due(now));
        assert!(order.is_due(now + chrono::Duration::minutes(9)));
    }

    #[test]
    fn test_link_clears_virtual_flag() {
        let mut order = sample(OrderSide::Buy);
        order.link(PositionId(42), Price::new(dec!(1.1001)));
        assert!(!order.is_virtual);
        assert_eq!(order.linked_position, Some(PositionId(42)));
        assert_eq!(order.entry_price.inner(), dec!(1.1001));
    }
}
