//! Per-account order collections.
//!
//! Open, pending and delayed orders are keyed by symbol, so the book can
//! never hold two open orders for one instrument. Mutation is restricted to
//! the engine crate; everything else reads through [`OrderBook::snapshot`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use fxshadow_core::{OrderSide, OrderState, PositionId, ShadowOrder, Symbol};
use serde::Serialize;
use tracing::{debug, info};

/// Pending, open and delayed orders plus ban sets for one account.
#[derive(Debug, Default)]
pub struct OrderBook {
    open: BTreeMap<Symbol, ShadowOrder>,
    pending: BTreeMap<Symbol, ShadowOrder>,
    delayed: BTreeMap<Symbol, ShadowOrder>,
    /// Symbols shadowing a collected broker position, with its side.
    position_bans: BTreeMap<Symbol, OrderSide>,
    /// Symbols closed for negative swap, until the daily reset.
    swap_banned: BTreeSet<Symbol>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn open_order(&self, symbol: &Symbol) -> Option<&ShadowOrder> {
        self.open.get(symbol)
    }

    pub fn pending_order(&self, symbol: &Symbol) -> Option<&ShadowOrder> {
        self.pending.get(symbol)
    }

    pub fn delayed_order(&self, symbol: &Symbol) -> Option<&ShadowOrder> {
        self.delayed.get(symbol)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &ShadowOrder> {
        self.open.values()
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &ShadowOrder> {
        self.pending.values()
    }

    pub fn delayed_orders(&self) -> impl Iterator<Item = &ShadowOrder> {
        self.delayed.values()
    }

    pub fn open_symbols(&self) -> Vec<Symbol> {
        self.open.keys().cloned().collect()
    }

    pub fn pending_symbols(&self) -> Vec<Symbol> {
        self.pending.keys().cloned().collect()
    }

    pub fn is_open(&self, symbol: &Symbol) -> bool {
        self.open.contains_key(symbol)
    }

    pub fn is_pending(&self, symbol: &Symbol) -> bool {
        self.pending.contains_key(symbol)
    }

    pub fn is_delayed(&self, symbol: &Symbol) -> bool {
        self.delayed.contains_key(symbol)
    }

    pub fn is_position_banned(&self, symbol: &Symbol) -> bool {
        self.position_bans.contains_key(symbol)
    }

    pub fn is_swap_banned(&self, symbol: &Symbol) -> bool {
        self.swap_banned.contains(symbol)
    }

    /// On either ban list.
    pub fn is_banned(&self, symbol: &Symbol) -> bool {
        self.is_position_banned(symbol) || self.is_swap_banned(symbol)
    }

    /// Held in any collection.
    pub fn is_tracked(&self, symbol: &Symbol) -> bool {
        self.is_open(symbol) || self.is_pending(symbol) || self.is_delayed(symbol)
    }

    /// Ticket already linked by some open order.
    pub fn is_linked(&self, ticket: PositionId) -> bool {
        self.open.values().any(|o| o.linked_position == Some(ticket))
    }

    pub fn len_open(&self) -> usize {
        self.open.len()
    }

    pub fn len_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn len_delayed(&self) -> usize {
        self.delayed.len()
    }

    // ------------------------------------------------------------------
    // Transitions (engine only)
    // ------------------------------------------------------------------

    /// Insert into pending. Returns false when the symbol already has one.
    pub(crate) fn insert_pending(&mut self, mut order: ShadowOrder) -> bool {
        if self.pending.contains_key(&order.symbol) {
            return false;
        }
        order.state = OrderState::Pending;
        self.pending.insert(order.symbol.clone(), order);
        true
    }

    pub(crate) fn take_pending(&mut self, symbol: &Symbol) -> Option<ShadowOrder> {
        self.pending.remove(symbol)
    }

    /// Insert into open. Returns false (and drops nothing) when the symbol
    /// is already open.
    pub(crate) fn insert_open(&mut self, mut order: ShadowOrder, now: DateTime<Utc>) -> bool {
        if self.open.contains_key(&order.symbol) {
            return false;
        }
        order.state = OrderState::Open;
        order.opened_at.get_or_insert(now);
        self.open.insert(order.symbol.clone(), order);
        true
    }

    pub(crate) fn open_order_mut(&mut self, symbol: &Symbol) -> Option<&mut ShadowOrder> {
        self.open.get_mut(symbol)
    }

    pub(crate) fn remove_open(&mut self, symbol: &Symbol) -> Option<ShadowOrder> {
        self.open.remove(symbol)
    }

    /// Queue `order` for submission at `execute_at`, replacing any earlier
    /// re-entry for the same symbol.
    pub(crate) fn schedule_delayed(&mut self, mut order: ShadowOrder, execute_at: DateTime<Utc>) {
        order.state = OrderState::Delayed { execute_at };
        order.opened_at = None;
        self.delayed.insert(order.symbol.clone(), order);
    }

    /// Remove and return every delayed order due at `now`.
    pub(crate) fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ShadowOrder> {
        let due: Vec<Symbol> = self
            .delayed
            .iter()
            .filter(|(_, o)| o.is_due(now))
            .map(|(s, _)| s.clone())
            .collect();
        due.iter().filter_map(|s| self.delayed.remove(s)).collect()
    }

    /// Forget everything about a symbol whose position was closed: its open
    /// and pending orders and its position ban. Returns the open order.
    pub(crate) fn remove_closed(&mut self, symbol: &Symbol) -> Option<ShadowOrder> {
        let removed = self.open.remove(symbol);
        if self.pending.remove(symbol).is_some() {
            debug!(symbol = %symbol, "Removed pending order of closed symbol");
        }
        if self.position_bans.remove(symbol).is_some() {
            debug!(symbol = %symbol, "Unbanned closed position");
        }
        removed.map(|mut order| {
            order.state = OrderState::Closed;
            order
        })
    }

    pub(crate) fn ban_position(&mut self, symbol: Symbol, side: OrderSide) {
        self.position_bans.insert(symbol, side);
    }

    pub(crate) fn swap_ban(&mut self, symbol: Symbol) -> bool {
        self.swap_banned.insert(symbol)
    }

    /// Clear the swap ban list, returning how many symbols were released.
    pub(crate) fn clear_swap_bans(&mut self) -> usize {
        let released = self.swap_banned.len();
        self.swap_banned.clear();
        if released > 0 {
            info!(released, "Cleared swap-banned symbols");
        }
        released
    }

    /// Read-only copy of every collection.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            open: self.open.values().cloned().collect(),
            pending: self.pending.values().cloned().collect(),
            delayed: self.delayed.values().cloned().collect(),
            position_bans: self.position_bans.clone(),
            swap_banned: self.swap_banned.iter().cloned().collect(),
        }
    }
}

/// Point-in-time copy of an [`OrderBook`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookSnapshot {
    pub open: Vec<ShadowOrder>,
    pub pending: Vec<ShadowOrder>,
    pub delayed: Vec<ShadowOrder>,
    pub position_bans: BTreeMap<Symbol, OrderSide>,
    pub swap_banned: Vec<Symbol>,
}

impl BookSnapshot {
    /// Pending orders whose symbol has no open order.
    pub fn pending_not_open(&self) -> Vec<&ShadowOrder> {
        self.pending
            .iter()
            .filter(|p| !self.open.iter().any(|o| o.symbol == p.symbol))
            .collect()
    }

    /// Symbols present in both open and pending.
    pub fn open_pending_overlap(&self) -> Vec<&Symbol> {
        self.pending
            .iter()
            .filter(|p| self.open.iter().any(|o| o.symbol == p.symbol))
            .map(|p| &p.symbol)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use fxshadow_core::{FillMode, OrderId, Price, Size};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
    }

    fn order(symbol: &str, side: OrderSide) -> ShadowOrder {
        let symbol = Symbol::new(symbol);
        ShadowOrder {
            id: OrderId::new(&symbol),
            symbol,
            side,
            volume: Size::new(dec!(0.01)),
            entry_price: Price::new(dec!(1.1000)),
            virtual_tp: Price::new(dec!(1.1180)),
            virtual_sl: Price::new(dec!(1.0818)),
            real_tp: Some(Price::new(dec!(1.1360))),
            real_sl: Some(Price::new(dec!(1.0638))),
            spread: Price::new(dec!(0.0002)),
            fill_mode: FillMode::FillOrKill,
            created_at: now(),
            opened_at: None,
            linked_position: None,
            is_virtual: true,
            state: OrderState::Pending,
        }
    }

    #[test]
    fn test_one_open_order_per_symbol() {
        let mut book = OrderBook::new();
        assert!(book.insert_open(order("EURUSD", OrderSide::Buy), now()));
        assert!(!book.insert_open(order("EURUSD", OrderSide::Sell), now()));
        assert_eq!(book.len_open(), 1);
        assert_eq!(
            book.open_order(&Symbol::new("EURUSD")).unwrap().side,
            OrderSide::Buy
        );
    }

    #[test]
    fn test_insert_open_sets_state_and_time() {
        let mut book = OrderBook::new();
        book.insert_open(order("EURUSD", OrderSide::Buy), now());
        let open = book.open_order(&Symbol::new("EURUSD")).unwrap();
        assert_eq!(open.state, OrderState::Open);
        assert_eq!(open.opened_at, Some(now()));
    }

    #[test]
    fn test_take_due_only_returns_elapsed() {
        let mut book = OrderBook::new();
        book.schedule_delayed(order("EURUSD", OrderSide::Sell), now() + Duration::minutes(9));
        book.schedule_delayed(order("GBPUSD", OrderSide::Buy), now() + Duration::minutes(1));

        assert!(book.take_due(now()).is_empty());
        let due = book.take_due(now() + Duration::minutes(2));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].symbol, Symbol::new("GBPUSD"));
        assert!(book.is_delayed(&Symbol::new("EURUSD")));
        assert!(!book.is_delayed(&Symbol::new("GBPUSD")));
    }

    #[test]
    fn test_remove_closed_cleans_every_trace() {
        let mut book = OrderBook::new();
        let symbol = Symbol::new("EURUSD");
        let mut open = order("EURUSD", OrderSide::Buy);
        open.link(PositionId(7), Price::new(dec!(1.1001)));
        book.insert_open(open, now());
        book.insert_pending(order("EURUSD", OrderSide::Sell));
        book.ban_position(symbol.clone(), OrderSide::Buy);

        let closed = book.remove_closed(&symbol).unwrap();
        assert_eq!(closed.state, OrderState::Closed);
        assert!(!book.is_tracked(&symbol));
        assert!(!book.is_banned(&symbol));
    }

    #[test]
    fn test_swap_bans_clear() {
        let mut book = OrderBook::new();
        assert!(book.swap_ban(Symbol::new("USDJPY")));
        assert!(!book.swap_ban(Symbol::new("USDJPY")));
        assert!(book.is_banned(&Symbol::new("USDJPY")));
        assert_eq!(book.clear_swap_bans(), 1);
        assert!(!book.is_banned(&Symbol::new("USDJPY")));
    }

    #[test]
    fn test_snapshot_diagnostics() {
        let mut book = OrderBook::new();
        book.insert_open(order("EURUSD", OrderSide::Buy), now());
        book.insert_pending(order("EURUSD", OrderSide::Sell));
        book.insert_pending(order("GBPUSD", OrderSide::Buy));

        let snapshot = book.snapshot();
        assert_eq!(snapshot.open_pending_overlap(), vec![&Symbol::new("EURUSD")]);
        let lonely: Vec<_> = snapshot
            .pending_not_open()
            .iter()
            .map(|o| o.symbol.clone())
            .collect();
        assert_eq!(lonely, vec![Symbol::new("GBPUSD")]);
    }
}
