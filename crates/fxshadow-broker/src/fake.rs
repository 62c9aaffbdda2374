//! Deterministic in-memory broker.
//!
//! Holds quotes, metadata, bars and positions in plain maps and applies deal
//! requests immediately. Knobs let tests reproduce the awkward cases of a real
//! terminal: fills that never show up as positions, closes that are
//! acknowledged but do not take effect, scripted rejections, and a dropped
//! connection.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::Utc;
use fxshadow_core::{
    AccountSummary, Bar, BrokerPosition, OrderAck, OrderRequest, OrderSide, PositionFilter,
    PositionId, Price, RetCode, Size, StopOutMode, Symbol, SymbolInfo, Tick, Timeframe, TradeMode,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::error::{BrokerError, BrokerResult};
use crate::oracle::{BoxFuture, BrokerOracle, BrokerSession, Credentials};

/// Typical forex instrument: FOK+IOC, stops level 100, trade mode full.
pub fn fx_symbol(name: &str, digits: u32) -> SymbolInfo {
    SymbolInfo {
        symbol: Symbol::new(name),
        point: Decimal::new(1, digits),
        digits,
        stops_level: 100,
        filling_mode: 3,
        swap_long: Decimal::ZERO,
        swap_short: Decimal::ZERO,
        trade_mode: TradeMode::Full,
    }
}

#[derive(Debug)]
struct FakeState {
    ticks: HashMap<Symbol, Tick>,
    infos: BTreeMap<Symbol, SymbolInfo>,
    bars: HashMap<Symbol, Vec<Bar>>,
    positions: Vec<BrokerPosition>,
    account: Option<AccountSummary>,
    margin: HashMap<Symbol, Decimal>,
    scripted_acks: VecDeque<OrderAck>,
    requests: Vec<OrderRequest>,
    next_ticket: u64,
    hide_fills: bool,
    ignore_closes: bool,
    disconnected: bool,
    logged_in: Option<u64>,
}

/// In-memory broker oracle.
#[derive(Debug)]
pub struct FakeBroker {
    state: Mutex<FakeState>,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBroker {
    /// Empty broker with a healthy USD account.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                ticks: HashMap::new(),
                infos: BTreeMap::new(),
                bars: HashMap::new(),
                positions: Vec::new(),
                account: Some(AccountSummary {
                    login: 1,
                    currency: "USD".to_string(),
                    equity: Decimal::new(10_000, 0),
                    margin: Decimal::ZERO,
                    margin_free: Decimal::new(10_000, 0),
                    stop_out_mode: StopOutMode::Percent,
                    stop_out_level: Decimal::new(50, 0),
                }),
                margin: HashMap::new(),
                scripted_acks: VecDeque::new(),
                requests: Vec::new(),
                next_ticket: 1000,
                hide_fills: false,
                ignore_closes: false,
                disconnected: false,
                logged_in: None,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    pub fn set_symbol_info(&self, info: SymbolInfo) {
        self.state.lock().infos.insert(info.symbol.clone(), info);
    }

    pub fn set_tick(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        let tick = Tick::new(Price::new(bid), Price::new(ask), Utc::now());
        self.state.lock().ticks.insert(Symbol::new(symbol), tick);
    }

    pub fn remove_tick(&self, symbol: &str) {
        self.state.lock().ticks.remove(&Symbol::new(symbol));
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.state.lock().bars.insert(Symbol::new(symbol), bars);
    }

    pub fn set_account(&self, account: Option<AccountSummary>) {
        self.state.lock().account = account;
    }

    pub fn set_margin_required(&self, symbol: &str, margin: Decimal) {
        self.state.lock().margin.insert(Symbol::new(symbol), margin);
    }

    /// Insert a position as if opened outside the engine.
    pub fn add_position(&self, position: BrokerPosition) {
        self.state.lock().positions.push(position);
    }

    /// Remove a position as if closed broker-side.
    pub fn remove_position(&self, ticket: PositionId) {
        self.state.lock().positions.retain(|p| p.ticket != ticket);
    }

    /// Queue an acknowledgement returned by the next deal request instead of
    /// the default `Done`.
    pub fn push_ack(&self, ack: OrderAck) {
        self.state.lock().scripted_acks.push_back(ack);
    }

    /// Accepted opens do not create a visible position.
    pub fn set_hide_fills(&self, hide: bool) {
        self.state.lock().hide_fills = hide;
    }

    /// Accepted closes leave the position in place.
    pub fn set_ignore_closes(&self, ignore: bool) {
        self.state.lock().ignore_closes = ignore;
    }

    /// Every call fails with [`BrokerError::Disconnected`].
    pub fn set_disconnected(&self, disconnected: bool) {
        self.state.lock().disconnected = disconnected;
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn requests(&self) -> Vec<OrderRequest> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    pub fn open_positions(&self) -> Vec<BrokerPosition> {
        self.state.lock().positions.clone()
    }

    pub fn logged_in(&self) -> Option<u64> {
        self.state.lock().logged_in
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> BrokerResult<T> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(BrokerError::Disconnected("fake terminal offline".to_string()));
        }
        Ok(f(&mut state))
    }

    fn apply(state: &mut FakeState, request: OrderRequest) -> OrderAck {
        state.requests.push(request.clone());

        let ack = state.scripted_acks.pop_front().unwrap_or_else(|| {
            let ticket = state.next_ticket;
            OrderAck::new(RetCode::Done, Some(ticket), "Request executed")
        });
        if !ack.retcode.is_done() {
            return ack;
        }

        match request.position {
            Some(ticket) => {
                if !state.ignore_closes {
                    state.positions.retain(|p| p.ticket != ticket);
                }
            }
            None => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                if !state.hide_fills {
                    let opened_at = state
                        .ticks
                        .get(&request.symbol)
                        .map(|t| t.time)
                        .unwrap_or_else(Utc::now);
                    state.positions.push(BrokerPosition {
                        ticket: PositionId(ticket),
                        symbol: request.symbol.clone(),
                        side: request.side,
                        volume: request.volume,
                        price_open: request.price,
                        stop_loss: request.stop_loss,
                        take_profit: request.take_profit,
                        opened_at,
                    });
                }
            }
        }
        ack
    }
}

impl BrokerOracle for FakeBroker {
    fn bars<'a>(
        &'a self,
        symbol: &'a Symbol,
        _timeframe: Timeframe,
        count: usize,
    ) -> BoxFuture<'a, BrokerResult<Vec<Bar>>> {
        let result = self.with_state(|s| {
            let bars = s.bars.get(symbol).cloned().unwrap_or_default();
            let skip = bars.len().saturating_sub(count);
            bars.into_iter().skip(skip).collect()
        });
        Box::pin(async move { result })
    }

    fn tick<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, BrokerResult<Option<Tick>>> {
        let result = self.with_state(|s| s.ticks.get(symbol).copied());
        Box::pin(async move { result })
    }

    fn symbol_info<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, BrokerResult<Option<SymbolInfo>>> {
        let result = self.with_state(|s| s.infos.get(symbol).cloned());
        Box::pin(async move { result })
    }

    fn symbols(&self) -> BoxFuture<'_, BrokerResult<Vec<SymbolInfo>>> {
        let result = self.with_state(|s| s.infos.values().cloned().collect());
        Box::pin(async move { result })
    }

    fn positions(&self, filter: PositionFilter) -> BoxFuture<'_, BrokerResult<Vec<BrokerPosition>>> {
        let result = self.with_state(|s| {
            s.positions
                .iter()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect()
        });
        Box::pin(async move { result })
    }

    fn send_order(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<Option<OrderAck>>> {
        let result = self.with_state(|s| Some(Self::apply(s, request)));
        Box::pin(async move { result })
    }

    fn account(&self) -> BoxFuture<'_, BrokerResult<Option<AccountSummary>>> {
        let result = self.with_state(|s| s.account.clone());
        Box::pin(async move { result })
    }

    fn margin_required<'a>(
        &'a self,
        symbol: &'a Symbol,
        _side: OrderSide,
        _volume: Size,
        _price: Price,
    ) -> BoxFuture<'a, BrokerResult<Option<Decimal>>> {
        let result = self.with_state(|s| s.margin.get(symbol).copied());
        Box::pin(async move { result })
    }
}

impl BrokerSession for FakeBroker {
    fn login<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, BrokerResult<()>> {
        let result = self.with_state(|s| {
            s.logged_in = Some(credentials.login);
            if let Some(account) = s.account.as_mut() {
                account.login = credentials.login;
            }
        });
        Box::pin(async move { result })
    }

    fn logout(&self) -> BoxFuture<'_, BrokerResult<()>> {
        let result = self.with_state(|s| s.logged_in = None);
        Box::pin(async move { result })
    }
}
