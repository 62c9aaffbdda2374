//! Per-account monitor cycle.
//!
//! [`LifecycleEngine::run_once`] drives one account through a full cycle:
//!
//! 1. **collect**: reconcile open orders with broker positions (relink,
//!    drop orphans) and shadow untracked positions
//! 2. **generate_pending**: signal + virtual order for every tradable symbol
//! 3. **execute_pending**: margin gate, reversal check, submission
//! 4. **monitor**: virtual target/stop hits close the real position
//! 5. **evaluate_swap** (daily window) and swap-ban reset (daily window)
//! 6. **execute_delayed**: submit re-entries whose delay elapsed
//!
//! Recoverable broker failures skip the affected symbol. A lost connection
//! aborts the cycle and surfaces as [`EngineError::ConnectionLost`].

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use fxshadow_broker::{recover, BrokerOracle, BrokerResult, Credentials, DynBroker};
use fxshadow_core::{
    BrokerPosition, Clock, OrderSide, PositionFilter, ShadowOrder, Symbol, SymbolInfo,
};
use fxshadow_executor::{CloseTarget, ExecutionGateway, SubmitOutcome};
use fxshadow_position::{CurrencyContext, PipValueModel, ProfitModel, VirtualOrderFactory};
use fxshadow_risk::{GateResult, MarginGate, SwapDecision, SwapGuard};
use fxshadow_signal::SignalGenerator;
use fxshadow_telemetry::Metrics;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::account::Account;
use crate::config::{EngineConfig, EngineSettings};
use crate::error::{EngineError, EngineResult};

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Broker positions newly shadowed.
    pub collected: usize,
    /// Unlinked open orders linked to a broker position.
    pub relinked: usize,
    /// Open orders dropped because their broker position is gone.
    pub reconciled: usize,
    pub pending_created: usize,
    /// Pending orders submitted and moved to open.
    pub executed: usize,
    /// Reversals queued for delayed re-entry.
    pub reversed: usize,
    /// Virtual target/stop closes.
    pub closed: usize,
    pub swap_evaluated: bool,
    /// Positions closed and symbols banned for negative swap.
    pub swap_banned: usize,
    pub bans_cleared: usize,
    pub delayed_executed: usize,
    /// No settlement currency known; the cycle did nothing.
    pub skipped: bool,
}

/// Per-cycle account context.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub now: DateTime<Utc>,
    /// Settlement currency, upper-case.
    pub currency: String,
    pub money: CurrencyContext,
}

/// Drives order state transitions for one account at a time.
pub struct LifecycleEngine {
    broker: DynBroker,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    timezone: Tz,
    signals: SignalGenerator,
    factory: VirtualOrderFactory,
    gateway: ExecutionGateway,
    margin: MarginGate,
    swap: SwapGuard,
    profit: Arc<dyn ProfitModel>,
}

impl LifecycleEngine {
    /// Create an engine over `broker`, validating `settings`.
    pub fn new(
        broker: DynBroker,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> EngineResult<Self> {
        settings.validate()?;
        let timezone = settings.engine.tz()?;

        info!(
            timezone = %timezone,
            swap_window = %settings.swap.evaluation_window,
            reset_window = %settings.swap.reset_window,
            reentry_delay_secs = settings.engine.reentry_delay_secs,
            "LifecycleEngine initialized"
        );

        Ok(Self {
            broker,
            clock,
            config: settings.engine,
            timezone,
            signals: SignalGenerator::new(settings.signal),
            factory: VirtualOrderFactory::new(settings.factory),
            gateway: ExecutionGateway::new(settings.gateway),
            margin: MarginGate::new(settings.margin),
            swap: SwapGuard::new(settings.swap),
            profit: Arc::new(PipValueModel::default()),
        })
    }

    /// Replace the profit model.
    pub fn with_profit_model(mut self, profit: Arc<dyn ProfitModel>) -> Self {
        self.profit = profit;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// New account wired to this engine's daily windows.
    pub fn new_account(&self, name: impl Into<String>, credentials: Credentials) -> Account {
        let swap = self.swap.config();
        Account::new(name, credentials, swap.evaluation_window, swap.reset_window)
    }

    /// Wall-clock time in the configured zone.
    pub fn local_now(&self) -> NaiveDateTime {
        self.clock.now().with_timezone(&self.timezone).naive_local()
    }

    fn oracle(&self) -> &dyn BrokerOracle {
        self.broker.as_ref()
    }

    /// Whether a symbol belongs to the tradable universe of an account
    /// settled in `currency`.
    pub fn is_tradable(&self, info: &SymbolInfo, currency: &str) -> bool {
        info.symbol.contains_currency(currency)
            && !info.symbol.matches_any(&self.config.deny_keywords)
            && info.is_fully_tradable()
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Run one full cycle for a connected account.
    pub async fn run_once(&self, account: &mut Account) -> EngineResult<CycleReport> {
        if !account.is_connected() {
            return Err(EngineError::NotConnected(account.name().to_string()));
        }

        let started = Instant::now();
        let mut report = CycleReport::default();

        if let Err(e) = self.cycle(account, &mut report).await {
            if e.is_fatal() {
                error!(account = %account.name(), error = %e, "Broker connection lost");
                Metrics::connection_lost(account.name());
                account.mark_disconnected();
                return Err(EngineError::ConnectionLost {
                    account: account.name().to_string(),
                    source: e,
                });
            }
            warn!(account = %account.name(), error = %e, "Cycle step failed");
        }

        let book = account.book();
        Metrics::book_sizes(
            account.name(),
            book.len_open(),
            book.len_pending(),
            book.len_delayed(),
        );
        Metrics::cycle_duration(account.name(), started.elapsed().as_secs_f64() * 1000.0);
        self.log_diagnostics(account, &report);

        Ok(report)
    }

    async fn cycle(&self, account: &mut Account, report: &mut CycleReport) -> BrokerResult<()> {
        let Some(ctx) = self.context(account).await? else {
            warn!(account = %account.name(), "Settlement currency unknown, skipping cycle");
            report.skipped = true;
            return Ok(());
        };

        self.collect(account, &ctx, report).await?;
        self.generate_pending(account, &ctx, report).await?;
        self.execute_pending(account, &ctx, report).await?;
        self.monitor(account, &ctx, report).await?;

        let local = ctx.now.with_timezone(&self.timezone).naive_local();
        if account.swap_job.due(local) {
            info!(account = %account.name(), local = %local, "Daily swap evaluation");
            let done = self.evaluate_swap(account, &ctx, report).await?;
            report.swap_evaluated = true;
            if done {
                account.swap_job.complete(local);
            } else {
                warn!(account = %account.name(), "Swap evaluation incomplete, retrying next cycle");
            }
        }
        if account.reset_job.poll(local) {
            report.bans_cleared = account.book.clear_swap_bans();
            info!(account = %account.name(), released = report.bans_cleared, "Daily swap-ban reset");
        }

        self.execute_delayed(account, &ctx, report).await
    }

    /// Settlement currency and conversion quote for this cycle.
    ///
    /// `Ok(None)` when the broker has no account summary and none was seen
    /// before.
    pub async fn context(&self, account: &mut Account) -> BrokerResult<Option<CycleContext>> {
        let now = self.clock.now();
        let currency = match recover(self.oracle().account().await, "account")? {
            Some(summary) => {
                let currency = summary.currency_code();
                account.set_currency(currency.clone());
                currency
            }
            None => match account.currency() {
                Some(currency) => currency.to_string(),
                None => return Ok(None),
            },
        };

        let eurusd_bid = if currency == "EUR" {
            recover(self.oracle().tick(&Symbol::new("EURUSD")).await, "tick")?
                .map(|tick| tick.bid.inner())
        } else {
            None
        };

        Ok(Some(CycleContext {
            now,
            money: CurrencyContext::new(currency.clone(), eurusd_bid),
            currency,
        }))
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Reconcile open orders with broker positions, then shadow every
    /// untracked, unbanned position into open.
    pub async fn collect(
        &self,
        account: &mut Account,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<()> {
        let positions = match self.oracle().positions(PositionFilter::All).await {
            Ok(positions) => positions,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(account = %account.name(), error = %e, "Position query failed, skipping collection");
                return Ok(());
            }
        };

        self.reconcile(account, &positions, ctx, report);

        for position in &positions {
            let symbol = &position.symbol;
            let book = account.book();
            if book.is_banned(symbol)
                || book.is_open(symbol)
                || book.is_pending(symbol)
                || book.is_linked(position.ticket)
            {
                continue;
            }

            let info = recover(self.oracle().symbol_info(symbol).await, "symbol_info")?;
            let tick = recover(self.oracle().tick(symbol).await, "tick")?;
            let (Some(info), Some(tick)) = (info, tick) else {
                warn!(account = %account.name(), symbol = %symbol, "Missing tick or info, position not collected");
                continue;
            };

            let order = self
                .factory
                .shadow_position(position, &info, &tick, &ctx.currency, ctx.now);
            info!(
                account = %account.name(),
                symbol = %symbol,
                ticket = %position.ticket,
                side = %position.side,
                virtual_tp = %order.virtual_tp,
                virtual_sl = %order.virtual_sl,
                "Collected broker position"
            );
            account.book.ban_position(symbol.clone(), position.side);
            if account.book.insert_open(order, ctx.now) {
                report.collected += 1;
            }
        }

        Ok(())
    }

    /// Link unlinked orders to matching positions and drop orders whose
    /// position no longer exists.
    fn reconcile(
        &self,
        account: &mut Account,
        positions: &[BrokerPosition],
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) {
        let grace = self.config.unlinked_grace();

        for symbol in account.book.open_symbols() {
            let Some(order) = account.book.open_order(&symbol) else {
                continue;
            };
            let (linked, side, volume) = (order.linked_position, order.side, order.volume);
            let opened_at = order.opened_at.unwrap_or(order.created_at);

            match linked {
                Some(ticket) => {
                    if positions.iter().any(|p| p.ticket == ticket) {
                        continue;
                    }
                    info!(
                        account = %account.name(),
                        symbol = %symbol,
                        ticket = %ticket,
                        "Position closed broker-side, dropping order"
                    );
                    account.book.remove_closed(&symbol);
                    Metrics::position_closed(account.name(), "broker");
                    report.reconciled += 1;
                }
                None => {
                    let fill = positions.iter().find(|p| {
                        p.symbol == symbol
                            && p.side == side
                            && p.volume == volume
                            && !account.book.is_linked(p.ticket)
                    });
                    if let Some(position) = fill {
                        let (ticket, price_open) = (position.ticket, position.price_open);
                        if let Some(order) = account.book.open_order_mut(&symbol) {
                            order.link(ticket, price_open);
                        }
                        info!(account = %account.name(), symbol = %symbol, ticket = %ticket, "Relinked open order");
                        report.relinked += 1;
                    } else if ctx.now - opened_at > grace {
                        warn!(
                            account = %account.name(),
                            symbol = %symbol,
                            "Unlinked order has no broker position, dropping"
                        );
                        account.book.remove_open(&symbol);
                        report.reconciled += 1;
                    }
                }
            }
        }
    }

    // ========================================================================
    // Pending generation / execution
    // ========================================================================

    /// Queue a pending order for every tradable symbol with a directional
    /// signal that is not tracked or banned.
    pub async fn generate_pending(
        &self,
        account: &mut Account,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<()> {
        let symbols = recover(self.oracle().symbols().await, "symbols")?;
        let volume = self.factory.default_volume();

        for info in symbols {
            let symbol = &info.symbol;
            if !self.is_tradable(&info, &ctx.currency) {
                continue;
            }
            if account.book.is_tracked(symbol) || account.book.is_banned(symbol) {
                continue;
            }

            let Some(side) = self.signals.signal(self.oracle(), symbol).await? else {
                continue;
            };
            let Some(order) = self
                .factory
                .build(self.oracle(), symbol, side, volume, &ctx.currency, ctx.now)
                .await?
            else {
                continue;
            };

            if account.book.insert_pending(order) {
                report.pending_created += 1;
            }
        }

        debug!(
            account = %account.name(),
            created = report.pending_created,
            pending = account.book.len_pending(),
            "Pending orders generated"
        );
        Ok(())
    }

    /// Submit pending orders whose signal still holds; queue a delayed
    /// re-entry for those whose signal reversed.
    pub async fn execute_pending(
        &self,
        account: &mut Account,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<()> {
        for symbol in account.book.pending_symbols() {
            let Some(order) = account.book.pending_order(&symbol).cloned() else {
                continue;
            };
            if account.book.is_swap_banned(&symbol) {
                debug!(account = %account.name(), symbol = %symbol, "Swap-banned, keeping pending");
                continue;
            }
            if account.book.is_delayed(&symbol) {
                continue;
            }

            let gate = self
                .margin
                .check(self.oracle(), &symbol, order.side, order.volume)
                .await?;
            if let GateResult::Block(reason) = gate {
                debug!(account = %account.name(), symbol = %symbol, reason = %reason, "Pending execution deferred");
                continue;
            }

            let Some(current) = self.signals.signal(self.oracle(), &symbol).await? else {
                continue;
            };
            if current != order.side {
                self.reverse(account, &order, current, ctx, report).await?;
                continue;
            }

            if account.book.is_open(&symbol) {
                continue;
            }
            match self.broker_holds(account.name(), &symbol).await? {
                Some(false) => {}
                Some(true) => {
                    warn!(
                        account = %account.name(),
                        symbol = %symbol,
                        "Broker already holds a position, dropping pending for collection"
                    );
                    account.book.take_pending(&symbol);
                    continue;
                }
                None => continue,
            }

            let outcome = self.gateway.submit(self.oracle(), account.name(), &order).await?;
            if let Some(opened) = opened_order(order, &outcome) {
                account.book.take_pending(&symbol);
                account.book.insert_open(opened, self.clock.now());
                report.executed += 1;
            }
        }
        Ok(())
    }

    /// Close whatever is held on the symbol and queue an order for `side`
    /// after the re-entry delay.
    async fn reverse(
        &self,
        account: &mut Account,
        order: &ShadowOrder,
        side: OrderSide,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<()> {
        let symbol = &order.symbol;
        let Some(replacement) = self
            .factory
            .build(self.oracle(), symbol, side, order.volume, &ctx.currency, self.clock.now())
            .await?
        else {
            return Ok(());
        };

        if !self.close_symbol(account.name(), symbol).await? {
            warn!(account = %account.name(), symbol = %symbol, "Reversal postponed, position not closed");
            return Ok(());
        }

        if account.book.remove_closed(symbol).is_some() {
            Metrics::position_closed(account.name(), "reversal");
        }
        account.book.take_pending(symbol);

        let execute_at = self.clock.now() + self.config.reentry_delay();
        info!(
            account = %account.name(),
            symbol = %symbol,
            from = %order.side,
            to = %side,
            execute_at = %execute_at,
            "Signal reversed, re-entry delayed"
        );
        account.book.schedule_delayed(replacement, execute_at);
        report.reversed += 1;
        Ok(())
    }

    /// Whether the broker holds any position on `symbol`. `None` when the
    /// terminal cannot say.
    async fn broker_holds(&self, account: &str, symbol: &Symbol) -> BrokerResult<Option<bool>> {
        let filter = PositionFilter::Symbol {
            symbol: symbol.clone(),
        };
        match self.oracle().positions(filter).await {
            Ok(positions) => Ok(Some(!positions.is_empty())),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(account, symbol = %symbol, error = %e, "Position query failed");
                Ok(None)
            }
        }
    }

    /// Close every broker position on `symbol`. True when none remain
    /// (including when there was none).
    async fn close_symbol(&self, account: &str, symbol: &Symbol) -> BrokerResult<bool> {
        let filter = PositionFilter::Symbol {
            symbol: symbol.clone(),
        };
        let positions = match self.oracle().positions(filter).await {
            Ok(positions) => positions,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(account, symbol = %symbol, error = %e, "Position query failed");
                return Ok(false);
            }
        };

        let mut all_closed = true;
        for position in positions {
            info!(account, symbol = %symbol, ticket = %position.ticket, "Closing position before reversal");
            let target = CloseTarget::ticket(position.ticket, position.symbol.clone());
            all_closed &= self.gateway.close(self.oracle(), account, &target).await?;
        }
        Ok(all_closed)
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    /// Close open orders whose price crossed the virtual target or stop.
    pub async fn monitor(
        &self,
        account: &mut Account,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<()> {
        for symbol in account.book.open_symbols() {
            let Some(order) = account.book.open_order(&symbol).cloned() else {
                continue;
            };
            let Some(tick) = recover(self.oracle().tick(&symbol).await, "tick")? else {
                continue;
            };

            let price = tick.entry_price(order.side);
            let profit = self.profit.evaluate(&order, &tick, &ctx.money);
            debug!(
                account = %account.name(),
                symbol = %symbol,
                side = %order.side,
                price = %price,
                pips = %profit.pips,
                profit = %profit.amount,
                virtual_tp = %order.virtual_tp,
                virtual_sl = %order.virtual_sl,
                "Open order"
            );

            let reason = if order.hits_virtual_tp(price) {
                "virtual_tp"
            } else if order.hits_virtual_sl(price) {
                "virtual_sl"
            } else {
                continue;
            };

            info!(account = %account.name(), symbol = %symbol, reason, price = %price, "Virtual threshold hit, closing");
            let target = CloseTarget::for_order(&order);
            if self.gateway.close(self.oracle(), account.name(), &target).await? {
                account.book.remove_closed(&symbol);
                Metrics::position_closed(account.name(), reason);
                report.closed += 1;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Swap
    // ========================================================================

    /// Close profitable positions that would pay swap overnight and ban
    /// their symbols until the next reset.
    ///
    /// Returns false when a position that should close is still open.
    pub async fn evaluate_swap(
        &self,
        account: &mut Account,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<bool> {
        let mut done = true;
        for symbol in account.book.open_symbols() {
            let Some(order) = account.book.open_order(&symbol).cloned() else {
                continue;
            };
            let info = recover(self.oracle().symbol_info(&symbol).await, "symbol_info")?;
            let tick = recover(self.oracle().tick(&symbol).await, "tick")?;
            let (Some(info), Some(tick)) = (info, tick) else {
                continue;
            };

            let swap = self.swap.effective_swap(&info, order.side, &ctx.currency);
            let profit = self.profit.evaluate(&order, &tick, &ctx.money).amount;

            match self.swap.decide(swap, profit) {
                SwapDecision::CloseAndBan => {
                    warn!(
                        account = %account.name(),
                        symbol = %symbol,
                        swap = %swap.round_dp(2),
                        profit = %profit,
                        "Negative swap on profitable position, closing before rollover"
                    );
                    let target = CloseTarget::for_order(&order);
                    if self.gateway.close(self.oracle(), account.name(), &target).await? {
                        account.book.remove_closed(&symbol);
                        account.book.swap_ban(symbol.clone());
                        Metrics::position_closed(account.name(), "swap");
                        Metrics::swap_banned(account.name());
                        report.swap_banned += 1;
                    } else {
                        done = false;
                    }
                }
                SwapDecision::Keep(reason) => debug!(
                    account = %account.name(),
                    symbol = %symbol,
                    swap = %swap.round_dp(2),
                    profit = %profit,
                    %reason,
                    "Keeping position through rollover"
                ),
            }
        }
        Ok(done)
    }

    // ========================================================================
    // Delayed execution
    // ========================================================================

    /// Submit every delayed order whose time has come, with levels rebuilt
    /// from the current quote. Each is attempted once and never re-queued.
    pub async fn execute_delayed(
        &self,
        account: &mut Account,
        ctx: &CycleContext,
        report: &mut CycleReport,
    ) -> BrokerResult<()> {
        let now = self.clock.now();
        for due in account.book.take_due(now) {
            let symbol = due.symbol.clone();
            if account.book.is_open(&symbol) || account.book.is_swap_banned(&symbol) {
                warn!(account = %account.name(), symbol = %symbol, "Symbol open or banned, dropping delayed order");
                continue;
            }
            if self.broker_holds(account.name(), &symbol).await? != Some(false) {
                warn!(account = %account.name(), symbol = %symbol, "Broker position present or unknown, dropping delayed order");
                continue;
            }
            let Some(order) = self
                .factory
                .build(self.oracle(), &symbol, due.side, due.volume, &ctx.currency, now)
                .await?
            else {
                warn!(account = %account.name(), symbol = %symbol, "No quote for delayed order, discarded");
                continue;
            };

            info!(account = %account.name(), symbol = %symbol, side = %order.side, "Executing delayed order");
            let outcome = self.gateway.submit(self.oracle(), account.name(), &order).await?;
            match opened_order(order, &outcome) {
                Some(opened) => {
                    account.book.insert_open(opened, now);
                    report.delayed_executed += 1;
                }
                None => warn!(
                    account = %account.name(),
                    symbol = %symbol,
                    outcome = outcome.label(),
                    "Delayed order not executed, discarded"
                ),
            }
        }
        Ok(())
    }

    fn log_diagnostics(&self, account: &Account, report: &CycleReport) {
        let snapshot = account.book().snapshot();
        let pending_only: Vec<&str> = snapshot
            .pending_not_open()
            .iter()
            .map(|o| o.symbol.as_str())
            .collect();
        let overlap: Vec<&str> = snapshot
            .open_pending_overlap()
            .iter()
            .map(|s| s.as_str())
            .collect();
        let delayed: Vec<String> = snapshot
            .delayed
            .iter()
            .map(|o| match o.execute_at() {
                Some(at) => format!("{}@{}", o.symbol, at.format("%H:%M:%S")),
                None => o.symbol.to_string(),
            })
            .collect();

        debug!(
            account = %account.name(),
            ?report,
            open = snapshot.open.len(),
            ?pending_only,
            ?overlap,
            ?delayed,
            swap_banned = snapshot.swap_banned.len(),
            "Cycle complete"
        );
    }
}

/// The order as it enters open after `outcome`, if the broker accepted it.
fn opened_order(mut order: ShadowOrder, outcome: &SubmitOutcome) -> Option<ShadowOrder> {
    match outcome {
        SubmitOutcome::Linked { position, entry } => {
            order.link(*position, *entry);
            Some(order)
        }
        SubmitOutcome::Unlinked { .. } => Some(order),
        _ => None,
    }
}
