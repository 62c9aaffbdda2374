//! Execution gateway.
//!
//! Submits shadow orders as market deals and closes real positions. Neither
//! operation trusts an acknowledgement alone: a submission is linked only once
//! a matching position is observed, and a close succeeds only once the
//! position is observed gone.

use fxshadow_broker::{recover, BrokerOracle, BrokerResult};
use fxshadow_core::{
    BrokerPosition, FillMode, OrderAck, OrderRequest, PositionFilter, PositionId, Price, RetCode,
    ShadowOrder, Symbol,
};
use fxshadow_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ExecutorResult;
use crate::retry::RetryPolicy;

// ============================================================================
// Configuration
// ============================================================================

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Accepted slippage in points for new positions.
    #[serde(default = "default_submit_deviation")]
    pub submit_deviation: u32,
    /// Accepted slippage in points for closes.
    #[serde(default = "default_close_deviation")]
    pub close_deviation: u32,
    /// Magic number tagging this engine's deals.
    #[serde(default = "default_magic")]
    pub magic: u64,
    /// Poll for the position created by an accepted submission.
    #[serde(default = "default_link_poll")]
    pub link_poll: RetryPolicy,
    /// Close submission attempts.
    #[serde(default = "default_close_retry")]
    pub close_retry: RetryPolicy,
    /// Poll for the disappearance of a closed position.
    #[serde(default = "default_close_confirm")]
    pub close_confirm: RetryPolicy,
}

fn default_submit_deviation() -> u32 {
    50
}

fn default_close_deviation() -> u32 {
    100
}

fn default_magic() -> u64 {
    123_456
}

fn default_link_poll() -> RetryPolicy {
    RetryPolicy::fixed(8, 400)
}

fn default_close_retry() -> RetryPolicy {
    RetryPolicy::fixed(6, 700)
}

fn default_close_confirm() -> RetryPolicy {
    RetryPolicy::fixed(8, 250)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            submit_deviation: default_submit_deviation(),
            close_deviation: default_close_deviation(),
            magic: default_magic(),
            link_poll: default_link_poll(),
            close_retry: default_close_retry(),
            close_confirm: default_close_confirm(),
        }
    }
}

impl GatewayConfig {
    /// Same deal parameters, no pauses. For tests and dry runs.
    pub fn without_delays() -> Self {
        let defaults = Self::default();
        Self {
            link_poll: RetryPolicy::immediate(defaults.link_poll.max_attempts),
            close_retry: RetryPolicy::immediate(defaults.close_retry.max_attempts),
            close_confirm: RetryPolicy::immediate(defaults.close_confirm.max_attempts),
            ..defaults
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ExecutorResult<()> {
        self.link_poll.validate("link_poll")?;
        self.close_retry.validate("close_retry")?;
        self.close_confirm.validate("close_confirm")
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted and matched to a broker position.
    Linked { position: PositionId, entry: Price },
    /// Accepted, but no matching position appeared within the poll bound.
    Unlinked { order: Option<u64> },
    /// Refused by the broker (after the fill-mode retry, if any).
    Rejected { retcode: RetCode, comment: String },
    /// The terminal returned no result.
    NoResponse,
    /// No live quote for the symbol.
    NoQuote,
}

impl SubmitOutcome {
    /// Whether the broker accepted the deal.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Linked { .. } | Self::Unlinked { .. })
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Linked { .. } => "linked",
            Self::Unlinked { .. } => "unlinked",
            Self::Rejected { .. } => "rejected",
            Self::NoResponse => "no_response",
            Self::NoQuote => "no_quote",
        }
    }
}

/// Position to close: by ticket, falling back to the first position on the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseTarget {
    pub position: Option<PositionId>,
    pub symbol: Symbol,
}

impl CloseTarget {
    pub fn symbol(symbol: Symbol) -> Self {
        Self {
            position: None,
            symbol,
        }
    }

    pub fn ticket(position: PositionId, symbol: Symbol) -> Self {
        Self {
            position: Some(position),
            symbol,
        }
    }

    /// Target of an order's linked position (or its symbol when unlinked).
    pub fn for_order(order: &ShadowOrder) -> Self {
        Self {
            position: order.linked_position,
            symbol: order.symbol.clone(),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Submits and closes orders against a broker oracle.
#[derive(Debug, Clone)]
pub struct ExecutionGateway {
    config: GatewayConfig,
}

impl ExecutionGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Submit `order` as a market deal at the current price of its side.
    ///
    /// An "invalid fill" rejection is retried exactly once with the other
    /// fill mode. Only a fatal broker error is returned as `Err`.
    pub async fn submit(
        &self,
        broker: &dyn BrokerOracle,
        account: &str,
        order: &ShadowOrder,
    ) -> BrokerResult<SubmitOutcome> {
        let outcome = self.submit_inner(broker, account, order).await?;
        Metrics::order_submitted(account, outcome.label());
        Ok(outcome)
    }

    async fn submit_inner(
        &self,
        broker: &dyn BrokerOracle,
        account: &str,
        order: &ShadowOrder,
    ) -> BrokerResult<SubmitOutcome> {
        let Some(tick) = recover(broker.tick(&order.symbol).await, "tick")? else {
            warn!(account, symbol = %order.symbol, "No tick, cannot submit");
            return Ok(SubmitOutcome::NoQuote);
        };

        let mut request = OrderRequest {
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price: tick.entry_price(order.side),
            stop_loss: order.real_sl,
            take_profit: order.real_tp,
            fill_mode: order.fill_mode,
            position: None,
            deviation: self.config.submit_deviation,
            magic: self.config.magic,
            comment: format!("{account} executed {}", order.side),
        };

        let Some(ack) = self.send_with_fill_fallback(broker, &mut request).await? else {
            warn!(account, symbol = %order.symbol, "order_send returned no result");
            return Ok(SubmitOutcome::NoResponse);
        };

        info!(
            account,
            symbol = %order.symbol,
            retcode = %ack.retcode,
            order = ?ack.order,
            comment = %ack.comment,
            "Execute order result"
        );

        if !ack.retcode.is_done() {
            return Ok(SubmitOutcome::Rejected {
                retcode: ack.retcode,
                comment: ack.comment,
            });
        }

        match self.find_fill(broker, order).await? {
            Some(position) => {
                info!(
                    account,
                    symbol = %order.symbol,
                    side = %order.side,
                    ticket = %position.ticket,
                    "Real order linked to position"
                );
                Ok(SubmitOutcome::Linked {
                    position: position.ticket,
                    entry: position.price_open,
                })
            }
            None => {
                warn!(account, symbol = %order.symbol, "Could not confirm linked real position");
                Ok(SubmitOutcome::Unlinked { order: ack.order })
            }
        }
    }

    /// Send `request`; on an "invalid fill" answer switch `request` to the
    /// other fill mode and send it once more.
    async fn send_with_fill_fallback(
        &self,
        broker: &dyn BrokerOracle,
        request: &mut OrderRequest,
    ) -> BrokerResult<Option<OrderAck>> {
        let Some(ack) = recover(broker.send_order(request.clone()).await, "order_send")? else {
            return Ok(None);
        };
        if ack.retcode != RetCode::InvalidFill {
            return Ok(Some(ack));
        }

        let alternate = request.fill_mode.alternate();
        info!(
            symbol = %request.symbol,
            from = %request.fill_mode,
            to = %alternate,
            "Retrying with alternate fill mode"
        );
        request.fill_mode = alternate;
        recover(broker.send_order(request.clone()).await, "order_send")
    }

    /// Poll for a position on the order's symbol with the order's side and volume.
    async fn find_fill(
        &self,
        broker: &dyn BrokerOracle,
        order: &ShadowOrder,
    ) -> BrokerResult<Option<BrokerPosition>> {
        let side = order.side;
        let volume = order.volume;
        let symbol = order.symbol.clone();

        self.config
            .link_poll
            .run("link_position", |_| {
                let filter = PositionFilter::Symbol {
                    symbol: symbol.clone(),
                };
                async move {
                    broker.positions(filter).await.map(|positions| {
                        positions
                            .into_iter()
                            .find(|p| p.side == side && p.volume == volume)
                    })
                }
            })
            .await
    }

    /// Close the target position with an opposite-side deal.
    ///
    /// Returns `Ok(false)` when no position resolves, no quote is available,
    /// or the close could not be confirmed within the retry budget; the
    /// caller keeps its order and tries again next cycle.
    pub async fn close(
        &self,
        broker: &dyn BrokerOracle,
        account: &str,
        target: &CloseTarget,
    ) -> BrokerResult<bool> {
        let Some(position) = self.resolve(broker, target).await? else {
            warn!(
                account,
                ticket = ?target.position,
                symbol = %target.symbol,
                "No open position found to close"
            );
            return Ok(false);
        };

        let Some(tick) = recover(broker.tick(&position.symbol).await, "tick")? else {
            warn!(account, symbol = %position.symbol, "No tick, cannot close");
            return Ok(false);
        };
        let fill_mode = recover(broker.symbol_info(&position.symbol).await, "symbol_info")?
            .map_or(FillMode::default(), |info| info.preferred_fill_mode());

        let mut request = OrderRequest {
            symbol: position.symbol.clone(),
            side: position.side.opposite(),
            volume: position.volume,
            price: tick.exit_price(position.side),
            stop_loss: None,
            take_profit: None,
            fill_mode,
            position: Some(position.ticket),
            deviation: self.config.close_deviation,
            magic: self.config.magic,
            comment: format!("{account} close {}", position.symbol),
        };

        let policy = &self.config.close_retry;
        for attempt in 1..=policy.max_attempts {
            match self.send_with_fill_fallback(broker, &mut request).await? {
                None => warn!(account, attempt, symbol = %position.symbol, "Close returned no result"),
                Some(ack) if ack.retcode.is_done() => {
                    if self.confirm_gone(broker, position.ticket).await? {
                        info!(
                            account,
                            ticket = %position.ticket,
                            symbol = %position.symbol,
                            "Closed real position confirmed"
                        );
                        return Ok(true);
                    }
                    debug!(account, attempt, ticket = %position.ticket, "Close accepted but position still listed");
                }
                Some(ack) => warn!(
                    account,
                    attempt,
                    symbol = %position.symbol,
                    retcode = %ack.retcode,
                    comment = %ack.comment,
                    "Close rejected"
                ),
            }
            if attempt < policy.max_attempts {
                policy.pause(attempt).await;
            }
        }

        warn!(
            account,
            symbol = %position.symbol,
            attempts = policy.max_attempts,
            "Failed to close position"
        );
        Metrics::close_failed(account);
        Ok(false)
    }

    async fn resolve(
        &self,
        broker: &dyn BrokerOracle,
        target: &CloseTarget,
    ) -> BrokerResult<Option<BrokerPosition>> {
        if let Some(ticket) = target.position {
            let by_ticket = recover(
                broker.positions(PositionFilter::Ticket { ticket }).await,
                "positions",
            )?;
            if let Some(position) = by_ticket.into_iter().next() {
                return Ok(Some(position));
            }
            debug!(ticket = %ticket, "No position for ticket, trying symbol");
        }

        let by_symbol = recover(
            broker
                .positions(PositionFilter::Symbol {
                    symbol: target.symbol.clone(),
                })
                .await,
            "positions",
        )?;
        Ok(by_symbol.into_iter().next())
    }

    async fn confirm_gone(&self, broker: &dyn BrokerOracle, ticket: PositionId) -> BrokerResult<bool> {
        let gone = self
            .config
            .close_confirm
            .run("close_confirm", |_| async move {
                broker
                    .positions(PositionFilter::Ticket { ticket })
                    .await
                    .map(|positions| positions.is_empty().then_some(()))
            })
            .await?;
        Ok(gone.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fxshadow_broker::{fx_symbol, FakeBroker};
    use fxshadow_core::{OrderId, OrderSide, OrderState, Size};
    use rust_decimal_macros::dec;

    fn gateway() -> ExecutionGateway {
        ExecutionGateway::new(GatewayConfig::without_delays())
    }

    fn broker() -> FakeBroker {
        let broker = FakeBroker::new();
        broker.set_symbol_info(fx_symbol("EURUSD", 4));
        broker.set_tick("EURUSD", dec!(1.0998), dec!(1.1000));
        broker
    }

    fn order(side: OrderSide) -> ShadowOrder {
        ShadowOrder {
            id: OrderId::new(&Symbol::new("EURUSD")),
            symbol: Symbol::new("EURUSD"),
            side,
            volume: Size::new(dec!(0.01)),
            entry_price: Price::new(dec!(1.1000)),
            virtual_tp: Price::new(dec!(1.1180)),
            virtual_sl: Price::new(dec!(1.0818)),
            real_tp: Some(Price::new(dec!(1.1360))),
            real_sl: Some(Price::new(dec!(1.0638))),
            spread: Price::new(dec!(0.0002)),
            fill_mode: FillMode::FillOrKill,
            created_at: Utc::now(),
            opened_at: None,
            linked_position: None,
            is_virtual: true,
            state: OrderState::Pending,
        }
    }

    #[tokio::test]
    async fn test_submit_links_position() {
        let broker = broker();
        let outcome = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SubmitOutcome::Linked {
                position: PositionId(1000),
                entry: Price::new(dec!(1.1000)),
            }
        );
        let requests = broker.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].price.inner(), dec!(1.1000));
        assert_eq!(requests[0].deviation, 50);
        assert_eq!(requests[0].magic, 123_456);
        assert_eq!(requests[0].comment, "acct executed buy");
        assert_eq!(requests[0].take_profit, Some(Price::new(dec!(1.1360))));
    }

    #[tokio::test]
    async fn test_sell_submits_at_bid() {
        let broker = broker();
        gateway()
            .submit(&broker, "acct", &order(OrderSide::Sell))
            .await
            .unwrap();
        assert_eq!(broker.requests()[0].price.inner(), dec!(1.0998));
    }

    #[tokio::test]
    async fn test_invalid_fill_retried_once_with_alternate() {
        let broker = broker();
        broker.push_ack(OrderAck::new(RetCode::InvalidFill, None, "Unsupported filling mode"));

        let outcome = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Linked { .. }));

        let requests = broker.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].fill_mode, FillMode::FillOrKill);
        assert_eq!(requests[1].fill_mode, FillMode::ImmediateOrCancel);
    }

    #[tokio::test]
    async fn test_second_invalid_fill_is_rejected() {
        let broker = broker();
        broker.push_ack(OrderAck::new(RetCode::InvalidFill, None, ""));
        broker.push_ack(OrderAck::new(RetCode::InvalidFill, None, ""));

        let outcome = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected {
                retcode: RetCode::InvalidFill,
                ..
            }
        ));
        assert_eq!(broker.requests().len(), 2);
        assert!(broker.open_positions().is_empty());
    }

    #[tokio::test]
    async fn test_other_rejection_not_retried() {
        let broker = broker();
        broker.push_ack(OrderAck::new(RetCode::NoMoney, None, "No money"));

        let outcome = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        assert!(!outcome.is_accepted());
        assert_eq!(broker.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unobserved_fill_is_unlinked() {
        let broker = broker();
        broker.set_hide_fills(true);

        let outcome = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Unlinked { order: Some(1000) });
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_no_tick_sends_nothing() {
        let broker = broker();
        broker.remove_tick("EURUSD");

        let outcome = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::NoQuote);
        assert!(broker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_submit_disconnect_is_error() {
        let broker = broker();
        broker.set_disconnected(true);
        let result = gateway()
            .submit(&broker, "acct", &order(OrderSide::Buy))
            .await;
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_close_by_ticket() {
        let broker = broker();
        let gw = gateway();
        gw.submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        broker.clear_requests();

        let closed = gw
            .close(
                &broker,
                "acct",
                &CloseTarget::ticket(PositionId(1000), Symbol::new("EURUSD")),
            )
            .await
            .unwrap();
        assert!(closed);
        assert!(broker.open_positions().is_empty());

        let requests = broker.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].side, OrderSide::Sell);
        assert_eq!(requests[0].price.inner(), dec!(1.0998));
        assert_eq!(requests[0].position, Some(PositionId(1000)));
        assert_eq!(requests[0].deviation, 100);
        assert_eq!(requests[0].comment, "acct close EURUSD");
    }

    #[tokio::test]
    async fn test_close_falls_back_to_symbol() {
        let broker = broker();
        let gw = gateway();
        gw.submit(&broker, "acct", &order(OrderSide::Sell))
            .await
            .unwrap();

        let closed = gw
            .close(
                &broker,
                "acct",
                &CloseTarget::ticket(PositionId(42), Symbol::new("EURUSD")),
            )
            .await
            .unwrap();
        assert!(closed);
        // Sell position is closed at the ask.
        assert_eq!(broker.requests()[1].price.inner(), dec!(1.1000));
    }

    #[tokio::test]
    async fn test_close_without_position_is_false() {
        let broker = broker();
        let closed = gateway()
            .close(&broker, "acct", &CloseTarget::symbol(Symbol::new("EURUSD")))
            .await
            .unwrap();
        assert!(!closed);
        assert!(broker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_close_exhausts_budget() {
        let broker = broker();
        let gw = gateway();
        gw.submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        broker.clear_requests();
        broker.set_ignore_closes(true);

        let closed = gw
            .close(&broker, "acct", &CloseTarget::symbol(Symbol::new("EURUSD")))
            .await
            .unwrap();
        assert!(!closed);
        assert_eq!(
            broker.requests().len() as u32,
            gw.config().close_retry.max_attempts
        );
        assert_eq!(broker.open_positions().len(), 1);
    }

    #[tokio::test]
    async fn test_close_invalid_fill_uses_alternate() {
        let broker = broker();
        let gw = gateway();
        gw.submit(&broker, "acct", &order(OrderSide::Buy))
            .await
            .unwrap();
        broker.clear_requests();
        broker.push_ack(OrderAck::new(RetCode::InvalidFill, None, ""));

        let closed = gw
            .close(&broker, "acct", &CloseTarget::symbol(Symbol::new("EURUSD")))
            .await
            .unwrap();
        assert!(closed);
        let requests = broker.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].fill_mode, FillMode::ImmediateOrCancel);
    }

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.link_poll, RetryPolicy::fixed(8, 400));
        assert_eq!(config.close_retry, RetryPolicy::fixed(6, 700));
        assert_eq!(config.close_confirm, RetryPolicy::fixed(8, 250));
        assert!(config.validate().is_ok());
    }
}
