//! Margin and stop-out gate.

use fxshadow_broker::{recover, BrokerOracle, BrokerResult};
use fxshadow_core::{AccountSummary, OrderSide, Size, StopOutMode, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RiskError, RiskResult};

/// Gate check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Gate passed.
    Pass,
    /// Gate blocked with reason.
    Block(String),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }
}

/// Margin gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginConfig {
    /// Equity required above the stop-out equity, in account currency.
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: Decimal,
    /// Also require free margin for the specific order.
    #[serde(default = "default_check_symbol_margin")]
    pub check_symbol_margin: bool,
}

fn default_safety_buffer() -> Decimal {
    Decimal::from(50)
}

fn default_check_symbol_margin() -> bool {
    true
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            safety_buffer: default_safety_buffer(),
            check_symbol_margin: default_check_symbol_margin(),
        }
    }
}

impl MarginConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> RiskResult<()> {
        if self.safety_buffer.is_sign_negative() {
            return Err(RiskError::ConfigError(format!(
                "safety_buffer ({}) must be non-negative",
                self.safety_buffer
            )));
        }
        Ok(())
    }
}

/// Blocks new positions when equity is too close to stop-out.
#[derive(Debug, Clone)]
pub struct MarginGate {
    config: MarginConfig,
}

impl MarginGate {
    pub fn new(config: MarginConfig) -> Self {
        Self { config }
    }

    /// Equity at which the broker would stop the account out.
    pub fn stop_out_equity(account: &AccountSummary) -> Decimal {
        match account.stop_out_mode {
            StopOutMode::Percent => account.margin * account.stop_out_level / Decimal::ONE_HUNDRED,
            StopOutMode::Money => account.stop_out_level,
        }
    }

    /// Evaluate an account summary, with the order's required margin if known.
    pub fn evaluate(&self, account: &AccountSummary, required_margin: Option<Decimal>) -> GateResult {
        let min_equity = Self::stop_out_equity(account) + self.config.safety_buffer;
        if account.equity <= min_equity {
            return GateResult::Block(format!(
                "too close to stop-out: equity={} required>{}",
                account.equity.round_dp(2),
                min_equity.round_dp(2)
            ));
        }

        if let Some(required) = required_margin {
            if account.margin_free < required {
                return GateResult::Block(format!(
                    "not enough free margin: required={} free={}",
                    required.round_dp(2),
                    account.margin_free.round_dp(2)
                ));
            }
        }

        GateResult::Pass
    }

    /// Check whether a new position of `volume` on `symbol` may be opened.
    ///
    /// Missing account data blocks. A required margin the broker cannot
    /// quote skips the symbol-specific part.
    pub async fn check(
        &self,
        broker: &dyn BrokerOracle,
        symbol: &Symbol,
        side: OrderSide,
        volume: Size,
    ) -> BrokerResult<GateResult> {
        let Some(account) = recover(broker.account().await, "account")? else {
            return Ok(GateResult::Block("account info unavailable".to_string()));
        };

        let mut required = None;
        if self.config.check_symbol_margin && volume.is_positive() {
            let Some(tick) = recover(broker.tick(symbol).await, "tick")? else {
                return Ok(GateResult::Block(format!("no tick for {symbol}")));
            };
            required = recover(
                broker
                    .margin_required(symbol, side, volume, tick.entry_price(side))
                    .await,
                "margin_required",
            )?;
        }

        let result = self.evaluate(&account, required);
        if let GateResult::Block(reason) = &result {
            warn!(symbol = %symbol, reason = %reason, "Margin gate blocked");
        }
        Ok(result)
    }
}
