//! Overnight financing (swap) guard.
//!
//! Once a day, shortly before rollover, every open order is checked: a
//! profitable position that would pay swap overnight is closed to lock in
//! the profit and its symbol is banned until the next daily reset.

use std::fmt;

use chrono::NaiveTime;
use fxshadow_core::{DailyWindow, OrderSide, SymbolInfo};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Swap guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Divisor applied to the swap rate of instruments not quoted in the
    /// account currency.
    #[serde(default = "default_cross_currency_damping")]
    pub cross_currency_damping: Decimal,
    /// Local-time window in which the daily evaluation runs.
    #[serde(default = "default_evaluation_window")]
    pub evaluation_window: DailyWindow,
    /// Local-time window in which swap bans are cleared.
    #[serde(default = "default_reset_window")]
    pub reset_window: DailyWindow,
}

fn default_cross_currency_damping() -> Decimal {
    Decimal::new(11, 1) // 1.1
}

fn default_evaluation_window() -> DailyWindow {
    hm_window((23, 40), (23, 45))
}

fn default_reset_window() -> DailyWindow {
    hm_window((0, 16), (0, 20))
}

fn hm_window((h1, m1): (u32, u32), (h2, m2): (u32, u32)) -> DailyWindow {
    let time = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
    DailyWindow::new(time(h1, m1), time(h2, m2))
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            cross_currency_damping: default_cross_currency_damping(),
            evaluation_window: default_evaluation_window(),
            reset_window: default_reset_window(),
        }
    }
}

impl SwapConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> RiskResult<()> {
        if self.cross_currency_damping <= Decimal::ZERO {
            return Err(RiskError::ConfigError(format!(
                "cross_currency_damping ({}) must be positive",
                self.cross_currency_damping
            )));
        }
        Ok(())
    }
}

/// Why an order is kept open through rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// Negative swap, but the position is not in profit.
    NegativeSwapNotProfitable,
    /// Swap is credited.
    PositiveSwap,
    /// No swap either way.
    NoSwap,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeSwapNotProfitable => write!(f, "negative swap, not profitable"),
            Self::PositiveSwap => write!(f, "positive swap"),
            Self::NoSwap => write!(f, "no swap"),
        }
    }
}

/// Daily swap decision for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDecision {
    /// Close the position and ban the symbol until the next reset.
    CloseAndBan,
    Keep(KeepReason),
}

/// Swap-cost decision logic.
#[derive(Debug, Clone)]
pub struct SwapGuard {
    config: SwapConfig,
}

impl SwapGuard {
    pub fn new(config: SwapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// Swap rate for `side`, dampened when the instrument does not contain
    /// the account currency.
    pub fn effective_swap(&self, info: &SymbolInfo, side: OrderSide, currency: &str) -> Decimal {
        let raw = info.swap_for(side);
        if info.symbol.contains_currency(currency) {
            raw
        } else {
            raw / self.config.cross_currency_damping
        }
    }

    /// Decide what to do with an order given its swap and current profit.
    pub fn decide(&self, swap: Decimal, profit: Decimal) -> SwapDecision {
        if swap.is_sign_negative() && !swap.is_zero() {
            if profit > Decimal::ZERO {
                SwapDecision::CloseAndBan
            } else {
                SwapDecision::Keep(KeepReason::NegativeSwapNotProfitable)
            }
        } else if swap.is_zero() {
            SwapDecision::Keep(KeepReason::NoSwap)
        } else {
            SwapDecision::Keep(KeepReason::PositiveSwap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxshadow_core::{Symbol, TradeMode};
    use rust_decimal_macros::dec;

    fn info(name: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: Symbol::new(name),
            point: dec!(0.0001),
            digits: 4,
            stops_level: 100,
            filling_mode: 1,
            swap_long: dec!(-1.5),
            swap_short: dec!(0.44),
            trade_mode: TradeMode::Full,
        }
    }

    fn guard() -> SwapGuard {
        SwapGuard::new(SwapConfig::default())
    }

    #[test]
    fn test_negative_swap_profitable_closes() {
        assert_eq!(guard().decide(dec!(-1.5), dec!(3.0)), SwapDecision::CloseAndBan);
    }

    #[test]
    fn test_negative_swap_losing_keeps() {
        assert_eq!(
            guard().decide(dec!(-1.5), dec!(-0.5)),
            SwapDecision::Keep(KeepReason::NegativeSwapNotProfitable)
        );
        assert_eq!(
            guard().decide(dec!(-1.5), dec!(0)),
            SwapDecision::Keep(KeepReason::NegativeSwapNotProfitable)
        );
    }

    #[test]
    fn test_positive_swap_keeps() {
        assert_eq!(
            guard().decide(dec!(0.44), dec!(10)),
            SwapDecision::Keep(KeepReason::PositiveSwap)
        );
        assert_eq!(
            guard().decide(dec!(0), dec!(10)),
            SwapDecision::Keep(KeepReason::NoSwap)
        );
    }

    #[test]
    fn test_effective_swap_dampens_cross_currency() {
        let g = guard();
        assert_eq!(g.effective_swap(&info("EURUSD"), OrderSide::Buy, "USD"), dec!(-1.5));
        assert_eq!(
            g.effective_swap(&info("EURGBP"), OrderSide::Sell, "USD"),
            dec!(0.4)
        );
    }

    #[test]
    fn test_default_windows() {
        let config = SwapConfig::default();
        assert_eq!(config.evaluation_window.to_string(), "23:40-23:45");
        assert_eq!(config.reset_window.to_string(), "00:16-00:20");
    }

    #[test]
    fn test_windows_from_toml() {
        let config: SwapConfig = toml::from_str(
            r#"
            evaluation_window = "22:55-23:05"
            "#,
        )
        .unwrap();
        assert_eq!(config.evaluation_window.to_string(), "22:55-23:05");
        assert_eq!(config.cross_currency_damping, dec!(1.1));
    }
}
