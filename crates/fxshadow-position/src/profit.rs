//! Unrealized profit estimation.

use fxshadow_core::{OrderSide, ShadowOrder, Tick};
use rust_decimal::Decimal;
use serde::Serialize;

/// Account settlement context needed for currency conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyContext {
    /// Settlement currency, upper-case.
    pub currency: String,
    /// Live EURUSD bid, when available.
    pub eurusd_bid: Option<Decimal>,
}

impl CurrencyContext {
    pub fn new(currency: impl Into<String>, eurusd_bid: Option<Decimal>) -> Self {
        Self {
            currency: currency.into().to_uppercase(),
            eurusd_bid,
        }
    }

    pub fn is_eur(&self) -> bool {
        self.currency == "EUR"
    }
}

/// Unrealized profit of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Profit {
    /// Directional pip delta, 2 dp.
    pub pips: Decimal,
    /// Profit in settlement currency, 2 dp.
    pub amount: Decimal,
}

/// Estimate of an open order's unrealized profit.
pub trait ProfitModel: Send + Sync {
    fn evaluate(&self, order: &ShadowOrder, tick: &Tick, ctx: &CurrencyContext) -> Profit;
}

/// Fixed pip-value approximation.
///
/// Values a pip at `pip_value_per_lot` US dollars per standard lot for every
/// instrument, then converts to EUR via the live EURUSD bid (or a fixed
/// fallback rate) for EUR accounts.
#[derive(Debug, Clone)]
pub struct PipValueModel {
    pub pip_value_per_lot: Decimal,
    pub eur_fallback_rate: Decimal,
}

impl Default for PipValueModel {
    fn default() -> Self {
        Self {
            pip_value_per_lot: Decimal::TEN,
            eur_fallback_rate: Decimal::new(92, 2),
        }
    }
}

impl PipValueModel {
    /// Pip size: 0.01 for yen-quoted pairs, 0.0001 otherwise.
    pub fn pip_size(order: &ShadowOrder) -> Decimal {
        if order.symbol.is_yen_quoted() {
            Decimal::new(1, 2)
        } else {
            Decimal::new(1, 4)
        }
    }
}

impl ProfitModel for PipValueModel {
    fn evaluate(&self, order: &ShadowOrder, tick: &Tick, ctx: &CurrencyContext) -> Profit {
        let current = tick.entry_price(order.side).inner();
        let entry = order.entry_price.inner();
        let delta = match order.side {
            OrderSide::Buy => current - entry,
            OrderSide::Sell => entry - current,
        };
        let pips = delta / Self::pip_size(order);
        let usd = pips * self.pip_value_per_lot * order.volume.inner();

        let amount = if ctx.is_eur() {
            match ctx.eurusd_bid {
                Some(bid) if bid > Decimal::ZERO => usd / bid,
                _ => usd * self.eur_fallback_rate,
            }
        } else {
            usd
        };

        Profit {
            pips: pips.round_dp(2),
            amount: amount.round_dp(2),
        }
    }
}
