//! EMA crossover signal.

use fxshadow_broker::{recover, BrokerOracle, BrokerResult};
use fxshadow_core::{Bar, OrderSide, Symbol};
use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::config::SignalConfig;
use crate::ema::ewm_mean;

/// Decimal places at which the two averages are compared.
const COMPARE_DP: u32 = 10;

/// Crossover signal for a bar history (oldest first).
///
/// Returns `None` when fewer than `slow_span + 2` bars are supplied or when
/// the two averages are equal on the latest bar.
pub fn crossover_signal(bars: &[Bar], fast_span: usize, slow_span: usize) -> Option<OrderSide> {
    if bars.len() < slow_span + 2 {
        return None;
    }

    let closes: Vec<Decimal> = bars.iter().map(|b| b.close.inner()).collect();
    let fast = ewm_mean(&closes, fast_span)?.round_dp(COMPARE_DP);
    let slow = ewm_mean(&closes, slow_span)?.round_dp(COMPARE_DP);
    trace!(%fast, %slow, bars = bars.len(), "EMA values");

    match fast.cmp(&slow) {
        std::cmp::Ordering::Greater => Some(OrderSide::Buy),
        std::cmp::Ordering::Less => Some(OrderSide::Sell),
        std::cmp::Ordering::Equal => None,
    }
}

/// Fetches bar history from the broker and derives the crossover signal.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Current signal for `symbol`.
    ///
    /// An unavailable history yields `Ok(None)`; only a lost connection is
    /// an error.
    pub async fn signal(
        &self,
        broker: &dyn BrokerOracle,
        symbol: &Symbol,
    ) -> BrokerResult<Option<OrderSide>> {
        let bars = recover(
            broker
                .bars(symbol, self.config.timeframe, self.config.bar_count)
                .await,
            "bars",
        )?;

        if bars.len() < self.config.min_bars() {
            debug!(
                symbol = %symbol,
                bars = bars.len(),
                needed = self.config.min_bars(),
                "Not enough bars for signal"
            );
            return Ok(None);
        }

        Ok(crossover_signal(
            &bars,
            self.config.fast_span,
            self.config.slow_span,
        ))
    }
}
