//! Virtual order factory.
//!
//! Real levels are what the broker holds; virtual levels sit at half the
//! real distance and are what the monitor acts on. Real levels always clear
//! the broker's minimum stop distance.

use chrono::{DateTime, Utc};
use fxshadow_broker::{recover, BrokerOracle, BrokerResult};
use fxshadow_core::{
    BrokerPosition, OrderId, OrderSide, OrderState, Price, ShadowOrder, Size, Symbol, SymbolInfo,
    Tick,
};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::FactoryConfig;
use crate::error::{PositionError, PositionResult};

/// Target/stop price levels of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    pub virtual_tp: Price,
    pub virtual_sl: Price,
    pub real_tp: Price,
    pub real_sl: Price,
    pub real_distance: Price,
    pub virtual_distance: Price,
}

/// Places levels for `side` at `distance` around the quote.
///
/// Targets are measured from the entry side of the book, stops from the
/// exit side (buy: target above ask, stop below bid; sell mirrors it).
fn place(tick: &Tick, side: OrderSide, distance: Price, digits: u32) -> (Price, Price) {
    let entry = tick.entry_price(side);
    let exit = tick.exit_price(side);
    match side {
        OrderSide::Buy => (
            (entry + distance).round_digits(digits),
            (exit - distance).round_digits(digits),
        ),
        OrderSide::Sell => (
            (entry - distance).round_digits(digits),
            (exit + distance).round_digits(digits),
        ),
    }
}

/// Whether both real levels are strictly farther than `min_stop` from the quote.
fn clears_min_stop(tick: &Tick, side: OrderSide, tp: Price, sl: Price, min_stop: Price) -> bool {
    tp.distance(tick.entry_price(side)) > min_stop && sl.distance(tick.exit_price(side)) > min_stop
}

/// Builds shadow orders from live quotes and instrument metadata.
#[derive(Debug, Clone)]
pub struct VirtualOrderFactory {
    config: FactoryConfig,
}

impl VirtualOrderFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn default_volume(&self) -> Size {
        Size::new(self.config.default_volume)
    }

    /// Real distance before minimum-stop validation:
    /// `max(base, 2 x min_stop)`, widened for exotic pairs.
    pub fn real_distance(&self, info: &SymbolInfo, currency: &str) -> Price {
        let base = info.points(self.config.base_distance_points);
        let floor = info.min_stop_distance() * Decimal::TWO;
        let distance = if base > floor { base } else { floor };
        if self.config.is_exotic(&info.symbol, currency) {
            distance * self.config.exotic_multiplier
        } else {
            distance
        }
    }

    /// Compute order levels for `side` at the current quote.
    pub fn levels(&self, info: &SymbolInfo, tick: &Tick, side: OrderSide, currency: &str) -> Levels {
        let min_stop = info.min_stop_distance();
        let mut real_distance = self.real_distance(info, currency);
        let (mut real_tp, mut real_sl) = place(tick, side, real_distance, info.digits);

        if !clears_min_stop(tick, side, real_tp, real_sl, min_stop) {
            real_distance = min_stop * self.config.min_stop_correction;
            (real_tp, real_sl) = place(tick, side, real_distance, info.digits);
            info!(
                symbol = %info.symbol,
                distance = %real_distance,
                "Adjusted real levels to clear broker minimum stop"
            );
        }

        let virtual_distance = real_distance / Decimal::TWO;
        let (virtual_tp, virtual_sl) = place(tick, side, virtual_distance, info.digits);

        Levels {
            virtual_tp,
            virtual_sl,
            real_tp,
            real_sl,
            real_distance,
            virtual_distance,
        }
    }

    /// Build a pending shadow order from known quote and metadata.
    pub fn build_from(
        &self,
        info: &SymbolInfo,
        tick: &Tick,
        side: OrderSide,
        volume: Size,
        currency: &str,
        now: DateTime<Utc>,
    ) -> PositionResult<ShadowOrder> {
        if !tick.bid.is_positive() || tick.ask < tick.bid {
            return Err(PositionError::InvalidQuote {
                symbol: info.symbol.to_string(),
                reason: format!("bid={} ask={}", tick.bid, tick.ask),
            });
        }

        let levels = self.levels(info, tick, side, currency);
        let order = ShadowOrder {
            id: OrderId::new(&info.symbol),
            symbol: info.symbol.clone(),
            side,
            volume,
            entry_price: tick.entry_price(side),
            virtual_tp: levels.virtual_tp,
            virtual_sl: levels.virtual_sl,
            real_tp: Some(levels.real_tp),
            real_sl: Some(levels.real_sl),
            spread: tick.spread().round_digits(info.digits),
            fill_mode: info.preferred_fill_mode(),
            created_at: now,
            opened_at: None,
            linked_position: None,
            is_virtual: true,
            state: OrderState::Pending,
        };

        info!(
            symbol = %order.symbol,
            side = %side,
            spread = %order.spread,
            fill_mode = %order.fill_mode,
            virtual_tp = %order.virtual_tp,
            virtual_sl = %order.virtual_sl,
            "Virtual order created"
        );
        Ok(order)
    }

    /// Build a pending shadow order from the broker's current quote.
    ///
    /// `Ok(None)` when the quote or metadata is unavailable.
    pub async fn build(
        &self,
        broker: &dyn BrokerOracle,
        symbol: &Symbol,
        side: OrderSide,
        volume: Size,
        currency: &str,
        now: DateTime<Utc>,
    ) -> BrokerResult<Option<ShadowOrder>> {
        let info = recover(broker.symbol_info(symbol).await, "symbol_info")?;
        let tick = recover(broker.tick(symbol).await, "tick")?;
        let (Some(info), Some(tick)) = (info, tick) else {
            debug!(symbol = %symbol, "Missing tick or symbol info");
            return Ok(None);
        };

        match self.build_from(&info, &tick, side, volume, currency, now) {
            Ok(order) => Ok(Some(order)),
            Err(e) => {
                debug!(error = %e, "Virtual order not built");
                Ok(None)
            }
        }
    }

    /// Shadow an existing broker position.
    ///
    /// Virtual levels sit at half the distance from the open price to the
    /// position's own target/stop. A missing target or stop is replaced by
    /// the factory's real distance for that side.
    pub fn shadow_position(
        &self,
        position: &BrokerPosition,
        info: &SymbolInfo,
        tick: &Tick,
        currency: &str,
        now: DateTime<Utc>,
    ) -> ShadowOrder {
        let entry = position.price_open;
        let fallback = self.real_distance(info, currency);
        let tp_distance = position
            .take_profit
            .map_or(fallback, |tp| tp.distance(entry));
        let sl_distance = position.stop_loss.map_or(fallback, |sl| sl.distance(entry));

        let half_tp = tp_distance / Decimal::TWO;
        let half_sl = sl_distance / Decimal::TWO;
        let (virtual_tp, virtual_sl) = match position.side {
            OrderSide::Buy => (entry + half_tp, entry - half_sl),
            OrderSide::Sell => (entry - half_tp, entry + half_sl),
        };

        ShadowOrder {
            id: OrderId::for_position(position.ticket),
            symbol: position.symbol.clone(),
            side: position.side,
            volume: position.volume,
            entry_price: entry,
            virtual_tp: virtual_tp.round_digits(info.digits),
            virtual_sl: virtual_sl.round_digits(info.digits),
            real_tp: position.take_profit.map(|p| p.round_digits(info.digits)),
            real_sl: position.stop_loss.map(|p| p.round_digits(info.digits)),
            spread: tick.spread().round_digits(info.digits),
            fill_mode: info.preferred_fill_mode(),
            created_at: now,
            opened_at: Some(now),
            linked_position: Some(position.ticket),
            is_virtual: false,
            state: OrderState::Open,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxshadow_broker::{fx_symbol, FakeBroker};
    use fxshadow_core::{FillMode, PositionId};
    use rust_decimal_macros::dec;

    fn eurusd() -> SymbolInfo {
        fx_symbol("EURUSD", 4)
    }

    fn tick(bid: Decimal, ask: Decimal) -> Tick {
        Tick::new(Price::new(bid), Price::new(ask), Utc::now())
    }

    fn factory() -> VirtualOrderFactory {
        VirtualOrderFactory::new(FactoryConfig::default())
    }

    #[test]
    fn test_buy_levels_reference_scenario() {
        let levels = factory().levels(
            &eurusd(),
            &tick(dec!(1.0998), dec!(1.1000)),
            OrderSide::Buy,
            "USD",
        );

        assert_eq!(levels.real_distance.inner(), dec!(0.0360));
        assert_eq!(levels.virtual_distance.inner(), dec!(0.0180));
        assert_eq!(levels.virtual_tp.inner(), dec!(1.1180));
        assert_eq!(levels.virtual_sl.inner(), dec!(1.0818));
        assert_eq!(levels.real_tp.inner(), dec!(1.1360));
        assert_eq!(levels.real_sl.inner(), dec!(1.0638));
    }

    #[test]
    fn test_sell_levels_mirror() {
        let levels = factory().levels(
            &eurusd(),
            &tick(dec!(1.0998), dec!(1.1000)),
            OrderSide::Sell,
            "USD",
        );

        assert_eq!(levels.virtual_tp.inner(), dec!(1.0818));
        assert_eq!(levels.virtual_sl.inner(), dec!(1.1180));
        assert_eq!(levels.real_tp.inner(), dec!(1.0638));
        assert_eq!(levels.real_sl.inner(), dec!(1.1360));
    }

    #[test]
    fn test_virtual_distance_is_half_real() {
        let f = factory();
        for stops_level in [0u32, 50, 100, 179, 180, 181, 400, 1000] {
            let mut info = eurusd();
            info.stops_level = stops_level;
            for side in [OrderSide::Buy, OrderSide::Sell] {
                let levels = f.levels(&info, &tick(dec!(1.0998), dec!(1.1000)), side, "USD");
                assert_eq!(
                    levels.virtual_distance.inner() * dec!(2),
                    levels.real_distance.inner()
                );
            }
        }
    }

    #[test]
    fn test_min_stop_floor_applies() {
        // min stop 200 points: 2 x 0.02 = 0.04 beats the 0.036 base.
        let mut info = eurusd();
        info.stops_level = 200;
        let levels = factory().levels(
            &info,
            &tick(dec!(1.0998), dec!(1.1000)),
            OrderSide::Buy,
            "USD",
        );
        assert_eq!(levels.real_distance.inner(), dec!(0.0400));
        assert!(levels.real_distance.inner() >= info.min_stop_distance().inner() * dec!(2));
    }

    #[test]
    fn test_exotic_pair_widened() {
        let info = fx_symbol("USDZAR", 4);
        let levels = factory().levels(
            &info,
            &tick(dec!(18.2000), dec!(18.2100)),
            OrderSide::Buy,
            "USD",
        );
        assert_eq!(levels.real_distance.inner(), dec!(0.1440));

        let eur_account = factory().levels(
            &info,
            &tick(dec!(18.2000), dec!(18.2100)),
            OrderSide::Buy,
            "EUR",
        );
        assert_eq!(eur_account.real_distance.inner(), dec!(0.0360));
    }

    #[test]
    fn test_correction_when_rounding_eats_distance() {
        // Coarse digits round the real levels back onto the quote.
        let mut info = eurusd();
        info.digits = 1;
        info.stops_level = 10;
        let config = FactoryConfig {
            base_distance_points: 20,
            ..Default::default()
        };
        let levels = VirtualOrderFactory::new(config).levels(
            &info,
            &tick(dec!(1.1000), dec!(1.1000)),
            OrderSide::Buy,
            "USD",
        );
        // 1.2 x min stop (0.001)
        assert_eq!(levels.real_distance.inner(), dec!(0.0012));
        assert_eq!(levels.virtual_distance.inner(), dec!(0.0006));
    }

    #[test]
    fn test_clears_min_stop_is_strict() {
        let t = tick(dec!(1.0998), dec!(1.1000));
        let min_stop = Price::new(dec!(0.0100));
        assert!(!clears_min_stop(
            &t,
            OrderSide::Buy,
            Price::new(dec!(1.1100)),
            Price::new(dec!(1.0700)),
            min_stop
        ));
        assert!(clears_min_stop(
            &t,
            OrderSide::Buy,
            Price::new(dec!(1.1101)),
            Price::new(dec!(1.0897)),
            min_stop
        ));
    }

    #[test]
    fn test_build_from_records_spread_and_fill_mode() {
        let mut info = eurusd();
        info.filling_mode = 2;
        let order = factory()
            .build_from(
                &info,
                &tick(dec!(1.0998), dec!(1.1000)),
                OrderSide::Buy,
                Size::new(dec!(0.01)),
                "USD",
                Utc::now(),
            )
            .unwrap();

        assert_eq!(order.spread.inner(), dec!(0.0002));
        assert_eq!(order.fill_mode, FillMode::ImmediateOrCancel);
        assert_eq!(order.entry_price.inner(), dec!(1.1000));
        assert!(order.is_virtual);
        assert_eq!(order.state, OrderState::Pending);
        assert_eq!(order.real_tp, Some(Price::new(dec!(1.1360))));
    }

    #[test]
    fn test_build_from_rejects_crossed_quote() {
        let result = factory().build_from(
            &eurusd(),
            &tick(dec!(1.1000), dec!(1.0990)),
            OrderSide::Buy,
            Size::new(dec!(0.01)),
            "USD",
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_without_quote_is_none() {
        let broker = FakeBroker::new();
        broker.set_symbol_info(eurusd());
        let order = factory()
            .build(
                &broker,
                &Symbol::new("EURUSD"),
                OrderSide::Buy,
                Size::new(dec!(0.01)),
                "USD",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(order.is_none());

        broker.set_tick("EURUSD", dec!(1.0998), dec!(1.1000));
        let order = factory()
            .build(
                &broker,
                &Symbol::new("EURUSD"),
                OrderSide::Buy,
                Size::new(dec!(0.01)),
                "USD",
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(order.unwrap().virtual_tp.inner(), dec!(1.1180));
    }

    #[test]
    fn test_shadow_position_half_distances() {
        let position = BrokerPosition {
            ticket: PositionId(77),
            symbol: Symbol::new("EURUSD"),
            side: OrderSide::Sell,
            volume: Size::new(dec!(0.02)),
            price_open: Price::new(dec!(1.1000)),
            stop_loss: Some(Price::new(dec!(1.1200))),
            take_profit: None,
            opened_at: Utc::now(),
        };
        let order = factory().shadow_position(
            &position,
            &eurusd(),
            &tick(dec!(1.0998), dec!(1.1000)),
            "USD",
            Utc::now(),
        );

        assert_eq!(order.virtual_sl.inner(), dec!(1.1100));
        // No target: half of the 0.036 factory distance.
        assert_eq!(order.virtual_tp.inner(), dec!(1.0820));
        assert_eq!(order.linked_position, Some(PositionId(77)));
        assert!(!order.is_virtual);
        assert_eq!(order.state, OrderState::Open);
        assert_eq!(order.real_tp, None);
    }
}
