//! Virtual order factory configuration.

use std::collections::BTreeMap;

use fxshadow_core::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PositionError, PositionResult};

/// Configuration for virtual order construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Base real stop/target distance, in points.
    #[serde(default = "default_base_distance_points")]
    pub base_distance_points: u32,
    /// Distance multiplier for exotic pairs.
    #[serde(default = "default_exotic_multiplier")]
    pub exotic_multiplier: Decimal,
    /// Multiple of the broker minimum stop used when levels are too tight.
    #[serde(default = "default_min_stop_correction")]
    pub min_stop_correction: Decimal,
    /// Lot size for new orders.
    #[serde(default = "default_volume")]
    pub default_volume: Decimal,
    /// Exotic pairs by account settlement currency.
    #[serde(default = "default_exotic_pairs")]
    pub exotic_pairs: BTreeMap<String, Vec<String>>,
}

fn default_base_distance_points() -> u32 {
    360
}

fn default_exotic_multiplier() -> Decimal {
    Decimal::from(4)
}

fn default_min_stop_correction() -> Decimal {
    Decimal::new(12, 1) // 1.2
}

fn default_volume() -> Decimal {
    Decimal::new(1, 2) // 0.01 lot
}

fn default_exotic_pairs() -> BTreeMap<String, Vec<String>> {
    let pairs = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
    BTreeMap::from([
        (
            "USD".to_string(),
            pairs(&["USDZAR", "USDMXN", "USDSEK", "USDNOK"]),
        ),
        (
            "EUR".to_string(),
            pairs(&["EURDKK", "EURHKD", "EURSGD", "EURTRY"]),
        ),
    ])
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            base_distance_points: default_base_distance_points(),
            exotic_multiplier: default_exotic_multiplier(),
            min_stop_correction: default_min_stop_correction(),
            default_volume: default_volume(),
            exotic_pairs: default_exotic_pairs(),
        }
    }
}

impl FactoryConfig {
    /// Whether `symbol` is an exotic pair for an account settled in `currency`.
    pub fn is_exotic(&self, symbol: &Symbol, currency: &str) -> bool {
        self.exotic_pairs
            .get(&currency.to_uppercase())
            .is_some_and(|pairs| pairs.iter().any(|p| p.eq_ignore_ascii_case(symbol.as_str())))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> PositionResult<()> {
        if self.base_distance_points == 0 {
            return Err(PositionError::ConfigError(
                "base_distance_points must be positive".to_string(),
            ));
        }
        if self.exotic_multiplier < Decimal::ONE {
            return Err(PositionError::ConfigError(format!(
                "exotic_multiplier ({}) must be at least 1",
                self.exotic_multiplier
            )));
        }
        if self.min_stop_correction <= Decimal::ONE {
            return Err(PositionError::ConfigError(format!(
                "min_stop_correction ({}) must exceed 1",
                self.min_stop_correction
            )));
        }
        if self.default_volume <= Decimal::ZERO {
            return Err(PositionError::ConfigError(format!(
                "default_volume ({}) must be positive",
                self.default_volume
            )));
        }
        Ok(())
    }
}
