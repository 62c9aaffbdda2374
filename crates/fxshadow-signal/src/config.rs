//! Signal configuration.

use fxshadow_core::Timeframe;
use serde::{Deserialize, Serialize};

use crate::error::{SignalError, SignalResult};

/// Configuration for the EMA crossover signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Bar timeframe for the history query.
    #[serde(default)]
    pub timeframe: Timeframe,
    /// Number of most recent bars fetched per evaluation.
    #[serde(default = "default_bar_count")]
    pub bar_count: usize,
    /// Fast EMA span.
    #[serde(default = "default_fast_span")]
    pub fast_span: usize,
    /// Slow EMA span.
    #[serde(default = "default_slow_span")]
    pub slow_span: usize,
}

fn default_bar_count() -> usize {
    300
}

fn default_fast_span() -> usize {
    8
}

fn default_slow_span() -> usize {
    21
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::M5,
            bar_count: default_bar_count(),
            fast_span: default_fast_span(),
            slow_span: default_slow_span(),
        }
    }
}

impl SignalConfig {
    /// Minimum number of bars needed for a signal.
    pub fn min_bars(&self) -> usize {
        self.slow_span + 2
    }

    /// Validate configuration values.
    pub fn validate(&self) -> SignalResult<()> {
        if self.fast_span == 0 {
            return Err(SignalError::ConfigError(
                "fast_span must be positive".to_string(),
            ));
        }
        if self.fast_span >= self.slow_span {
            return Err(SignalError::ConfigError(format!(
                "fast_span ({}) must be less than slow_span ({})",
                self.fast_span, self.slow_span
            )));
        }
        if self.bar_count < self.min_bars() {
            return Err(SignalError::ConfigError(format!(
                "bar_count ({}) must be at least slow_span + 2 ({})",
                self.bar_count,
                self.min_bars()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        let config = SignalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_bars(), 23);
    }

    #[test]
    fn test_spans_must_be_ordered() {
        let config = SignalConfig {
            fast_span: 21,
            slow_span: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bar_count_covers_slow_span() {
        let config = SignalConfig {
            bar_count: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
