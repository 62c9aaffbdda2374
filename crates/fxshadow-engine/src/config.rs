//! Engine configuration.

use chrono::Duration;
use chrono_tz::Tz;
use fxshadow_executor::GatewayConfig;
use fxshadow_position::FactoryConfig;
use fxshadow_risk::{MarginConfig, SwapConfig};
use fxshadow_signal::SignalConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Lifecycle engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay before a reversed order is submitted.
    #[serde(default = "default_reentry_delay_secs")]
    pub reentry_delay_secs: i64,
    /// Symbols containing any of these are never traded.
    #[serde(default = "default_deny_keywords")]
    pub deny_keywords: Vec<String>,
    /// IANA zone the daily windows are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// How long an unlinked open order may wait for its broker position.
    #[serde(default = "default_unlinked_grace_secs")]
    pub unlinked_grace_secs: i64,
}

fn default_reentry_delay_secs() -> i64 {
    9 * 60
}

fn default_deny_keywords() -> Vec<String> {
    [
        "TRY", "INDEX", "XAU", "XPT", "XPD", "XAG", "BTC", "ETH", "LTC", "XRP", "BCH", "DASH",
        "SOL", "UNI", "LINK", "ADA", "DOT", "DOGE", "ZEC", "XLM", "ETC",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_timezone() -> String {
    "Europe/Sofia".to_string()
}

fn default_unlinked_grace_secs() -> i64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reentry_delay_secs: default_reentry_delay_secs(),
            deny_keywords: default_deny_keywords(),
            timezone: default_timezone(),
            unlinked_grace_secs: default_unlinked_grace_secs(),
        }
    }
}

impl EngineConfig {
    pub fn reentry_delay(&self) -> Duration {
        Duration::seconds(self.reentry_delay_secs)
    }

    pub fn unlinked_grace(&self) -> Duration {
        Duration::seconds(self.unlinked_grace_secs)
    }

    /// Parsed time zone.
    pub fn tz(&self) -> EngineResult<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            EngineError::ConfigError(format!("invalid timezone {:?}: {e}", self.timezone))
        })
    }

    /// Validate configuration values.
    pub fn validate(&self) -> EngineResult<()> {
        if self.reentry_delay_secs < 0 {
            return Err(EngineError::ConfigError(format!(
                "reentry_delay_secs ({}) must be non-negative",
                self.reentry_delay_secs
            )));
        }
        if self.unlinked_grace_secs < 0 {
            return Err(EngineError::ConfigError(format!(
                "unlinked_grace_secs ({}) must be non-negative",
                self.unlinked_grace_secs
            )));
        }
        self.tz()?;
        Ok(())
    }
}

/// Configuration of every component the engine drives.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub engine: EngineConfig,
    pub signal: SignalConfig,
    pub factory: FactoryConfig,
    pub gateway: GatewayConfig,
    pub margin: MarginConfig,
    pub swap: SwapConfig,
}

impl EngineSettings {
    /// Validate every section.
    pub fn validate(&self) -> EngineResult<()> {
        let config_err = |e: &dyn std::fmt::Display| EngineError::ConfigError(e.to_string());
        self.engine.validate()?;
        self.signal.validate().map_err(|e| config_err(&e))?;
        self.factory.validate().map_err(|e| config_err(&e))?;
        self.gateway.validate().map_err(|e| config_err(&e))?;
        self.margin.validate().map_err(|e| config_err(&e))?;
        self.swap.validate().map_err(|e| config_err(&e))?;
        Ok(())
    }
}
