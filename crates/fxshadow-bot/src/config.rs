//! Application configuration.

use crate::error::{AppError, AppResult};
use fxshadow_broker::Credentials;
use fxshadow_engine::{EngineConfig, EngineSettings};
use fxshadow_executor::GatewayConfig;
use fxshadow_position::FactoryConfig;
use fxshadow_risk::{MarginConfig, SwapConfig};
use fxshadow_signal::SignalConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One trading account.
///
/// The password is never stored in the file; `password_env` names the
/// environment variable holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub login: u64,
    pub server: String,
    pub password_env: String,
}

impl AccountConfig {
    /// Resolve credentials from the environment.
    pub fn credentials(&self) -> AppResult<Credentials> {
        let password = std::env::var(&self.password_env).map_err(|_| {
            AppError::Config(format!(
                "account {}: environment variable {} is not set",
                self.name, self.password_env
            ))
        })?;
        Ok(Credentials::new(self.login, password, self.server.clone()))
    }
}

/// Account rotation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Time spent logged in to one account (ms). Default: 40,000.
    #[serde(default = "default_session_duration_ms")]
    pub duration_ms: u64,
    /// Pause between lifecycle cycles (ms). Default: 3,000.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Pause after logging out of an account (ms). Default: 3,000.
    #[serde(default = "default_rotation_pause_ms")]
    pub rotation_pause_ms: u64,
    /// Pause after every account has had a session (ms). Default: 5,000.
    #[serde(default = "default_full_rotation_pause_ms")]
    pub full_rotation_pause_ms: u64,
}

fn default_session_duration_ms() -> u64 {
    40_000
}

fn default_cycle_interval_ms() -> u64 {
    3_000
}

fn default_rotation_pause_ms() -> u64 {
    3_000
}

fn default_full_rotation_pause_ms() -> u64 {
    5_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_session_duration_ms(),
            cycle_interval_ms: default_cycle_interval_ms(),
            rotation_pause_ms: default_rotation_pause_ms(),
            full_rotation_pause_ms: default_full_rotation_pause_ms(),
        }
    }
}

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn rotation_pause(&self) -> Duration {
        Duration::from_millis(self.rotation_pause_ms)
    }

    pub fn full_rotation_pause(&self) -> Duration {
        Duration::from_millis(self.full_rotation_pause_ms)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.duration_ms == 0 {
            return Err(AppError::Config(
                "session.duration_ms must be positive".to_string(),
            ));
        }
        if self.cycle_interval_ms == 0 {
            return Err(AppError::Config(
                "session.cycle_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Terminal bridge root URL.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Prometheus text file rewritten after every full rotation.
    #[serde(default)]
    pub metrics_file: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub factory: FactoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub margin: MarginConfig,
    #[serde(default)]
    pub swap: SwapConfig,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:18812".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            metrics_file: None,
            accounts: Vec::new(),
            session: SessionConfig::default(),
            engine: EngineConfig::default(),
            signal: SignalConfig::default(),
            factory: FactoryConfig::default(),
            gateway: GatewayConfig::default(),
            margin: MarginConfig::default(),
            swap: SwapConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file and validate.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Engine component settings.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            engine: self.engine.clone(),
            signal: self.signal.clone(),
            factory: self.factory.clone(),
            gateway: self.gateway.clone(),
            margin: self.margin.clone(),
            swap: self.swap.clone(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.accounts.is_empty() {
            return Err(AppError::Config("no [[accounts]] configured".to_string()));
        }
        let mut names = HashSet::new();
        let mut logins = HashSet::new();
        for account in &self.accounts {
            if !names.insert(account.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate account name {}",
                    account.name
                )));
            }
            if !logins.insert(account.login) {
                return Err(AppError::Config(format!(
                    "duplicate account login {}",
                    account.login
                )));
            }
        }
        self.session.validate()?;
        self.settings().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"
        [[accounts]]
        name = "demo-usd"
        login = 5001
        server = "Demo-Server"
        password_env = "FXSHADOW_TEST_PW_MINIMAL"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.bridge_url, "http://127.0.0.1:18812");
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.session.duration(), Duration::from_secs(40));
        assert_eq!(config.session.cycle_interval(), Duration::from_secs(3));
        assert_eq!(config.engine.timezone, "Europe/Sofia");
        assert_eq!(config.signal.slow_span, 21);
        assert_eq!(config.margin.safety_buffer, dec!(50));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let content = include_str!("../config/default.toml");
        let config = AppConfig::from_toml(content).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.engine.reentry_delay_secs, 540);
        assert_eq!(config.swap.evaluation_window.to_string(), "23:40-23:45");
    }

    #[test]
    fn test_sections_override_defaults() {
        let content = format!(
            "{MINIMAL}\n[session]\nduration_ms = 1000\n[engine]\ntimezone = \"UTC\"\n[signal]\nfast_span = 5\nslow_span = 13\n"
        );
        let config = AppConfig::from_toml(&content).unwrap();
        assert_eq!(config.session.duration_ms, 1000);
        assert_eq!(config.session.rotation_pause_ms, 3000);
        assert_eq!(config.engine.timezone, "UTC");
        assert_eq!(config.signal.fast_span, 5);
    }

    #[test]
    fn test_rejects_invalid_sections() {
        let no_accounts = AppConfig::from_toml("bridge_url = \"http://x\"");
        assert!(matches!(no_accounts, Err(AppError::Config(_))));

        let bad_spans = format!("{MINIMAL}\n[signal]\nfast_span = 30\nslow_span = 21\n");
        assert!(AppConfig::from_toml(&bad_spans).is_err());

        let bad_zone = format!("{MINIMAL}\n[engine]\ntimezone = \"Mars/Olympus\"\n");
        assert!(AppConfig::from_toml(&bad_zone).is_err());

        let zero_cycle = format!("{MINIMAL}\n[session]\ncycle_interval_ms = 0\n");
        assert!(AppConfig::from_toml(&zero_cycle).is_err());
    }

    #[test]
    fn test_rejects_duplicate_accounts() {
        let content = format!(
            "{MINIMAL}\n[[accounts]]\nname = \"demo-usd\"\nlogin = 5002\nserver = \"s\"\npassword_env = \"X\"\n"
        );
        assert!(AppConfig::from_toml(&content).is_err());
    }

    #[test]
    fn test_credentials_from_env() {
        let account = AccountConfig {
            name: "demo".to_string(),
            login: 7,
            server: "Demo".to_string(),
            password_env: "FXSHADOW_TEST_PW_SET".to_string(),
        };
        std::env::set_var("FXSHADOW_TEST_PW_SET", "hunter2");
        let creds = account.credentials().unwrap();
        assert_eq!(creds.login, 7);
        assert_eq!(creds.password.as_str(), "hunter2");

        let missing = AccountConfig {
            password_env: "FXSHADOW_TEST_PW_UNSET".to_string(),
            ..account
        };
        assert!(missing.credentials().is_err());
    }
}
