//! Account rotation.
//!
//! Accounts are served strictly one at a time. Each gets a bounded session:
//! login, a lifecycle cycle every `cycle_interval`, logout once the session
//! expires or the connection drops. Ctrl-C is honored between cycles.

use crate::config::AppConfig;
use crate::error::AppResult;
use fxshadow_broker::{BridgeClient, BrokerOracle, BrokerSession};
use fxshadow_core::{Clock, SystemClock};
use fxshadow_engine::{AccountRegistry, EngineError, LifecycleEngine};
use fxshadow_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// How one account session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Session duration elapsed.
    Expired,
    /// Login failed; the account is skipped this rotation.
    LoginFailed,
    /// The broker connection dropped mid-session.
    ConnectionLost,
    /// Shutdown was requested.
    Shutdown,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    session: Arc<dyn BrokerSession>,
    engine: LifecycleEngine,
    registry: AccountRegistry,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Application {
    /// Create the application against the configured terminal bridge.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let bridge = Arc::new(BridgeClient::new(config.bridge_url.clone())?);
        Self::with_broker(config, bridge, Arc::new(SystemClock))
    }

    /// Create the application against any broker.
    pub fn with_broker<B>(config: AppConfig, broker: Arc<B>, clock: Arc<dyn Clock>) -> AppResult<Self>
    where
        B: BrokerOracle + BrokerSession + 'static,
    {
        let engine = LifecycleEngine::new(broker.clone(), clock, config.settings())?;

        let mut registry = AccountRegistry::new();
        for account in &config.accounts {
            let credentials = account.credentials()?;
            registry.register(engine.new_account(account.name.clone(), credentials))?;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            session: broker,
            engine,
            registry,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Stop after the current cycle.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Rotate through every account until Ctrl-C.
    pub async fn run(mut self) -> AppResult<()> {
        let tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = tx.send(true);
            }
        });

        info!(
            accounts = ?self.registry.names(),
            session_ms = self.config.session.duration_ms,
            cycle_ms = self.config.session.cycle_interval_ms,
            "Entering rotation loop"
        );

        while !self.is_shutdown() {
            self.run_rotation().await?;
            if self.is_shutdown() {
                break;
            }
            let pause = self.config.session.full_rotation_pause();
            debug!(pause_ms = pause.as_millis() as u64, "Full rotation complete");
            self.pause(pause).await;
        }

        info!("Rotation loop stopped");
        Ok(())
    }

    /// Give every registered account one session.
    pub async fn run_rotation(&mut self) -> AppResult<()> {
        for name in self.registry.names() {
            let outcome = self.run_session(&name).await?;
            info!(account = %name, ?outcome, "Session ended");
            if outcome == SessionOutcome::Shutdown {
                return Ok(());
            }
            self.pause(self.config.session.rotation_pause()).await;
            if self.is_shutdown() {
                return Ok(());
            }
        }
        self.write_metrics().await;
        Ok(())
    }

    /// Log in to `name`, cycle until the session expires, log out.
    pub async fn run_session(&mut self, name: &str) -> AppResult<SessionOutcome> {
        let Some(account) = self.registry.get_mut(name) else {
            return Err(EngineError::UnknownAccount(name.to_string()).into());
        };

        if let Err(e) = account.connect(self.session.as_ref()).await {
            warn!(account = %name, error = %e, "Login failed, skipping account");
            return Ok(SessionOutcome::LoginFailed);
        }

        let deadline = Instant::now() + self.config.session.duration();
        let outcome = loop {
            if *self.shutdown_rx.borrow() {
                break SessionOutcome::Shutdown;
            }
            if Instant::now() >= deadline {
                break SessionOutcome::Expired;
            }

            match self.engine.run_once(account).await {
                Ok(report) => debug!(account = %name, ?report, "Cycle finished"),
                Err(EngineError::ConnectionLost { source, .. }) => {
                    error!(account = %name, error = %source, "Connection lost, rotating");
                    break SessionOutcome::ConnectionLost;
                }
                Err(e) => {
                    warn!(account = %name, error = %e, "Cycle failed");
                    break SessionOutcome::ConnectionLost;
                }
            }

            let wait = self
                .config
                .session
                .cycle_interval()
                .min(deadline.saturating_duration_since(Instant::now()));
            if wait_or_shutdown(&mut self.shutdown_rx, wait).await {
                break SessionOutcome::Shutdown;
            }
        };

        account.disconnect(self.session.as_ref()).await;
        Ok(outcome)
    }

    async fn pause(&mut self, duration: Duration) {
        wait_or_shutdown(&mut self.shutdown_rx, duration).await;
    }

    async fn write_metrics(&self) {
        let Some(path) = &self.config.metrics_file else {
            return;
        };
        let text = match Metrics::render() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to render metrics");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, text).await {
            warn!(path = %path, error = %e, "Failed to write metrics file");
        }
    }
}

/// Sleep for `duration`; returns true early if shutdown is requested.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_ok() && *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountConfig, SessionConfig};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use fxshadow_broker::{fx_symbol, FakeBroker};
    use fxshadow_core::{Bar, ManualClock, Price, Symbol};
    use fxshadow_executor::GatewayConfig;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn config(accounts: &[(&str, u64)]) -> AppConfig {
        let accounts = accounts
            .iter()
            .map(|(name, login)| {
                let var = format!("FXSHADOW_TEST_PW_{}", name.to_uppercase().replace('-', "_"));
                std::env::set_var(&var, "pw");
                AccountConfig {
                    name: name.to_string(),
                    login: *login,
                    server: "Demo".to_string(),
                    password_env: var,
                }
            })
            .collect();
        AppConfig {
            accounts,
            session: SessionConfig {
                duration_ms: 60,
                cycle_interval_ms: 10,
                rotation_pause_ms: 0,
                full_rotation_pause_ms: 0,
            },
            gateway: GatewayConfig::without_delays(),
            ..Default::default()
        }
    }

    fn rising_eurusd(broker: &FakeBroker) {
        broker.set_symbol_info(fx_symbol("EURUSD", 4));
        broker.set_tick("EURUSD", dec!(1.0998), dec!(1.1000));
        let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let bars = (0..60)
            .map(|i| {
                let close = dec!(1.0900) + dec!(0.0005) * Decimal::from(i);
                Bar::flat(t0 + ChronoDuration::minutes(5 * i), Price::new(close))
            })
            .collect();
        broker.set_bars("EURUSD", bars);
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_session_trades_then_logs_out() {
        let broker = Arc::new(FakeBroker::new());
        rising_eurusd(&broker);
        let mut app =
            Application::with_broker(config(&[("rot-usd", 9001)]), broker.clone(), clock())
                .unwrap();

        let outcome = app.run_session("rot-usd").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Expired);
        assert_eq!(broker.logged_in(), None);

        let account = app.registry().get("rot-usd").unwrap();
        assert!(!account.is_connected());
        assert!(account.book().is_open(&Symbol::new("EURUSD")));
        assert_eq!(broker.open_positions().len(), 1);
    }

    #[tokio::test]
    async fn test_login_failure_skips_account() {
        let broker = Arc::new(FakeBroker::new());
        broker.set_disconnected(true);
        let mut app =
            Application::with_broker(config(&[("rot-down", 9002)]), broker.clone(), clock())
                .unwrap();

        let outcome = app.run_session("rot-down").await.unwrap();
        assert_eq!(outcome, SessionOutcome::LoginFailed);
        assert!(!app.registry().get("rot-down").unwrap().is_connected());
    }

    #[tokio::test]
    async fn test_rotation_serves_every_account_and_keeps_books() {
        let broker = Arc::new(FakeBroker::new());
        rising_eurusd(&broker);
        let mut app = Application::with_broker(
            config(&[("rot-a", 9003), ("rot-b", 9004)]),
            broker.clone(),
            clock(),
        )
        .unwrap();

        app.run_rotation().await.unwrap();

        let eurusd = Symbol::new("EURUSD");
        assert!(app.registry().get("rot-a").unwrap().book().is_open(&eurusd));
        assert!(app.registry().iter().all(|a| !a.is_connected()));

        app.run_rotation().await.unwrap();
        assert!(app.registry().get("rot-a").unwrap().book().is_open(&eurusd));
    }

    #[tokio::test]
    async fn test_shutdown_stops_session_immediately() {
        let broker = Arc::new(FakeBroker::new());
        let mut app =
            Application::with_broker(config(&[("rot-stop", 9005)]), broker.clone(), clock())
                .unwrap();

        app.request_shutdown();
        let outcome = app.run_session("rot-stop").await.unwrap();
        assert_eq!(outcome, SessionOutcome::Shutdown);
        assert_eq!(broker.logged_in(), None);
    }

    #[tokio::test]
    async fn test_unknown_account_is_error() {
        let broker = Arc::new(FakeBroker::new());
        let mut app =
            Application::with_broker(config(&[("rot-x", 9006)]), broker, clock()).unwrap();
        assert!(app.run_session("nope").await.is_err());
    }
}
