//! Trading account: credentials, session flag and order book.

use fxshadow_broker::{BrokerResult, BrokerSession, Credentials};
use fxshadow_core::{DailyJob, DailyWindow};
use serde::Serialize;
use tracing::{info, warn};

use crate::book::{BookSnapshot, OrderBook};

/// One set of credentials and the orders traded under it.
///
/// The order book survives logout, so a rotation back to this account
/// resumes with its pending, delayed and banned symbols intact.
#[derive(Debug)]
pub struct Account {
    name: String,
    credentials: Credentials,
    connected: bool,
    /// Settlement currency, learned from the first account summary.
    currency: Option<String>,
    pub(crate) book: OrderBook,
    pub(crate) swap_job: DailyJob,
    pub(crate) reset_job: DailyJob,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        credentials: Credentials,
        swap_window: DailyWindow,
        reset_window: DailyWindow,
    ) -> Self {
        Self {
            name: name.into(),
            credentials,
            connected: false,
            currency: None,
            book: OrderBook::new(),
            swap_job: DailyJob::new(swap_window),
            reset_job: DailyJob::new(reset_window),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn login(&self) -> u64 {
        self.credentials.login
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub(crate) fn set_currency(&mut self, currency: String) {
        self.currency = Some(currency);
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    /// Log in through `session`.
    pub async fn connect(&mut self, session: &dyn BrokerSession) -> BrokerResult<()> {
        info!(account = %self.name, login = self.credentials.login, server = %self.credentials.server, "Connecting");
        session.login(&self.credentials).await?;
        self.connected = true;
        info!(account = %self.name, "Connected");
        Ok(())
    }

    /// Log out. The account is marked disconnected even if logout fails.
    pub async fn disconnect(&mut self, session: &dyn BrokerSession) {
        if let Err(e) = session.logout().await {
            warn!(account = %self.name, error = %e, "Logout failed");
        }
        self.connected = false;
        info!(account = %self.name, "Logged out");
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            name: self.name.clone(),
            login: self.credentials.login,
            connected: self.connected,
            currency: self.currency.clone(),
            book: self.book.snapshot(),
        }
    }
}

/// Serializable view of an account for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub name: String,
    pub login: u64,
    pub connected: bool,
    pub currency: Option<String>,
    pub book: BookSnapshot,
}
