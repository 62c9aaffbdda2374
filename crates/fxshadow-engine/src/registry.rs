//! Account registry.

use tracing::info;

use crate::account::Account;
use crate::error::{EngineError, EngineResult};

/// Ordered set of accounts, unique by name, processed in registration order.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account. Names and logins must be unique.
    pub fn register(&mut self, account: Account) -> EngineResult<()> {
        if self
            .accounts
            .iter()
            .any(|a| a.name() == account.name() || a.login() == account.login())
        {
            return Err(EngineError::DuplicateAccount(account.name().to_string()));
        }
        info!(account = %account.name(), login = account.login(), "Account registered");
        self.accounts.push(account);
        Ok(())
    }

    /// Remove and return an account.
    pub fn unregister(&mut self, name: &str) -> EngineResult<Account> {
        let idx = self
            .accounts
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| EngineError::UnknownAccount(name.to_string()))?;
        Ok(self.accounts.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Account> {
        self.accounts.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
