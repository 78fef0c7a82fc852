//! Wallet Store: one balance record per user
//!
//! Owns the "balance never negative" invariant. Balances change only
//! through [`WalletStore::apply_delta`], which stages the new record into
//! a [`LedgerBatch`] and requires the caller to hold the user's
//! [`WalletGuard`]. Guards come from the lock table of the shared
//! [`Storage`], so stores over one handle exclude each other.

use crate::{
    error::{Error, Result},
    locks::WalletGuard,
    storage::{LedgerBatch, Storage},
    types::{BalanceChange, UserId, Wallet},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable `user_id -> balance` mapping
#[derive(Debug, Clone)]
pub struct WalletStore {
    storage: Arc<Storage>,
}

impl WalletStore {
    /// Wrap an open storage handle
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Wallet for `user_id`, or `WalletNotFound`
    pub fn get(&self, user_id: &UserId) -> Result<Wallet> {
        self.find(user_id)?
            .ok_or_else(|| Error::WalletNotFound(user_id.clone()))
    }

    /// Wallet for `user_id` if it exists
    pub fn find(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        self.storage.get_wallet(user_id)
    }

    /// Every wallet, ordered by user id
    pub fn list_all(&self) -> Result<Vec<Wallet>> {
        self.storage.list_wallets()
    }

    /// Take exclusive access to one user's wallet
    pub async fn lock(&self, user_id: &UserId) -> WalletGuard {
        self.storage.locks().acquire(user_id).await
    }

    /// Create a zero-balance wallet unless one exists
    ///
    /// Concurrent calls for the same absent user create exactly one record.
    pub async fn create_if_absent(&self, user_id: &UserId) -> Result<Wallet> {
        user_id.validate()?;
        let guard = self.lock(user_id).await;
        self.get_or_create_locked(&guard)
    }

    /// Load the guarded user's wallet, committing a fresh one if absent
    pub fn get_or_create_locked(&self, guard: &WalletGuard) -> Result<Wallet> {
        let user_id = guard.user_id();
        if let Some(wallet) = self.find(user_id)? {
            return Ok(wallet);
        }

        let wallet = Wallet::empty(user_id.clone(), Utc::now());
        let mut batch = LedgerBatch::new();
        self.storage.stage_wallet(&mut batch, &wallet)?;
        self.storage.commit(batch)?;

        tracing::info!(user_id = %user_id, "Wallet created");
        Ok(wallet)
    }

    /// Stage `current` adjusted by `change`
    ///
    /// Fails with `InsufficientFunds` when a debit would take the balance
    /// below zero; nothing is staged in that case.
    pub fn apply_delta(
        &self,
        guard: &WalletGuard,
        batch: &mut LedgerBatch,
        current: &Wallet,
        change: BalanceChange,
        at: DateTime<Utc>,
    ) -> Result<Wallet> {
        if !guard.covers(&current.user_id) {
            return Err(Error::InvariantViolation(format!(
                "balance change for {} attempted under lock for {}",
                current.user_id,
                guard.user_id()
            )));
        }

        let balance = match change {
            BalanceChange::Credit(amount) => current
                .balance
                .checked_add(amount)
                .ok_or_else(|| Error::Validation("balance would overflow".to_string()))?,
            BalanceChange::Debit(amount) => {
                current
                    .balance
                    .checked_sub(amount)
                    .ok_or(Error::InsufficientFunds {
                        available: current.balance,
                        requested: amount,
                    })?
            }
        };

        let next = Wallet {
            balance,
            updated_at: at,
            ..current.clone()
        };
        self.storage.stage_wallet(batch, &next)?;

        Ok(next)
    }
}
