//! Ledger Service: atomic wallet operations
//!
//! Composes the [`WalletStore`] and the [`TransactionLog`] so that a
//! balance change and the record explaining it are committed in one
//! RocksDB write batch, while the user's [`WalletGuard`](crate::WalletGuard)
//! is held.
//!
//! # Example
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use wallet_ledger::{Config, LedgerService, Lkr, Usd, UserId, VendorId};
//!
//! #[tokio::main]
//! async fn main() -> wallet_ledger::Result<()> {
//!     let ledger = LedgerService::open(&Config::default())?;
//!     let alice = UserId::parse("alice")?;
//!
//!     ledger.top_up(&alice, Usd::new(Decimal::from(100))).await?;
//!     ledger
//!         .deduct(&alice, Lkr::from_major(5_000)?, &VendorId::parse("vendorX")?)
//!         .await?;
//!
//!     for tx in ledger.list_transactions(&alice)? {
//!         println!("{} {} {}", tx.timestamp, tx.kind, tx.amount);
//!     }
//!     Ok(())
//! }
//! ```

use crate::{
    error::{Error, Result},
    locks::WalletGuard,
    metrics::Metrics,
    storage::{LedgerBatch, Storage},
    transaction_log::TransactionLog,
    types::{
        BalanceChange, ExchangeRate, Lkr, Transaction, Usd, UserId, VendorId, Wallet,
    },
    wallet_store::WalletStore,
    Config,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Payments received by one vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorEarnings {
    /// Receiving vendor
    pub vendor_id: VendorId,
    /// Sum of all payment amounts
    pub total: Lkr,
    /// Number of payments
    pub payment_count: usize,
}

/// Stored balance compared against the transaction log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Wallet owner
    pub user_id: UserId,
    /// Balance held by the wallet record
    pub balance: Lkr,
    /// Σ TOPUP − Σ PAYMENT in minor units
    pub log_total: i128,
    /// Number of records replayed
    pub transaction_count: usize,
    /// `balance == log_total`
    pub consistent: bool,
}

/// Wallet ledger entry point
#[derive(Debug, Clone)]
pub struct LedgerService {
    storage: Arc<Storage>,
    wallets: WalletStore,
    log: TransactionLog,
    rate: ExchangeRate,
    max_page_size: usize,
    metrics: Metrics,
}

impl LedgerService {
    /// Build a service over an already opened storage handle
    ///
    /// Services sharing one `Storage` share its per-user locks.
    pub fn new(storage: Arc<Storage>, config: &Config) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            wallets: WalletStore::new(Arc::clone(&storage)),
            log: TransactionLog::new(Arc::clone(&storage)),
            storage,
            rate: config.exchange_rate()?,
            max_page_size: config.history.max_page_size,
            metrics,
        })
    }

    /// Open storage at `config.data_dir` and build a service over it
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(config)?);
        Self::new(storage, config)
    }

    /// Open an existing database for inspection only
    ///
    /// Fails instead of creating anything; mutations fail at commit.
    pub fn open_read_only(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open_read_only(config)?);
        Self::new(storage, config)
    }

    /// Configured USD to LKR rate
    pub fn exchange_rate(&self) -> ExchangeRate {
        self.rate
    }

    /// Prometheus collectors for this service
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying storage handle
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Wallet for `user_id`, created with a zero balance on first access
    pub async fn get_or_create_wallet(&self, user_id: &UserId) -> Result<Wallet> {
        user_id.validate()?;
        if let Some(wallet) = self.wallets.find(user_id)? {
            return Ok(wallet);
        }
        self.wallets.create_if_absent(user_id).await
    }

    /// Wallet for `user_id` without creating one
    pub fn get_wallet(&self, user_id: &UserId) -> Result<Wallet> {
        self.wallets.get(user_id)
    }

    /// Credit `usd` converted at the configured rate
    ///
    /// Input is validated before any storage access: a zero or negative
    /// amount, or one that converts to less than one LKR cent, is a
    /// `Validation` error and creates nothing.
    pub async fn top_up(&self, user_id: &UserId, usd: Usd) -> Result<Wallet> {
        user_id.validate()?;
        let amount = self.rate.convert(usd)?;

        let start = Instant::now();
        let guard = self.wallets.lock(user_id).await;
        let current = self.wallets.get_or_create_locked(&guard)?;
        let at = next_timestamp(&current);

        let mut batch = LedgerBatch::new();
        let wallet = self.wallets.apply_delta(
            &guard,
            &mut batch,
            &current,
            BalanceChange::Credit(amount),
            at,
        )?;
        let tx = self
            .log
            .append(&mut batch, Transaction::top_up(user_id.clone(), amount, usd, at))?;
        self.storage.commit(batch)?;
        drop(guard);

        self.metrics.record_top_up(amount.minor_units());
        self.metrics.record_duration(start.elapsed().as_secs_f64());

        tracing::info!(
            user_id = %user_id,
            tx_id = %tx.id,
            usd = %usd,
            amount = %amount,
            balance = %wallet.balance,
            "Wallet topped up"
        );

        Ok(wallet)
    }

    /// Pay `amount` to `vendor_id`
    ///
    /// Fails with `InsufficientFunds` when the balance is smaller than
    /// `amount`; neither the balance nor the log changes in that case.
    pub async fn deduct(
        &self,
        user_id: &UserId,
        amount: Lkr,
        vendor_id: &VendorId,
    ) -> Result<Wallet> {
        user_id.validate()?;
        vendor_id.validate()?;
        if amount.is_zero() {
            return Err(Error::Validation(
                "payment amount must be greater than zero".to_string(),
            ));
        }

        let start = Instant::now();
        let guard = self.wallets.lock(user_id).await;
        let current = self.wallets.get_or_create_locked(&guard)?;
        let at = next_timestamp(&current);

        let mut batch = LedgerBatch::new();
        let wallet = match self.wallets.apply_delta(
            &guard,
            &mut batch,
            &current,
            BalanceChange::Debit(amount),
            at,
        ) {
            Ok(wallet) => wallet,
            Err(err @ Error::InsufficientFunds { .. }) => {
                self.metrics.record_rejected_payment();
                tracing::warn!(
                    user_id = %user_id,
                    vendor_id = %vendor_id,
                    amount = %amount,
                    balance = %current.balance,
                    "Payment rejected"
                );
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let tx = self.log.append(
            &mut batch,
            Transaction::payment(user_id.clone(), amount, vendor_id.clone(), at),
        )?;
        self.storage.commit(batch)?;
        drop(guard);

        self.metrics.record_payment(amount.minor_units());
        self.metrics.record_duration(start.elapsed().as_secs_f64());

        tracing::info!(
            user_id = %user_id,
            tx_id = %tx.id,
            vendor_id = %vendor_id,
            amount = %amount,
            balance = %wallet.balance,
            "Vendor paid"
        );

        Ok(wallet)
    }

    /// Every record of `user_id`, newest first
    pub fn list_transactions(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        user_id.validate()?;
        self.log.list_by_user(user_id)
    }

    /// The `limit` most recent records, capped at the configured page size
    ///
    /// A zero `limit` is a `Validation` error.
    pub fn list_recent_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        user_id.validate()?;
        if limit == 0 {
            return Err(Error::Validation(
                "limit must be greater than zero".to_string(),
            ));
        }
        let limit = limit.min(self.max_page_size);
        self.log.list_by_user_page(user_id, limit)
    }

    /// Totals of the payments `vendor_id` has received
    pub fn vendor_earnings(&self, vendor_id: &VendorId) -> Result<VendorEarnings> {
        vendor_id.validate()?;
        let payments = self.log.list_by_counterparty(vendor_id)?;

        let mut total = Lkr::ZERO;
        for tx in &payments {
            total = total.checked_add(tx.amount).ok_or_else(|| {
                Error::InvariantViolation(format!("earnings of {} overflow", vendor_id))
            })?;
        }

        Ok(VendorEarnings {
            vendor_id: vendor_id.clone(),
            total,
            payment_count: payments.len(),
        })
    }

    /// Replay the log of `user_id` and compare with the stored balance
    ///
    /// Runs under the user's guard so no mutation lands between the two reads.
    pub async fn reconcile(&self, user_id: &UserId) -> Result<Reconciliation> {
        user_id.validate()?;
        let guard = self.wallets.lock(user_id).await;
        self.reconcile_locked(&guard)
    }

    /// Reconcile every wallet, ordered by user id
    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>> {
        let mut reports = Vec::new();
        for wallet in self.wallets.list_all()? {
            reports.push(self.reconcile(&wallet.user_id).await?);
        }
        Ok(reports)
    }

    /// `InvariantViolation` unless balance and log agree
    pub async fn verify(&self, user_id: &UserId) -> Result<()> {
        let report = self.reconcile(user_id).await?;
        if report.consistent {
            return Ok(());
        }

        tracing::error!(
            user_id = %user_id,
            balance = report.balance.minor_units(),
            log_total = %report.log_total,
            "Balance does not match transaction log"
        );
        Err(Error::InvariantViolation(format!(
            "wallet {} holds {} minor units but its log sums to {}",
            user_id,
            report.balance.minor_units(),
            report.log_total
        )))
    }

    fn reconcile_locked(&self, guard: &WalletGuard) -> Result<Reconciliation> {
        let user_id = guard.user_id();
        let wallet = self.wallets.get(user_id)?;
        let records = self.log.list_by_user(user_id)?;

        let log_total: i128 = records.iter().map(Transaction::signed_amount).sum();
        let balance = i128::from(wallet.balance.minor_units());

        Ok(Reconciliation {
            user_id: user_id.clone(),
            balance: wallet.balance,
            log_total,
            transaction_count: records.len(),
            consistent: balance == log_total,
        })
    }
}

/// Timestamp for the next record of a wallet
///
/// Strictly after the wallet's last change, so index order matches
/// commit order even when the clock stalls or steps back.
fn next_timestamp(current: &Wallet) -> DateTime<Utc> {
    let floor = current.updated_at + Duration::nanoseconds(1);
    Utc::now().max(floor)
}
