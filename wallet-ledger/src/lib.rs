//! Wallet Ledger
//!
//! Per-user LKR wallets fed by USD top-ups and drained by vendor payments,
//! with an append-only transaction log kept consistent with every balance.
//!
//! # Architecture
//!
//! - **Wallet Store**: one balance record per user, never negative
//! - **Transaction Log**: immutable TOPUP / PAYMENT records, indexed per user and per vendor
//! - **Ledger Service**: balance change and log record committed in one RocksDB write batch
//! - **Per-user locks**: same-user mutations serialize, different users never contend
//!
//! # Invariants
//!
//! - `balance == Σ TOPUP − Σ PAYMENT` for every user between operations
//! - A rejected payment leaves balance and log untouched
//! - Exactly one wallet per user, created lazily with a zero balance

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod metrics;
pub mod storage;
pub mod transaction_log;
pub mod types;
pub mod wallet_store;

// Re-exports
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use ledger::{LedgerService, Reconciliation, VendorEarnings};
pub use locks::{UserLocks, WalletGuard};
pub use metrics::Metrics;
pub use storage::{LedgerBatch, Storage, StorageStats};
pub use transaction_log::TransactionLog;
pub use types::{
    BalanceChange, ExchangeRate, Lkr, Transaction, TransactionKind, Usd, UserId, VendorId, Wallet,
};
pub use wallet_store::WalletStore;
