//! Transaction Log: append-only record of balance-affecting events
//!
//! Records are staged into the same [`LedgerBatch`] as the balance they
//! explain and are never rewritten afterwards. Listings are read under a
//! storage snapshot, so each call returns a consistent point-in-time view.

use crate::{
    error::Result,
    storage::{LedgerBatch, Storage},
    types::{Transaction, UserId, VendorId},
};
use std::sync::Arc;
use uuid::Uuid;

/// Append-only transaction store
#[derive(Debug, Clone)]
pub struct TransactionLog {
    storage: Arc<Storage>,
}

impl TransactionLog {
    /// Wrap an open storage handle
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Stage one record and its index entries
    pub fn append(&self, batch: &mut LedgerBatch, tx: Transaction) -> Result<Transaction> {
        self.storage.stage_transaction(batch, &tx)?;

        tracing::debug!(
            tx_id = %tx.id,
            user_id = %tx.user_id,
            kind = %tx.kind,
            amount = tx.amount.minor_units(),
            "Transaction staged"
        );

        Ok(tx)
    }

    /// Look up one record
    pub fn get(&self, tx_id: Uuid) -> Result<Option<Transaction>> {
        self.storage.get_transaction(tx_id)
    }

    /// All of a user's records, newest first
    pub fn list_by_user(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.storage.scan_user_transactions(user_id, None)
    }

    /// At most `limit` of a user's most recent records, newest first
    pub fn list_by_user_page(&self, user_id: &UserId, limit: usize) -> Result<Vec<Transaction>> {
        self.storage.scan_user_transactions(user_id, Some(limit))
    }

    /// Payments received by a vendor, newest first
    pub fn list_by_counterparty(&self, vendor_id: &VendorId) -> Result<Vec<Transaction>> {
        self.storage.scan_vendor_transactions(vendor_id, None)
    }
}
