//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `wallets` - One balance record per user (key: user_id)
//! - `transactions` - Append-only transaction log (key: tx_id)
//! - `user_index` - Secondary index (key: user_id | timestamp | tx_id)
//! - `vendor_index` - Secondary index (key: vendor_id | timestamp | tx_id)
//!
//! Writes are staged into a [`LedgerBatch`] and committed with a single
//! `WriteBatch`, so a wallet update and its transaction record land
//! together or not at all.
//!
//! The per-user lock table lives here too: every service built over one
//! `Storage` serializes a user's mutations on the same mutex.

use crate::{
    error::{Error, Result},
    locks::UserLocks,
    types::{Transaction, UserId, VendorId, Wallet, KEY_SEPARATOR},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use uuid::Uuid;

/// Column family names
const CF_WALLETS: &str = "wallets";
const CF_TRANSACTIONS: &str = "transactions";
const CF_USER_INDEX: &str = "user_index";
const CF_VENDOR_INDEX: &str = "vendor_index";

/// Timestamp (8 bytes) + transaction id (16 bytes) after the owner prefix
const INDEX_SUFFIX_LEN: usize = 8 + 16;

/// Writes staged for one atomic commit
#[derive(Default)]
pub struct LedgerBatch {
    batch: WriteBatch,
}

impl LedgerBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged puts
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Nothing staged
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

impl std::fmt::Debug for LedgerBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerBatch").field("len", &self.len()).finish()
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
    read_only: bool,
    locks: UserLocks,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .field("read_only", &self.read_only)
            .field("locked_users", &self.locks.len())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_wallets()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_USER_INDEX, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_VENDOR_INDEX, Self::cf_options_index()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened wallet storage");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
            read_only: false,
            locks: UserLocks::new(),
        })
    }

    /// Open an existing database without taking the writer lock
    ///
    /// Nothing is created: a missing directory or database is an error.
    /// Sees the state as of opening, including unflushed WAL entries of a
    /// live writer.
    pub fn open_read_only(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        if !path.is_dir() {
            return Err(Error::Storage(format!(
                "No wallet database at {}",
                path.display()
            )));
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(false);

        let db = DB::open_cf_for_read_only(
            &db_opts,
            path,
            [CF_WALLETS, CF_TRANSACTIONS, CF_USER_INDEX, CF_VENDOR_INDEX],
            false,
        )?;

        tracing::info!(path = ?path, "Opened wallet storage read-only");

        Ok(Self {
            db,
            sync_writes: false,
            read_only: true,
            locks: UserLocks::new(),
        })
    }

    /// Opened with [`Storage::open_read_only`]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Per-user lock table shared by everything using this handle
    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    // Column family options

    fn cf_options_wallets() -> Options {
        let mut opts = Options::default();
        // Balances are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Write every staged put atomically
    pub fn commit(&self, batch: LedgerBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if self.read_only {
            return Err(Error::Storage(
                "Storage was opened read-only".to_string(),
            ));
        }

        let staged = batch.len();
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch.batch, &write_opts)?;

        tracing::trace!(staged, "Batch committed");
        Ok(())
    }

    // Wallet operations

    /// Get wallet by owner
    pub fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;

        match self.db.get_cf(cf, user_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage a wallet write
    pub fn stage_wallet(&self, batch: &mut LedgerBatch, wallet: &Wallet) -> Result<()> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let value = bincode::serialize(wallet)?;
        batch.batch.put_cf(cf, wallet.user_id.as_str().as_bytes(), value);
        Ok(())
    }

    /// Every stored wallet, ordered by user id
    pub fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;

        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            wallets.push(bincode::deserialize(&value)?);
        }
        Ok(wallets)
    }

    // Transaction operations

    /// Stage a transaction record with its index entries
    pub fn stage_transaction(&self, batch: &mut LedgerBatch, tx: &Transaction) -> Result<()> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let value = bincode::serialize(tx)?;
        batch.batch.put_cf(cf_transactions, tx.id.as_bytes(), value);

        let cf_user_index = self.cf_handle(CF_USER_INDEX)?;
        let user_key = Self::index_key(tx.user_id.as_str(), tx.timestamp, tx.id)?;
        batch.batch.put_cf(cf_user_index, user_key, b"");

        if let Some(vendor) = &tx.counterparty {
            let cf_vendor_index = self.cf_handle(CF_VENDOR_INDEX)?;
            let vendor_key = Self::index_key(vendor.as_str(), tx.timestamp, tx.id)?;
            batch.batch.put_cf(cf_vendor_index, vendor_key, b"");
        }

        Ok(())
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, tx_id: Uuid) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        match self.db.get_cf(cf, tx_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// A user's transactions, newest first
    pub fn scan_user_transactions(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        self.scan_index(CF_USER_INDEX, user_id.as_str(), limit)
    }

    /// Payments received by a vendor, newest first
    pub fn scan_vendor_transactions(
        &self,
        vendor_id: &VendorId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        self.scan_index(CF_VENDOR_INDEX, vendor_id.as_str(), limit)
    }

    /// Walk one owner's index range backwards under a snapshot
    fn scan_index(
        &self,
        index_cf: &str,
        owner: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        let cf_index = self.cf_handle(index_cf)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;

        let prefix = Self::index_prefix(owner);
        // First key past the owner's range: separator + 1
        let mut upper = prefix.clone();
        if let Some(last) = upper.last_mut() {
            *last += 1;
        }

        let snapshot = self.db.snapshot();
        let iter = snapshot.iterator_cf(cf_index, IteratorMode::From(upper.as_slice(), Direction::Reverse));

        let mut transactions = Vec::new();
        for item in iter {
            if limit.is_some_and(|limit| transactions.len() >= limit) {
                break;
            }

            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() != prefix.len() + INDEX_SUFFIX_LEN {
                return Err(Error::Storage(format!(
                    "Malformed index key of length {} in {}",
                    key.len(),
                    index_cf
                )));
            }

            let tx_id_bytes: [u8; 16] = key[key.len() - 16..]
                .try_into()
                .map_err(|_| Error::Storage("Malformed transaction id in index".to_string()))?;
            let tx_id = Uuid::from_bytes(tx_id_bytes);

            let value = snapshot
                .get_cf(cf_transactions, tx_id.as_bytes())?
                .ok_or_else(|| {
                    Error::Storage(format!("Index references missing transaction {}", tx_id))
                })?;
            transactions.push(bincode::deserialize(&value)?);
        }

        Ok(transactions)
    }

    // Index key helpers

    fn index_prefix(owner: &str) -> Vec<u8> {
        let mut key = owner.as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn index_key(owner: &str, timestamp: DateTime<Utc>, tx_id: Uuid) -> Result<Vec<u8>> {
        let nanos = timestamp
            .timestamp_nanos_opt()
            .and_then(|nanos| u64::try_from(nanos).ok())
            .ok_or_else(|| {
                Error::Storage(format!("Timestamp {} outside index range", timestamp))
            })?;

        let mut key = Self::index_prefix(owner);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(tx_id.as_bytes());
        Ok(key)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_wallets = self.cf_handle(CF_WALLETS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;

        Ok(StorageStats {
            total_wallets: self.approximate_count(cf_wallets)?,
            total_transactions: self.approximate_count(cf_transactions)?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of wallets
    pub total_wallets: u64,
    /// Approximate number of transaction records
    pub total_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lkr, Usd};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn payment_at(user: &str, vendor: &str, cents: u64, at: DateTime<Utc>) -> Transaction {
        Transaction::payment(
            UserId::new(user),
            Lkr::from_minor(cents),
            VendorId::new(vendor),
            at,
        )
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        assert!(storage.db.cf_handle(CF_WALLETS).is_some());
        assert!(storage.db.cf_handle(CF_TRANSACTIONS).is_some());
        assert!(storage.db.cf_handle(CF_USER_INDEX).is_some());
        assert!(storage.db.cf_handle(CF_VENDOR_INDEX).is_some());
    }

    #[test]
    fn test_uncommitted_batch_writes_nothing() {
        let (storage, _temp) = test_storage();
        let wallet = Wallet::empty(UserId::new("alice"), Utc::now());

        let mut batch = LedgerBatch::new();
        storage.stage_wallet(&mut batch, &wallet).unwrap();
        assert_eq!(batch.len(), 1);
        drop(batch);

        assert!(storage.get_wallet(&wallet.user_id).unwrap().is_none());
    }

    #[test]
    fn test_atomic_commit() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();
        let mut wallet = Wallet::empty(UserId::new("alice"), now);
        wallet.balance = Lkr::from_minor(300_000);
        let tx = Transaction::top_up(
            wallet.user_id.clone(),
            Lkr::from_minor(300_000),
            Usd::new(Decimal::from(10)),
            now,
        );

        let mut batch = LedgerBatch::new();
        storage.stage_wallet(&mut batch, &wallet).unwrap();
        storage.stage_transaction(&mut batch, &tx).unwrap();
        storage.commit(batch).unwrap();

        assert_eq!(storage.get_wallet(&wallet.user_id).unwrap(), Some(wallet.clone()));
        assert_eq!(storage.get_transaction(tx.id).unwrap(), Some(tx.clone()));
        assert_eq!(
            storage.scan_user_transactions(&wallet.user_id, None).unwrap(),
            vec![tx]
        );
    }

    #[test]
    fn test_scan_newest_first() {
        let (storage, _temp) = test_storage();
        let start = Utc::now();

        let mut batch = LedgerBatch::new();
        let mut expected = Vec::new();
        for i in 0..5 {
            let tx = payment_at("alice", "vendor", 100 + i, start + Duration::seconds(i as i64));
            storage.stage_transaction(&mut batch, &tx).unwrap();
            expected.push(tx);
        }
        storage.commit(batch).unwrap();
        expected.reverse();

        let listed = storage.scan_user_transactions(&UserId::new("alice"), None).unwrap();
        assert_eq!(listed, expected);

        let page = storage.scan_user_transactions(&UserId::new("alice"), Some(2)).unwrap();
        assert_eq!(page, expected[..2].to_vec());
    }

    #[test]
    fn test_scan_isolates_owner_prefixes() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();

        let mut batch = LedgerBatch::new();
        for user in ["ab", "abc", "ab}", "aa"] {
            storage
                .stage_transaction(&mut batch, &payment_at(user, "shop", 500, now))
                .unwrap();
        }
        storage.commit(batch).unwrap();

        let listed = storage.scan_user_transactions(&UserId::new("ab"), None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, UserId::new("ab"));

        assert!(storage
            .scan_user_transactions(&UserId::new("nobody"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_vendor_index() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();

        let mut batch = LedgerBatch::new();
        storage
            .stage_transaction(&mut batch, &payment_at("alice", "tea-shop", 500, now))
            .unwrap();
        storage
            .stage_transaction(
                &mut batch,
                &payment_at("bob", "tea-shop", 700, now + Duration::milliseconds(1)),
            )
            .unwrap();
        storage
            .stage_transaction(&mut batch, &payment_at("bob", "guide", 900, now))
            .unwrap();
        storage.commit(batch).unwrap();

        let received = storage
            .scan_vendor_transactions(&VendorId::new("tea-shop"), None)
            .unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].user_id, UserId::new("bob"));
        assert_eq!(received[1].user_id, UserId::new("alice"));
    }

    #[test]
    fn test_read_only_open() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("wallets");
        config.rocksdb.sync_writes = false;

        // Never creates a database
        assert!(matches!(
            Storage::open_read_only(&config),
            Err(Error::Storage(_))
        ));
        assert!(!config.data_dir.exists());

        let wallet = Wallet::empty(UserId::new("alice"), Utc::now());
        {
            let storage = Storage::open(&config).unwrap();
            let mut batch = LedgerBatch::new();
            storage.stage_wallet(&mut batch, &wallet).unwrap();
            storage.commit(batch).unwrap();

            // The writer's lock does not keep readers out
            let reader = Storage::open_read_only(&config).unwrap();
            assert_eq!(reader.get_wallet(&wallet.user_id).unwrap(), Some(wallet.clone()));
        }

        let reader = Storage::open_read_only(&config).unwrap();
        assert!(reader.is_read_only());
        assert_eq!(reader.list_wallets().unwrap(), vec![wallet.clone()]);

        let mut batch = LedgerBatch::new();
        reader.stage_wallet(&mut batch, &wallet).unwrap();
        assert!(matches!(reader.commit(batch), Err(Error::Storage(_))));
    }

    #[test]
    fn test_list_wallets() {
        let (storage, _temp) = test_storage();
        let now = Utc::now();

        let mut batch = LedgerBatch::new();
        for user in ["carol", "alice", "bob"] {
            storage
                .stage_wallet(&mut batch, &Wallet::empty(UserId::new(user), now))
                .unwrap();
        }
        storage.commit(batch).unwrap();

        let users: Vec<_> = storage
            .list_wallets()
            .unwrap()
            .into_iter()
            .map(|w| w.user_id)
            .collect();
        assert_eq!(
            users,
            vec![UserId::new("alice"), UserId::new("bob"), UserId::new("carol")]
        );
    }
}
