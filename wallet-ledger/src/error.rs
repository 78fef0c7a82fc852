//! Error types for the wallet ledger

use thiserror::Error;

use crate::types::{Lkr, UserId};

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input, rejected before storage access
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment larger than the current balance; nothing was written
    #[error("Insufficient funds: balance {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the check
        available: Lkr,
        /// Amount the caller tried to pay
        requested: Lkr,
    },

    /// Wallet absent where it is not created on demand
    #[error("Wallet not found: {0}")]
    WalletNotFound(UserId),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Invariant violation (balance and log disagree)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input
    Validation,
    /// Business-rule rejection of a payment
    InsufficientFunds,
    /// Missing wallet
    NotFound,
    /// Storage, encoding, configuration or consistency failure
    Infrastructure,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::WalletNotFound(_) => ErrorKind::NotFound,
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::InvariantViolation(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Infrastructure,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
