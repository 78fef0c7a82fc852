//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode on disk)
//! - Exact arithmetic (integer LKR minor units, Decimal for USD input)
//! - Unit safety (USD and LKR never mix without an `ExchangeRate`)

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Byte separating an owner id from the rest of an index key
pub const KEY_SEPARATOR: u8 = b'|';

/// Minor units (cents) per rupee
const LKR_MINOR_PER_MAJOR: u64 = 100;

/// Decimal places carried by LKR amounts
const LKR_SCALE: u32 = 2;

fn validate_key_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", kind)));
    }
    if id.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(Error::Validation(format!(
            "{} must not contain '{}'",
            kind, KEY_SEPARATOR as char
        )));
    }
    Ok(())
}

/// Wallet owner identifier, issued by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identifier without checking it
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wrap an identifier, rejecting ids that cannot be used as storage keys
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    /// Check the id is usable as a storage key
    pub fn validate(&self) -> Result<()> {
        validate_key_id("user id", &self.0)
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vendor receiving a payment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorId(String);

impl VendorId {
    /// Wrap an identifier without checking it
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wrap an identifier, rejecting empty ids
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    /// Check the id is non-empty and usable as a storage key
    pub fn validate(&self) -> Result<()> {
        validate_key_id("vendor id", &self.0)
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount of Sri Lankan rupees in minor units (cents)
///
/// Balances and transaction amounts are always held in this form so the
/// non-negativity and sum invariants are checked with exact integer math.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lkr(u64);

impl Lkr {
    /// Zero rupees
    pub const ZERO: Lkr = Lkr(0);

    /// From minor units (cents)
    pub const fn from_minor(cents: u64) -> Self {
        Self(cents)
    }

    /// From whole rupees
    pub fn from_major(rupees: u64) -> Result<Self> {
        rupees
            .checked_mul(LKR_MINOR_PER_MAJOR)
            .map(Self)
            .ok_or_else(|| Error::Validation("LKR amount out of range".to_string()))
    }

    /// Parse a client supplied decimal (at most two decimal places)
    pub fn from_decimal(amount: Decimal) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(Error::Validation("LKR amount must not be negative".to_string()));
        }
        if amount.normalize().scale() > LKR_SCALE {
            return Err(Error::Validation(
                "LKR amount has more than two decimal places".to_string(),
            ));
        }

        let cents = amount
            .checked_mul(Decimal::from(LKR_MINOR_PER_MAJOR))
            .and_then(|cents| cents.to_u64())
            .ok_or_else(|| Error::Validation("LKR amount out of range".to_string()))?;

        Ok(Self(cents))
    }

    /// Minor units (cents)
    pub const fn minor_units(&self) -> u64 {
        self.0
    }

    /// Exact decimal value in rupees
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.0 as i128, LKR_SCALE)
    }

    /// Is this zero rupees
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Lkr) -> Option<Lkr> {
        self.0.checked_add(other.0).map(Lkr)
    }

    /// Checked subtraction, `None` if the result would be negative
    pub fn checked_sub(self, other: Lkr) -> Option<Lkr> {
        self.0.checked_sub(other.0).map(Lkr)
    }
}

impl fmt::Display for Lkr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LKR {}", self.to_decimal())
    }
}

/// Amount of US dollars as entered by the client
///
/// Only a unit tag: positivity is checked by the operation that consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct Usd(Decimal);

impl Usd {
    /// Tag a decimal as USD
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Underlying decimal
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "USD {}", self.0)
    }
}

/// Fixed USD to LKR conversion rate (rupees per dollar)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate(Decimal);

impl ExchangeRate {
    /// Default mock rate: 1 USD = 300 LKR
    pub const DEFAULT_USD_TO_LKR: u32 = 300;

    /// Create a rate, which must be positive
    pub fn new(lkr_per_usd: Decimal) -> Result<Self> {
        if lkr_per_usd <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "exchange rate must be positive, got {}",
                lkr_per_usd
            )));
        }
        Ok(Self(lkr_per_usd))
    }

    /// Rupees per dollar
    pub fn lkr_per_usd(&self) -> Decimal {
        self.0
    }

    /// Convert dollars to rupees, rounding half away from zero to the cent
    pub fn convert(&self, usd: Usd) -> Result<Lkr> {
        if !usd.is_positive() {
            return Err(Error::Validation(format!(
                "top-up amount must be positive, got {}",
                usd.amount()
            )));
        }

        let rupees = usd
            .amount()
            .checked_mul(self.0)
            .ok_or_else(|| Error::Validation("top-up amount out of range".to_string()))?
            .round_dp_with_strategy(LKR_SCALE, RoundingStrategy::MidpointAwayFromZero);

        let lkr = Lkr::from_decimal(rupees)?;
        if lkr.is_zero() {
            return Err(Error::Validation(format!(
                "top-up of {} converts to less than one cent",
                usd
            )));
        }
        Ok(lkr)
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self(Decimal::from(Self::DEFAULT_USD_TO_LKR))
    }
}

/// Per-user balance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Owner
    pub user_id: UserId,

    /// Current balance, never negative
    pub balance: Lkr,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Time of the last balance change (or creation)
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Fresh wallet with zero balance
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Lkr::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    /// Increase the balance
    Credit(Lkr),
    /// Decrease the balance
    Debit(Lkr),
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// USD converted and credited
    #[serde(rename = "TOPUP")]
    TopUp,
    /// LKR paid to a vendor
    Payment,
}

impl TransactionKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::TopUp => "TOPUP",
            TransactionKind::Payment => "PAYMENT",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record of one successful ledger mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id (UUIDv7)
    pub id: Uuid,

    /// Wallet owner
    pub user_id: UserId,

    /// Top-up or payment
    pub kind: TransactionKind,

    /// Always positive; sign is implied by `kind`
    pub amount: Lkr,

    /// Dollar amount a top-up was converted from
    #[serde(with = "decimal_bytes")]
    pub usd_amount: Option<Decimal>,

    /// Vendor paid (payments only)
    pub counterparty: Option<VendorId>,

    /// Creation time, strictly increasing per user
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Record a top-up
    pub fn top_up(user_id: UserId, amount: Lkr, usd: Usd, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            kind: TransactionKind::TopUp,
            amount,
            usd_amount: Some(usd.amount()),
            counterparty: None,
            timestamp,
        }
    }

    /// Record a payment to a vendor
    pub fn payment(
        user_id: UserId,
        amount: Lkr,
        vendor: VendorId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            kind: TransactionKind::Payment,
            amount,
            usd_amount: None,
            counterparty: Some(vendor),
            timestamp,
        }
    }

    /// Effect on the balance in signed minor units
    pub fn signed_amount(&self) -> i128 {
        match self.kind {
            TransactionKind::TopUp => self.amount.minor_units() as i128,
            TransactionKind::Payment => -(self.amount.minor_units() as i128),
        }
    }
}

/// Fixed-width on-disk encoding for decimals (bincode cannot drive the
/// self-describing default `Decimal` deserializer)
mod decimal_bytes {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.serialize()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
        Ok(Option::<[u8; 16]>::deserialize(deserializer)?.map(Decimal::deserialize))
    }
}
