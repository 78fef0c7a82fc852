use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wallet_ledger::{Transaction, VendorEarnings, Wallet};

// ===== Requests =====

/// Amounts accept JSON numbers or numeric strings
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    /// USD
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    #[serde(default)]
    pub vendor_id: String,
    /// LKR, at most two decimal places
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// ===== Responses =====

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

impl From<&Wallet> for BalanceResponse {
    fn from(wallet: &Wallet) -> Self {
        Self {
            balance: wallet.balance.to_decimal(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PayResponse {
    pub success: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "amountLKR", with = "rust_decimal::serde::float")]
    pub amount_lkr: Decimal,
    #[serde(
        rename = "amountUSD",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount_usd: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            kind: tx.kind.as_str(),
            amount_lkr: tx.amount.to_decimal(),
            amount_usd: tx.usd_amount,
            vendor_id: tx.counterparty.map(|vendor| vendor.as_str().to_string()),
            timestamp: tx.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub usd_to_lkr: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub vendor_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_earnings: Decimal,
    pub payment_count: usize,
}

impl From<VendorEarnings> for EarningsResponse {
    fn from(earnings: VendorEarnings) -> Self {
        Self {
            vendor_id: earnings.vendor_id.as_str().to_string(),
            total_earnings: earnings.total.to_decimal(),
            payment_count: earnings.payment_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
