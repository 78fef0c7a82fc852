//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the wallet ledger.
//!
//! # Metrics
//!
//! - `wallet_topups_total` - Successful top-ups
//! - `wallet_payments_total` - Successful vendor payments
//! - `wallet_payments_rejected_total` - Payments refused for insufficient funds
//! - `wallet_lkr_credited_minor_total` - LKR cents credited by top-ups
//! - `wallet_lkr_debited_minor_total` - LKR cents debited by payments
//! - `wallet_operation_duration_seconds` - Latency of ledger mutations

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Successful top-ups
    pub topups_total: IntCounter,

    /// Successful payments
    pub payments_total: IntCounter,

    /// Payments refused for insufficient funds
    pub payments_rejected: IntCounter,

    /// LKR minor units credited
    pub lkr_credited: IntCounter,

    /// LKR minor units debited
    pub lkr_debited: IntCounter,

    /// Mutation latency histogram
    pub operation_duration: Histogram,

    registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let topups_total = IntCounter::new("wallet_topups_total", "Successful wallet top-ups")?;
        registry.register(Box::new(topups_total.clone()))?;

        let payments_total =
            IntCounter::new("wallet_payments_total", "Successful vendor payments")?;
        registry.register(Box::new(payments_total.clone()))?;

        let payments_rejected = IntCounter::new(
            "wallet_payments_rejected_total",
            "Payments refused for insufficient funds",
        )?;
        registry.register(Box::new(payments_rejected.clone()))?;

        let lkr_credited = IntCounter::new(
            "wallet_lkr_credited_minor_total",
            "LKR minor units credited by top-ups",
        )?;
        registry.register(Box::new(lkr_credited.clone()))?;

        let lkr_debited = IntCounter::new(
            "wallet_lkr_debited_minor_total",
            "LKR minor units debited by payments",
        )?;
        registry.register(Box::new(lkr_debited.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wallet_operation_duration_seconds",
                "Latency of wallet mutations",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            topups_total,
            payments_total,
            payments_rejected,
            lkr_credited,
            lkr_debited,
            operation_duration,
            registry,
        })
    }

    /// Record a successful top-up of `minor_units`
    pub fn record_top_up(&self, minor_units: u64) {
        self.topups_total.inc();
        self.lkr_credited.inc_by(minor_units);
    }

    /// Record a successful payment of `minor_units`
    pub fn record_payment(&self, minor_units: u64) {
        self.payments_total.inc();
        self.lkr_debited.inc_by(minor_units);
    }

    /// Record a payment refused for insufficient funds
    pub fn record_rejected_payment(&self) {
        self.payments_rejected.inc();
    }

    /// Record mutation duration
    pub fn record_duration(&self, duration_seconds: f64) {
        self.operation_duration.observe(duration_seconds);
    }

    /// Render the registry in the Prometheus text format
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("topups_total", &self.topups_total.get())
            .field("payments_total", &self.payments_total.get())
            .field("payments_rejected", &self.payments_rejected.get())
            .finish()
    }
}
