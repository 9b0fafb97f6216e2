//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring underwriting.
//!
//! # Metrics
//!
//! - `credit_transactions_approved_total` - Loans committed
//! - `credit_transactions_rejected_total{reason}` - Loans refused, by error kind
//! - `credit_principal_approved_total` - Sum of committed principal
//! - `credit_underwriting_duration_seconds` - Histogram of underwriting latencies
//! - `credit_sub_limits_created_total` - Sub-limits allocated

use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Loans committed
    pub approved_total: IntCounter,

    /// Loans refused, labelled by reason
    pub rejected_total: IntCounterVec,

    /// Committed principal
    pub principal_approved: Counter,

    /// Underwriting duration histogram
    pub underwriting_duration: Histogram,

    /// Sub-limits allocated
    pub sub_limits_created: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("approved_total", &self.approved_total.get())
            .field("sub_limits_created", &self.sub_limits_created.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let approved_total = IntCounter::new(
            "credit_transactions_approved_total",
            "Total number of loan transactions committed",
        )?;
        registry.register(Box::new(approved_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                "credit_transactions_rejected_total",
                "Total number of loan transactions refused",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let principal_approved = Counter::new(
            "credit_principal_approved_total",
            "Sum of committed loan principal",
        )?;
        registry.register(Box::new(principal_approved.clone()))?;

        let underwriting_duration = Histogram::with_opts(
            HistogramOpts::new(
                "credit_underwriting_duration_seconds",
                "Histogram of underwriting latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(underwriting_duration.clone()))?;

        let sub_limits_created = IntCounter::new(
            "credit_sub_limits_created_total",
            "Total number of credit sub-limits allocated",
        )?;
        registry.register(Box::new(sub_limits_created.clone()))?;

        Ok(Self {
            approved_total,
            rejected_total,
            principal_approved,
            underwriting_duration,
            sub_limits_created,
            registry,
        })
    }

    /// Record a committed loan
    pub fn record_approval(&self, principal: Decimal) {
        self.approved_total.inc();
        self.principal_approved
            .inc_by(principal.to_f64().unwrap_or_default());
    }

    /// Record a refused loan
    pub fn record_rejection(&self, reason: &str) {
        self.rejected_total.with_label_values(&[reason]).inc();
    }

    /// Record underwriting duration
    pub fn record_underwriting_duration(&self, duration_seconds: f64) {
        self.underwriting_duration.observe(duration_seconds);
    }

    /// Record a sub-limit allocation
    pub fn record_sub_limit_created(&self) {
        self.sub_limits_created.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every metric in Prometheus text format
    pub fn encode_text(&self) -> crate::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        let text = String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))?;
        Ok(text)
    }
}
