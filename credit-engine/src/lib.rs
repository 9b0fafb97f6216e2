//! Kredit Plus Credit Engine
//!
//! Installment-loan underwriting against per-tenor sub-limits and an overall
//! credit ceiling per consumer.
//!
//! # Architecture
//!
//! - **Unit of Work**: Every repository call takes the active unit explicitly
//! - **Row Locking**: Underwriting serializes on the consumer row
//! - **Fixed Pricing**: Flat 10% interest, installments rounded to cents
//! - **Pluggable Store**: PostgreSQL in production, in-memory for tests
//!
//! # Invariants
//!
//! - Exposure: Σ(active principal) ≤ overall credit limit, per consumer
//! - Tenor cap: principal ≤ sub-limit amount, per transaction
//! - One sub-limit per (consumer, tenor)
//! - Derived fields are computed once and never recomputed

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod allocator;
pub mod config;
pub mod consumer;
pub mod contract;
pub mod engine;
pub mod error;
pub mod http;
pub mod metrics;
pub mod pricing;
pub mod store;
pub mod types;
pub mod underwriter;

// Re-exports
pub use allocator::SubLimitAllocator;
pub use config::Config;
pub use consumer::ConsumerService;
pub use engine::CreditEngine;
pub use error::{Error, LimitScope, Result};
pub use types::{
    Consumer, ConsumerId, ConsumerPatch, CreateSubLimitRequest, CreateTransactionRequest,
    CreditSubLimit, NewConsumerRequest, SubLimitId, Tenor, Transaction, TransactionId,
    TransactionStatus,
};
pub use underwriter::Underwriter;
