//! Ledger store contracts
//!
//! Every repository operation takes the active unit of work explicitly.
//! A unit is opened with [`Store::begin`] and finished with exactly one of
//! [`Store::commit`] or [`Store::rollback`]; dropping it unfinished discards
//! its writes and releases its locks.
//!
//! # Backends
//!
//! - [`PgStore`] - PostgreSQL via sqlx, row locks with `SELECT ... FOR UPDATE`
//! - [`InMemoryStore`] - process-local store with the same locking and
//!   atomicity semantics, used by tests

use crate::{
    types::{
        Consumer, ConsumerChanges, ConsumerId, CreditSubLimit, NewConsumer, NewSubLimit,
        NewTransaction, Tenor, Transaction,
    },
    Error, Result,
};
use async_trait::async_trait;

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Unit-of-work factory
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Active unit of work
    type Unit: Send;

    /// Open a unit of work
    async fn begin(&self) -> Result<Self::Unit>;

    /// Make every write in `unit` visible atomically and release its locks
    async fn commit(&self, unit: Self::Unit) -> Result<()>;

    /// Discard every write in `unit` and release its locks
    async fn rollback(&self, unit: Self::Unit) -> Result<()>;

    /// Check the backing storage answers
    async fn health_check(&self) -> Result<()>;
}

/// Consumer aggregate repository
#[async_trait]
pub trait ConsumerRepository: Store {
    /// Read the consumer and hold an exclusive lock on it until `unit` ends
    async fn lock_consumer_for_update(
        &self,
        unit: &mut Self::Unit,
        id: ConsumerId,
    ) -> Result<Consumer>;

    /// Unlocked read
    async fn find_consumer(&self, unit: &mut Self::Unit, id: ConsumerId) -> Result<Consumer>;

    /// Look up by national id
    async fn find_consumer_by_national_id(
        &self,
        unit: &mut Self::Unit,
        national_id: &str,
    ) -> Result<Option<Consumer>>;

    /// All consumers, by id
    async fn list_consumers(&self, unit: &mut Self::Unit) -> Result<Vec<Consumer>>;

    /// Insert a consumer
    async fn insert_consumer(
        &self,
        unit: &mut Self::Unit,
        consumer: &NewConsumer,
    ) -> Result<Consumer>;

    /// Write the populated fields of `changes`
    async fn update_consumer(
        &self,
        unit: &mut Self::Unit,
        id: ConsumerId,
        changes: &ConsumerChanges,
    ) -> Result<Consumer>;

    /// Delete a consumer together with its sub-limits
    async fn delete_consumer(&self, unit: &mut Self::Unit, id: ConsumerId) -> Result<()>;
}

/// Credit sub-limit repository
#[async_trait]
pub trait SubLimitRepository: Store {
    /// Insert a sub-limit
    async fn insert_sub_limit(
        &self,
        unit: &mut Self::Unit,
        sub_limit: &NewSubLimit,
    ) -> Result<CreditSubLimit>;

    /// Sub-limit for (consumer, tenor), if allocated
    async fn find_sub_limit(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
        tenor: Tenor,
    ) -> Result<Option<CreditSubLimit>>;

    /// All sub-limits of a consumer, by tenor
    async fn list_sub_limits(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<CreditSubLimit>>;
}

/// Loan transaction repository
#[async_trait]
pub trait TransactionRepository: Store {
    /// Insert a transaction
    async fn insert_transaction(
        &self,
        unit: &mut Self::Unit,
        transaction: &NewTransaction,
    ) -> Result<Transaction>;

    /// All transactions of a consumer, most recent contract date first
    async fn find_transactions_by_consumer(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>>;

    /// Transactions of a consumer that count towards outstanding exposure
    async fn find_active_transactions(
        &self,
        unit: &mut Self::Unit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>>;
}

/// Everything the engine needs from a backend
pub trait LedgerStore: ConsumerRepository + SubLimitRepository + TransactionRepository {}

impl<T> LedgerStore for T where T: ConsumerRepository + SubLimitRepository + TransactionRepository {}

/// Roll back `unit` and hand back `err`.
///
/// A failing rollback is logged; the caller still sees the original error.
pub async fn abort<S, T>(store: &S, unit: S::Unit, err: Error) -> Result<T>
where
    S: Store,
{
    if let Err(rollback_err) = store.rollback(unit).await {
        tracing::warn!(error = %rollback_err, cause = %err, "Rollback failed");
    }
    Err(err)
}
