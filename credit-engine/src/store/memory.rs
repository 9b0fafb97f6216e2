//! In-memory ledger store
//!
//! Mirrors the relational backend closely enough for the engine's
//! correctness properties to be tested without a database:
//!
//! - Writes are staged in the unit of work and applied atomically on commit
//! - Reads inside a unit see committed rows plus the unit's own staged writes
//! - `lock_consumer_for_update` takes a per-consumer async mutex held until
//!   the unit ends
//! - Uniqueness and foreign-key constraints are checked on insert and again
//!   on commit, failing with [`Error::Persistence`]

use super::{ConsumerRepository, Store, SubLimitRepository, TransactionRepository};
use crate::{
    types::{
        Consumer, ConsumerChanges, ConsumerId, CreditSubLimit, NewConsumer, NewSubLimit,
        NewTransaction, SubLimitId, Tenor, Transaction, TransactionId,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

/// Committed rows
#[derive(Debug, Clone, Default)]
struct Tables {
    consumers: BTreeMap<ConsumerId, Consumer>,
    sub_limits: BTreeMap<SubLimitId, CreditSubLimit>,
    transactions: BTreeMap<TransactionId, Transaction>,
}

/// Staged write
#[derive(Debug, Clone)]
enum Change {
    InsertConsumer(Consumer),
    UpdateConsumer(Consumer),
    DeleteConsumer(ConsumerId),
    InsertSubLimit(CreditSubLimit),
    InsertTransaction(Transaction),
}

impl Tables {
    fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::InsertConsumer(consumer) => {
                if self
                    .consumers
                    .values()
                    .any(|c| c.national_id == consumer.national_id)
                {
                    return Err(constraint_violation("consumers_national_id_key"));
                }
                self.consumers.insert(consumer.id, consumer.clone());
            }
            Change::UpdateConsumer(consumer) => {
                let existing = self
                    .consumers
                    .get_mut(&consumer.id)
                    .ok_or(Error::ConsumerNotFound(consumer.id))?;
                *existing = consumer.clone();
            }
            Change::DeleteConsumer(id) => {
                if self.transactions.values().any(|t| t.consumer_id == *id) {
                    return Err(constraint_violation("transactions_consumer_id_fkey"));
                }
                if self.consumers.remove(id).is_none() {
                    return Err(Error::ConsumerNotFound(*id));
                }
                self.sub_limits.retain(|_, s| s.consumer_id != *id);
            }
            Change::InsertSubLimit(sub_limit) => {
                if !self.consumers.contains_key(&sub_limit.consumer_id) {
                    return Err(constraint_violation("credit_sub_limits_consumer_id_fkey"));
                }
                if self.sub_limits.values().any(|s| {
                    s.consumer_id == sub_limit.consumer_id && s.tenor == sub_limit.tenor
                }) {
                    return Err(constraint_violation(
                        "credit_sub_limits_consumer_id_tenor_months_key",
                    ));
                }
                self.sub_limits.insert(sub_limit.id, sub_limit.clone());
            }
            Change::InsertTransaction(transaction) => {
                if !self.consumers.contains_key(&transaction.consumer_id) {
                    return Err(constraint_violation("transactions_consumer_id_fkey"));
                }
                if !self.sub_limits.contains_key(&transaction.sub_limit_id) {
                    return Err(constraint_violation("transactions_sub_limit_id_fkey"));
                }
                if self
                    .transactions
                    .values()
                    .any(|t| t.contract_number == transaction.contract_number)
                {
                    return Err(constraint_violation("transactions_contract_number_key"));
                }
                self.transactions.insert(transaction.id, transaction.clone());
            }
        }
        Ok(())
    }
}

fn constraint_violation(constraint: &str) -> Error {
    Error::Persistence(format!("constraint \"{}\" violated", constraint))
}

/// Unit of work against [`InMemoryStore`]
#[derive(Debug, Default)]
pub struct MemoryUnit {
    changes: Vec<Change>,
    locked: HashSet<ConsumerId>,
    guards: Vec<OwnedMutexGuard<()>>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: DashMap<ConsumerId, Arc<RowLock<()>>>,
    consumer_seq: AtomicI64,
    sub_limit_seq: AtomicI64,
    transaction_seq: AtomicI64,
    fail_next_commit: AtomicBool,
}

/// Process-local ledger store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with a persistence error, discarding its writes
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn next_id(seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Committed rows overlaid with the unit's staged writes
    fn view(&self, unit: &MemoryUnit) -> Result<Tables> {
        let mut tables = self.shared.tables.lock().clone();
        for change in &unit.changes {
            tables.apply(change)?;
        }
        Ok(tables)
    }

    /// Check `change` against the unit's view, then stage it
    fn stage(&self, unit: &mut MemoryUnit, change: Change) -> Result<()> {
        let mut view = self.view(unit)?;
        view.apply(&change)?;
        unit.changes.push(change);
        Ok(())
    }

    fn apply_committed(&self, changes: &[Change]) -> Result<()> {
        {
            let mut tables = self.shared.tables.lock();
            let mut next = tables.clone();
            for change in changes {
                next.apply(change)?;
            }
            *tables = next;
        }

        // Deleted consumers can never be locked again
        for change in changes {
            if let Change::DeleteConsumer(id) = change {
                self.shared.row_locks.remove(id);
            }
        }
        Ok(())
    }

    fn row_lock(&self, id: ConsumerId) -> Arc<RowLock<()>> {
        self.shared.row_locks.entry(id).or_default().clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit> {
        Ok(MemoryUnit::default())
    }

    async fn commit(&self, unit: MemoryUnit) -> Result<()> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::Persistence("commit failed".to_string()));
        }

        self.apply_committed(&unit.changes)?;

        tracing::debug!(
            changes = unit.changes.len(),
            locks = unit.guards.len(),
            "Unit of work committed"
        );

        // Row locks are released only after the writes are visible
        drop(unit);
        Ok(())
    }

    async fn rollback(&self, unit: MemoryUnit) -> Result<()> {
        tracing::debug!(discarded = unit.changes.len(), "Unit of work rolled back");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ConsumerRepository for InMemoryStore {
    async fn lock_consumer_for_update(
        &self,
        unit: &mut MemoryUnit,
        id: ConsumerId,
    ) -> Result<Consumer> {
        // No lock entry for ids that do not exist
        self.find_consumer(unit, id).await?;

        if unit.locked.insert(id) {
            let guard = self.row_lock(id).lock_owned().await;
            unit.guards.push(guard);
        }
        self.find_consumer(unit, id).await
    }

    async fn find_consumer(&self, unit: &mut MemoryUnit, id: ConsumerId) -> Result<Consumer> {
        self.view(unit)?
            .consumers
            .remove(&id)
            .ok_or(Error::ConsumerNotFound(id))
    }

    async fn find_consumer_by_national_id(
        &self,
        unit: &mut MemoryUnit,
        national_id: &str,
    ) -> Result<Option<Consumer>> {
        Ok(self
            .view(unit)?
            .consumers
            .into_values()
            .find(|c| c.national_id == national_id))
    }

    async fn list_consumers(&self, unit: &mut MemoryUnit) -> Result<Vec<Consumer>> {
        Ok(self.view(unit)?.consumers.into_values().collect())
    }

    async fn insert_consumer(
        &self,
        unit: &mut MemoryUnit,
        consumer: &NewConsumer,
    ) -> Result<Consumer> {
        let now = Utc::now();
        let consumer = Consumer {
            id: ConsumerId::new(Self::next_id(&self.shared.consumer_seq)),
            national_id: consumer.national_id.clone(),
            full_name: consumer.full_name.clone(),
            legal_name: consumer.legal_name.clone(),
            birth_place: consumer.birth_place.clone(),
            birth_date: consumer.birth_date,
            salary: consumer.salary,
            overall_credit_limit: consumer.overall_credit_limit,
            created_at: now,
            updated_at: now,
        };
        self.stage(unit, Change::InsertConsumer(consumer.clone()))?;
        Ok(consumer)
    }

    async fn update_consumer(
        &self,
        unit: &mut MemoryUnit,
        id: ConsumerId,
        changes: &ConsumerChanges,
    ) -> Result<Consumer> {
        let mut consumer = self.find_consumer(unit, id).await?;
        changes.apply(&mut consumer);
        consumer.updated_at = Utc::now();
        self.stage(unit, Change::UpdateConsumer(consumer.clone()))?;
        Ok(consumer)
    }

    async fn delete_consumer(&self, unit: &mut MemoryUnit, id: ConsumerId) -> Result<()> {
        self.stage(unit, Change::DeleteConsumer(id))
    }
}

#[async_trait]
impl SubLimitRepository for InMemoryStore {
    async fn insert_sub_limit(
        &self,
        unit: &mut MemoryUnit,
        sub_limit: &NewSubLimit,
    ) -> Result<CreditSubLimit> {
        let sub_limit = CreditSubLimit {
            id: SubLimitId::new(Self::next_id(&self.shared.sub_limit_seq)),
            consumer_id: sub_limit.consumer_id,
            tenor: sub_limit.tenor,
            limit_amount: sub_limit.limit_amount,
            created_at: Utc::now(),
        };
        self.stage(unit, Change::InsertSubLimit(sub_limit.clone()))?;
        Ok(sub_limit)
    }

    async fn find_sub_limit(
        &self,
        unit: &mut MemoryUnit,
        consumer_id: ConsumerId,
        tenor: Tenor,
    ) -> Result<Option<CreditSubLimit>> {
        Ok(self
            .view(unit)?
            .sub_limits
            .into_values()
            .find(|s| s.consumer_id == consumer_id && s.tenor == tenor))
    }

    async fn list_sub_limits(
        &self,
        unit: &mut MemoryUnit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<CreditSubLimit>> {
        let mut sub_limits: Vec<CreditSubLimit> = self
            .view(unit)?
            .sub_limits
            .into_values()
            .filter(|s| s.consumer_id == consumer_id)
            .collect();
        sub_limits.sort_by_key(|s| s.tenor);
        Ok(sub_limits)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn insert_transaction(
        &self,
        unit: &mut MemoryUnit,
        transaction: &NewTransaction,
    ) -> Result<Transaction> {
        let transaction = Transaction {
            id: TransactionId::new(Self::next_id(&self.shared.transaction_seq)),
            consumer_id: transaction.consumer_id,
            sub_limit_id: transaction.sub_limit_id,
            contract_number: transaction.contract_number.clone(),
            contract_date: transaction.contract_date,
            otr: transaction.otr,
            down_payment: transaction.down_payment,
            admin_fee: transaction.admin_fee,
            principal: transaction.principal,
            interest: transaction.interest,
            installment_value: transaction.installment_value,
            tenor: transaction.tenor,
            asset_name: transaction.asset_name.clone(),
            asset_type: transaction.asset_type.clone(),
            source: transaction.source.clone(),
            status: transaction.status,
            notes: transaction.notes.clone(),
            created_at: Utc::now(),
        };
        self.stage(unit, Change::InsertTransaction(transaction.clone()))?;
        Ok(transaction)
    }

    async fn find_transactions_by_consumer(
        &self,
        unit: &mut MemoryUnit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .view(unit)?
            .transactions
            .into_values()
            .filter(|t| t.consumer_id == consumer_id)
            .collect();
        transactions.sort_by(|a, b| {
            b.contract_date
                .cmp(&a.contract_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(transactions)
    }

    async fn find_active_transactions(
        &self,
        unit: &mut MemoryUnit,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .view(unit)?
            .transactions
            .into_values()
            .filter(|t| t.consumer_id == consumer_id && t.is_active())
            .collect())
    }
}
