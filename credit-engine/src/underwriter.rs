//! Transaction Underwriter
//!
//! Validates, prices and commits a new loan against the consumer's per-tenor
//! sub-limit and overall credit limit.
//!
//! # Algorithm
//!
//! 1. Open a unit of work
//! 2. Lock the consumer row (held until commit or rollback)
//! 3. Look up the sub-limit for the requested tenor
//! 4. `principal = otr - down_payment + admin_fee`, must fit the sub-limit
//! 5. Sum of active principal plus `principal` must fit the overall limit
//! 6. Flat interest and monthly installment
//! 7. Assign a contract number and persist as `ACTIVE`
//! 8. Commit
//!
//! Any failure after step 1 rolls the unit back. Nothing is retried here.

use crate::{
    allocator::{tenor_headroom, SubLimitAllocator},
    contract::ContractNumberGenerator,
    error::LimitScope,
    metrics::Metrics,
    pricing::LoanEconomics,
    store::{abort, LedgerStore},
    types::{
        Consumer, ConsumerId, CreateTransactionRequest, CreditSubLimit, NewTransaction,
        Transaction, TransactionStatus,
    },
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Transaction underwriter
pub struct Underwriter<S> {
    store: Arc<S>,
    allocator: SubLimitAllocator<S>,
    contract_numbers: Arc<dyn ContractNumberGenerator>,
    metrics: Metrics,
}

impl<S> std::fmt::Debug for Underwriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Underwriter").finish_non_exhaustive()
    }
}

impl<S> Clone for Underwriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            allocator: self.allocator.clone(),
            contract_numbers: Arc::clone(&self.contract_numbers),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: LedgerStore> Underwriter<S> {
    /// Create underwriter
    pub fn new(
        store: Arc<S>,
        contract_numbers: Arc<dyn ContractNumberGenerator>,
        metrics: Metrics,
    ) -> Self {
        let allocator = SubLimitAllocator::new(Arc::clone(&store), metrics.clone());
        Self {
            store,
            allocator,
            contract_numbers,
            metrics,
        }
    }

    /// Underwrite and commit a loan.
    ///
    /// Concurrent calls for the same consumer are serialized on the consumer
    /// row lock, so the exposure check always sees every loan committed
    /// before the lock was granted.
    #[instrument(skip(self, request), fields(tenor = request.tenor_months))]
    pub async fn create_transaction(
        &self,
        consumer_id: ConsumerId,
        request: &CreateTransactionRequest,
    ) -> Result<Transaction> {
        let start = Instant::now();
        let result = self.underwrite(consumer_id, request).await;
        self.metrics
            .record_underwriting_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(transaction) => {
                self.metrics.record_approval(transaction.principal);
                info!(
                    consumer_id = %consumer_id,
                    contract_number = %transaction.contract_number,
                    principal = %transaction.principal,
                    "Transaction approved"
                );
            }
            Err(err) => {
                self.metrics.record_rejection(err.kind());
                warn!(consumer_id = %consumer_id, error = %err, "Transaction rejected");
            }
        }

        result
    }

    async fn underwrite(
        &self,
        consumer_id: ConsumerId,
        request: &CreateTransactionRequest,
    ) -> Result<Transaction> {
        request.validate()?;

        let mut unit = self.store.begin().await?;

        let new_transaction = match self.assemble(&mut unit, consumer_id, request).await {
            Ok(new_transaction) => new_transaction,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        let transaction = match self
            .store
            .insert_transaction(&mut unit, &new_transaction)
            .await
        {
            Ok(transaction) => transaction,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        // A failed commit has already discarded the unit
        self.store.commit(unit).await?;

        Ok(transaction)
    }

    /// Steps 2 to 7, all inside `unit`
    async fn assemble(
        &self,
        unit: &mut S::Unit,
        consumer_id: ConsumerId,
        request: &CreateTransactionRequest,
    ) -> Result<NewTransaction> {
        let consumer = self.store.lock_consumer_for_update(unit, consumer_id).await?;

        let sub_limit = self
            .allocator
            .find_in_unit(unit, consumer_id, request.tenor_months)
            .await?;

        let economics = LoanEconomics::compute(
            request.otr,
            request.down_payment,
            request.admin_fee,
            sub_limit.tenor,
        )?;
        tenor_headroom(&sub_limit, economics.principal)?;

        let active_sum = self.active_principal(unit, consumer_id).await?;
        overall_headroom(&consumer, active_sum, economics.principal)?;

        let contract_date = Utc::now();
        Ok(new_transaction(
            &consumer,
            &sub_limit,
            request,
            economics,
            self.contract_numbers.generate(contract_date),
            contract_date,
        ))
    }

    async fn active_principal(&self, unit: &mut S::Unit, consumer_id: ConsumerId) -> Result<Decimal> {
        let active = self.store.find_active_transactions(unit, consumer_id).await?;
        Ok(active.iter().map(|t| t.principal).sum())
    }

    /// All transactions of a consumer, most recent contract date first
    pub async fn get_transactions_for_consumer(
        &self,
        consumer_id: ConsumerId,
    ) -> Result<Vec<Transaction>> {
        let mut unit = self.store.begin().await?;

        if let Err(err) = self.store.find_consumer(&mut unit, consumer_id).await {
            return abort(&*self.store, unit, err).await;
        }

        match self
            .store
            .find_transactions_by_consumer(&mut unit, consumer_id)
            .await
        {
            Ok(transactions) => {
                self.store.commit(unit).await?;
                Ok(transactions)
            }
            Err(err) => abort(&*self.store, unit, err).await,
        }
    }

    /// Sub-limit allocator sharing this underwriter's store
    pub fn allocator(&self) -> &SubLimitAllocator<S> {
        &self.allocator
    }
}

fn overall_headroom(consumer: &Consumer, active_sum: Decimal, principal: Decimal) -> Result<()> {
    if active_sum + principal > consumer.overall_credit_limit {
        return Err(Error::LimitExceeded {
            scope: LimitScope::Overall,
            requested: principal,
            available: consumer.overall_credit_limit - active_sum,
        });
    }
    Ok(())
}

fn new_transaction(
    consumer: &Consumer,
    sub_limit: &CreditSubLimit,
    request: &CreateTransactionRequest,
    economics: LoanEconomics,
    contract_number: String,
    contract_date: chrono::DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        consumer_id: consumer.id,
        sub_limit_id: sub_limit.id,
        contract_number,
        contract_date,
        otr: request.otr,
        down_payment: request.down_payment,
        admin_fee: request.admin_fee,
        principal: economics.principal,
        interest: economics.interest,
        installment_value: economics.installment_value,
        tenor: sub_limit.tenor,
        asset_name: request.asset_name.trim().to_string(),
        asset_type: request.asset_type.trim().to_string(),
        source: request.source.trim().to_string(),
        status: TransactionStatus::Active,
        notes: request.notes.clone().unwrap_or_default(),
    }
}
