//! Sub-Limit Allocator
//!
//! Allocates per-tenor credit sub-limits for a consumer and looks them up.
//! Allocation does not take the consumer lock; two concurrent allocations for
//! the same (consumer, tenor) race, and the loser is rejected by the storage
//! uniqueness constraint as [`Error::Persistence`].

use crate::{
    error::LimitScope,
    metrics::Metrics,
    pricing,
    store::{abort, LedgerStore},
    types::{ConsumerId, CreateSubLimitRequest, CreditSubLimit, NewSubLimit, Tenor},
    Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Sub-limit allocator
#[derive(Debug)]
pub struct SubLimitAllocator<S> {
    store: Arc<S>,
    metrics: Metrics,
}

impl<S> Clone for SubLimitAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: LedgerStore> SubLimitAllocator<S> {
    /// Create allocator over a store
    pub fn new(store: Arc<S>, metrics: Metrics) -> Self {
        Self { store, metrics }
    }

    /// Allocate a sub-limit.
    ///
    /// Checks run in order: consumer exists, tenor is valid, tenor not yet
    /// allocated, amount within the overall limit.
    #[instrument(skip(self, request), fields(tenor = request.tenor_months))]
    pub async fn create_sub_limit(
        &self,
        consumer_id: ConsumerId,
        request: &CreateSubLimitRequest,
    ) -> Result<CreditSubLimit> {
        if request.limit_amount < Decimal::ZERO {
            return Err(Error::Validation(
                "limit_amount cannot be negative".to_string(),
            ));
        }
        pricing::check_money("limit_amount", request.limit_amount)?;

        let mut unit = self.store.begin().await?;

        let consumer = match self.store.find_consumer(&mut unit, consumer_id).await {
            Ok(consumer) => consumer,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        let tenor = match Tenor::try_from(request.tenor_months) {
            Ok(tenor) => tenor,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        match self.store.find_sub_limit(&mut unit, consumer_id, tenor).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                let err = Error::DuplicateSubLimit { consumer_id, tenor };
                return abort(&*self.store, unit, err).await;
            }
            Err(err) => return abort(&*self.store, unit, err).await,
        }

        if request.limit_amount > consumer.overall_credit_limit {
            warn!(
                consumer_id = %consumer_id,
                requested = %request.limit_amount,
                overall_limit = %consumer.overall_credit_limit,
                "Sub-limit exceeds overall limit"
            );
            let err = Error::LimitExceeded {
                scope: LimitScope::Overall,
                requested: request.limit_amount,
                available: consumer.overall_credit_limit,
            };
            return abort(&*self.store, unit, err).await;
        }

        let new_sub_limit = NewSubLimit {
            consumer_id,
            tenor,
            limit_amount: request.limit_amount,
        };
        let sub_limit = match self.store.insert_sub_limit(&mut unit, &new_sub_limit).await {
            Ok(sub_limit) => sub_limit,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        self.store.commit(unit).await?;
        self.metrics.record_sub_limit_created();

        info!(
            consumer_id = %consumer_id,
            tenor = %tenor,
            limit_amount = %sub_limit.limit_amount,
            "Sub-limit allocated"
        );
        Ok(sub_limit)
    }

    /// Sub-limit for (consumer, tenor).
    ///
    /// An unsupported tenor cannot have a sub-limit and is reported as
    /// [`Error::SubLimitNotFound`].
    pub async fn find_by_consumer_and_tenor(
        &self,
        consumer_id: ConsumerId,
        tenor_months: i32,
    ) -> Result<CreditSubLimit> {
        let mut unit = self.store.begin().await?;
        match self.find_in_unit(&mut unit, consumer_id, tenor_months).await {
            Ok(sub_limit) => {
                self.store.commit(unit).await?;
                Ok(sub_limit)
            }
            Err(err) => abort(&*self.store, unit, err).await,
        }
    }

    /// Sub-limit lookup inside a caller's unit of work
    pub(crate) async fn find_in_unit(
        &self,
        unit: &mut S::Unit,
        consumer_id: ConsumerId,
        tenor_months: i32,
    ) -> Result<CreditSubLimit> {
        let not_found = || Error::SubLimitNotFound {
            consumer_id,
            tenor_months,
        };
        let tenor = Tenor::try_from(tenor_months).map_err(|_| not_found())?;
        self.store
            .find_sub_limit(unit, consumer_id, tenor)
            .await?
            .ok_or_else(not_found)
    }

    /// All sub-limits of a consumer, by tenor
    pub async fn list_sub_limits(&self, consumer_id: ConsumerId) -> Result<Vec<CreditSubLimit>> {
        let mut unit = self.store.begin().await?;

        if let Err(err) = self.store.find_consumer(&mut unit, consumer_id).await {
            return abort(&*self.store, unit, err).await;
        }

        match self.store.list_sub_limits(&mut unit, consumer_id).await {
            Ok(sub_limits) => {
                self.store.commit(unit).await?;
                Ok(sub_limits)
            }
            Err(err) => abort(&*self.store, unit, err).await,
        }
    }
}

/// Remaining headroom under a sub-limit for a single loan
pub(crate) fn tenor_headroom(sub_limit: &CreditSubLimit, principal: Decimal) -> Result<()> {
    if principal > sub_limit.limit_amount {
        return Err(Error::LimitExceeded {
            scope: LimitScope::Tenor(sub_limit.tenor),
            requested: principal,
            available: sub_limit.limit_amount,
        });
    }
    Ok(())
}
