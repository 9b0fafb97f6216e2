//! Consumer onboarding and maintenance
//!
//! Plain CRUD over the consumer aggregate. None of these operations take the
//! underwriting lock; each runs in its own unit of work.

use crate::{
    store::{abort, LedgerStore},
    types::{Consumer, ConsumerId, ConsumerPatch, NewConsumerRequest},
    Error, Result,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Consumer service
#[derive(Debug)]
pub struct ConsumerService<S> {
    store: Arc<S>,
}

impl<S> Clone for ConsumerService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> ConsumerService<S> {
    /// Create service over a store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Onboard a consumer
    #[instrument(skip(self, request))]
    pub async fn create_consumer(&self, request: &NewConsumerRequest) -> Result<Consumer> {
        let new_consumer = request.validate()?;

        let mut unit = self.store.begin().await?;

        match self
            .store
            .find_consumer_by_national_id(&mut unit, &new_consumer.national_id)
            .await
        {
            Ok(None) => {}
            Ok(Some(_)) => {
                let err = Error::DuplicateConsumer(new_consumer.national_id.clone());
                return abort(&*self.store, unit, err).await;
            }
            Err(err) => return abort(&*self.store, unit, err).await,
        }

        let consumer = match self.store.insert_consumer(&mut unit, &new_consumer).await {
            Ok(consumer) => consumer,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        self.store.commit(unit).await?;

        info!(consumer_id = %consumer.id, "Consumer created");
        Ok(consumer)
    }

    /// Consumer by id
    pub async fn get_consumer(&self, id: ConsumerId) -> Result<Consumer> {
        let mut unit = self.store.begin().await?;
        match self.store.find_consumer(&mut unit, id).await {
            Ok(consumer) => {
                self.store.commit(unit).await?;
                Ok(consumer)
            }
            Err(err) => abort(&*self.store, unit, err).await,
        }
    }

    /// Consumer by national id
    pub async fn get_consumer_by_national_id(&self, national_id: &str) -> Result<Option<Consumer>> {
        let mut unit = self.store.begin().await?;
        match self
            .store
            .find_consumer_by_national_id(&mut unit, national_id.trim())
            .await
        {
            Ok(consumer) => {
                self.store.commit(unit).await?;
                Ok(consumer)
            }
            Err(err) => abort(&*self.store, unit, err).await,
        }
    }

    /// All consumers
    pub async fn list_consumers(&self) -> Result<Vec<Consumer>> {
        let mut unit = self.store.begin().await?;
        match self.store.list_consumers(&mut unit).await {
            Ok(consumers) => {
                self.store.commit(unit).await?;
                Ok(consumers)
            }
            Err(err) => abort(&*self.store, unit, err).await,
        }
    }

    /// Apply a partial update.
    ///
    /// The existence read and the write share one unit of work. An empty
    /// patch returns the consumer unchanged.
    #[instrument(skip(self, patch))]
    pub async fn update_consumer(&self, id: ConsumerId, patch: &ConsumerPatch) -> Result<Consumer> {
        let changes = patch.validate()?;

        let mut unit = self.store.begin().await?;

        let current = match self.store.find_consumer(&mut unit, id).await {
            Ok(consumer) => consumer,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        if patch.is_empty() {
            self.store.commit(unit).await?;
            return Ok(current);
        }

        let updated = match self.store.update_consumer(&mut unit, id, &changes).await {
            Ok(consumer) => consumer,
            Err(err) => return abort(&*self.store, unit, err).await,
        };

        self.store.commit(unit).await?;

        info!(consumer_id = %id, "Consumer updated");
        Ok(updated)
    }

    /// Delete a consumer and its sub-limits.
    ///
    /// Refused with [`Error::ConsumerInUse`] while any transaction references
    /// the consumer.
    #[instrument(skip(self))]
    pub async fn delete_consumer(&self, id: ConsumerId) -> Result<()> {
        let mut unit = self.store.begin().await?;

        if let Err(err) = self.store.lock_consumer_for_update(&mut unit, id).await {
            return abort(&*self.store, unit, err).await;
        }

        match self.store.find_transactions_by_consumer(&mut unit, id).await {
            Ok(transactions) if !transactions.is_empty() => {
                return abort(&*self.store, unit, Error::ConsumerInUse(id)).await;
            }
            Ok(_) => {}
            Err(err) => return abort(&*self.store, unit, err).await,
        }

        if let Err(err) = self.store.delete_consumer(&mut unit, id).await {
            return abort(&*self.store, unit, err).await;
        }

        self.store.commit(unit).await?;

        info!(consumer_id = %id, "Consumer deleted");
        Ok(())
    }
}
