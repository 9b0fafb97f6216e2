//! Credit engine facade
//!
//! Wires a store, the services and the metrics registry together.

use crate::{
    allocator::SubLimitAllocator,
    config::Config,
    consumer::ConsumerService,
    contract::{ContractNumberGenerator, TimestampContractNumbers},
    metrics::Metrics,
    store::{InMemoryStore, LedgerStore, PgStore},
    underwriter::Underwriter,
    Result,
};
use std::sync::Arc;
use tracing::info;

/// Main engine interface
pub struct CreditEngine<S> {
    store: Arc<S>,
    consumers: ConsumerService<S>,
    underwriter: Underwriter<S>,
    metrics: Metrics,
}

impl<S> std::fmt::Debug for CreditEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditEngine")
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl<S: LedgerStore> CreditEngine<S> {
    /// Build engine over an existing store
    pub fn new(store: S, contract_numbers: Arc<dyn ContractNumberGenerator>) -> Result<Self> {
        let metrics = Metrics::new()?;
        let store = Arc::new(store);

        Ok(Self {
            consumers: ConsumerService::new(Arc::clone(&store)),
            underwriter: Underwriter::new(Arc::clone(&store), contract_numbers, metrics.clone()),
            store,
            metrics,
        })
    }

    /// Consumer onboarding and maintenance
    pub fn consumers(&self) -> &ConsumerService<S> {
        &self.consumers
    }

    /// Sub-limit allocation
    pub fn allocator(&self) -> &SubLimitAllocator<S> {
        self.underwriter.allocator()
    }

    /// Loan underwriting
    pub fn underwriter(&self) -> &Underwriter<S> {
        &self.underwriter
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl CreditEngine<PgStore> {
    /// Connect to Postgres and build the engine
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = PgStore::connect(&config.database).await?;
        if config.database.init_schema {
            store.init_schema().await?;
        }

        info!(
            max_connections = config.database.max_connections,
            contract_prefix = %config.underwriting.contract_prefix,
            "Credit engine connected"
        );

        Self::new(
            store,
            Arc::new(TimestampContractNumbers::new(
                config.underwriting.contract_prefix.clone(),
            )),
        )
    }
}

impl CreditEngine<InMemoryStore> {
    /// Engine over a fresh in-memory store
    pub fn in_memory() -> Result<Self> {
        Self::new(InMemoryStore::new(), Arc::new(TimestampContractNumbers::default()))
    }
}
