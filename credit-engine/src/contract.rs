//! Contract number generation
//!
//! Numbers are `PREFIX/<unix millis>/<6 random digits>`. They are not
//! guaranteed unique; the `contract_number` uniqueness constraint in the
//! store is what rejects a collision, which surfaces as
//! [`Error::Persistence`](crate::Error::Persistence).

use chrono::{DateTime, Utc};
use rand::Rng;

/// Default contract number prefix
pub const DEFAULT_CONTRACT_PREFIX: &str = "KONTRAK";

/// Source of contract numbers for new loans
pub trait ContractNumberGenerator: Send + Sync {
    /// Produce a contract number for a loan dated `at`
    fn generate(&self, at: DateTime<Utc>) -> String;
}

/// Timestamp plus random suffix
#[derive(Debug, Clone)]
pub struct TimestampContractNumbers {
    prefix: String,
}

impl TimestampContractNumbers {
    /// Create generator with a prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for TimestampContractNumbers {
    fn default() -> Self {
        Self::new(DEFAULT_CONTRACT_PREFIX)
    }
}

impl ContractNumberGenerator for TimestampContractNumbers {
    fn generate(&self, at: DateTime<Utc>) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{}/{}/{:06}", self.prefix, at.timestamp_millis(), suffix)
    }
}
