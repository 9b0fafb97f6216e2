//! Error types for the credit engine

use crate::types::{ConsumerId, Tenor};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Result type for credit engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which ceiling a rejected loan ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// Per-tenor sub-limit
    Tenor(Tenor),
    /// Consumer-wide overall credit limit
    Overall,
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::Tenor(tenor) => write!(f, "tenor {} sub-limit", tenor),
            LimitScope::Overall => write!(f, "overall credit limit"),
        }
    }
}

/// Credit engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Consumer does not exist
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(ConsumerId),

    /// No sub-limit configured for the requested tenor
    #[error("Credit sub-limit for tenor {tenor_months} not found for consumer {consumer_id}")]
    SubLimitNotFound {
        /// Consumer the lookup was made for
        consumer_id: ConsumerId,
        /// Requested tenor, as received
        tenor_months: i32,
    },

    /// Tenor outside the allowed set
    #[error("Invalid tenor: {0}. Allowed tenors are 1, 2, 3, 6")]
    InvalidTenor(i32),

    /// Sub-limit already allocated for (consumer, tenor)
    #[error("Credit sub-limit for tenor {tenor} already exists for consumer {consumer_id}")]
    DuplicateSubLimit {
        /// Consumer
        consumer_id: ConsumerId,
        /// Tenor
        tenor: Tenor,
    },

    /// Amount exceeds a credit ceiling
    #[error("Limit exceeded: amount {requested} exceeds available {scope} ({available})")]
    LimitExceeded {
        /// Ceiling that was hit
        scope: LimitScope,
        /// Amount asked for
        requested: Decimal,
        /// Remaining capacity under the ceiling
        available: Decimal,
    },

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// National id already registered
    #[error("Consumer with national id {0} already exists")]
    DuplicateConsumer(String),

    /// Consumer still referenced by loan transactions
    #[error("Consumer {0} has transactions and cannot be deleted")]
    ConsumerInUse(ConsumerId),

    /// Underlying store failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration or encoding failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Store or infrastructure failure, as opposed to a business rejection.
    ///
    /// Only these are candidates for a caller-side retry.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }

    /// Short machine-readable label, used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ConsumerNotFound(_) => "consumer_not_found",
            Error::SubLimitNotFound { .. } => "sub_limit_not_found",
            Error::InvalidTenor(_) => "invalid_tenor",
            Error::DuplicateSubLimit { .. } => "duplicate_sub_limit",
            Error::LimitExceeded {
                scope: LimitScope::Tenor(_),
                ..
            } => "tenor_limit_exceeded",
            Error::LimitExceeded {
                scope: LimitScope::Overall,
                ..
            } => "overall_limit_exceeded",
            Error::Validation(_) => "validation",
            Error::DuplicateConsumer(_) => "duplicate_consumer",
            Error::ConsumerInUse(_) => "consumer_in_use",
            Error::Persistence(_) => "persistence",
            Error::Config(_) => "config",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_classification() {
        assert!(Error::Persistence("connection reset".to_string()).is_persistence());
        assert!(!Error::InvalidTenor(5).is_persistence());
        assert!(!Error::ConsumerNotFound(ConsumerId::new(1)).is_persistence());
    }

    #[test]
    fn test_limit_exceeded_message() {
        let err = Error::LimitExceeded {
            scope: LimitScope::Overall,
            requested: Decimal::from(6_500_000),
            available: Decimal::from(5_400_000),
        };
        assert_eq!(err.kind(), "overall_limit_exceeded");
        assert!(err.to_string().contains("overall credit limit"));
        assert!(err.to_string().contains("6500000"));
    }

    #[test]
    fn test_metrics_error_keeps_source() {
        let err = Error::from(prometheus::Error::Msg("bad label".to_string()));
        assert_eq!(err.kind(), "metrics");
        assert!(matches!(err, Error::Metrics(prometheus::Error::Msg(_))));
        assert!(err.to_string().contains("bad label"));
    }
}
