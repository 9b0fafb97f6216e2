//! Core types for the credit engine
//!
//! Entities reference each other by id only: a consumer owns its sub-limits
//! and loan transactions through lookups on `consumer_id`, never by holding
//! them in memory.
//!
//! All money is `Decimal`, stored at two decimal places.

use crate::{pricing, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted format for birth dates on the wire
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Length of a national identity number
pub const NATIONAL_ID_LEN: usize = 16;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw row id
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw row id
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Consumer primary key
    ConsumerId
);
row_id!(
    /// Credit sub-limit primary key
    SubLimitId
);
row_id!(
    /// Loan transaction primary key
    TransactionId
);

/// Loan repayment period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Tenor {
    /// 1 month
    One,
    /// 2 months
    Two,
    /// 3 months
    Three,
    /// 6 months
    Six,
}

impl Tenor {
    /// Every tenor a sub-limit can be allocated for
    pub const ALL: [Tenor; 4] = [Tenor::One, Tenor::Two, Tenor::Three, Tenor::Six];

    /// Number of monthly installments
    pub fn months(&self) -> i32 {
        match self {
            Tenor::One => 1,
            Tenor::Two => 2,
            Tenor::Three => 3,
            Tenor::Six => 6,
        }
    }
}

impl TryFrom<i32> for Tenor {
    type Error = Error;

    fn try_from(months: i32) -> Result<Self> {
        match months {
            1 => Ok(Tenor::One),
            2 => Ok(Tenor::Two),
            3 => Ok(Tenor::Three),
            6 => Ok(Tenor::Six),
            other => Err(Error::InvalidTenor(other)),
        }
    }
}

impl From<Tenor> for i32 {
    fn from(tenor: Tenor) -> Self {
        tenor.months()
    }
}

impl fmt::Display for Tenor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.months())
    }
}

/// Consumer aggregate root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    /// Primary key
    pub id: ConsumerId,

    /// National identity number (unique)
    pub national_id: String,

    /// Full name
    pub full_name: String,

    /// Legal name as on the identity card
    pub legal_name: String,

    /// Place of birth
    pub birth_place: String,

    /// Date of birth
    pub birth_date: Option<NaiveDate>,

    /// Monthly salary
    pub salary: Decimal,

    /// Ceiling on aggregate active principal
    pub overall_credit_limit: Decimal,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

/// Onboarding input, as received from the request layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConsumerRequest {
    /// National identity number
    pub national_id: String,
    /// Full name
    pub full_name: String,
    /// Legal name
    pub legal_name: String,
    /// Place of birth
    pub birth_place: String,
    /// Date of birth, `YYYY-MM-DD`
    pub birth_date: String,
    /// Monthly salary
    pub salary: Decimal,
    /// Overall credit limit
    pub overall_credit_limit: Decimal,
}

impl NewConsumerRequest {
    /// Validate and convert into an insertable record
    pub fn validate(&self) -> Result<NewConsumer> {
        let national_id = self.national_id.trim();
        if national_id.len() != NATIONAL_ID_LEN || !national_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::Validation(format!(
                "national id must be {} digits",
                NATIONAL_ID_LEN
            )));
        }
        let full_name = validate_name("full_name", &self.full_name)?;
        let legal_name = validate_name("legal_name", &self.legal_name)?;
        if self.birth_place.trim().is_empty() {
            return Err(Error::Validation("birth_place is required".to_string()));
        }
        let birth_date = parse_date(&self.birth_date)?;
        validate_salary(self.salary)?;
        validate_overall_limit(self.overall_credit_limit)?;

        Ok(NewConsumer {
            national_id: national_id.to_string(),
            full_name,
            legal_name,
            birth_place: self.birth_place.trim().to_string(),
            birth_date: Some(birth_date),
            salary: self.salary,
            overall_credit_limit: self.overall_credit_limit,
        })
    }
}

/// Validated consumer ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewConsumer {
    /// National identity number
    pub national_id: String,
    /// Full name
    pub full_name: String,
    /// Legal name
    pub legal_name: String,
    /// Place of birth
    pub birth_place: String,
    /// Date of birth
    pub birth_date: Option<NaiveDate>,
    /// Monthly salary
    pub salary: Decimal,
    /// Overall credit limit
    pub overall_credit_limit: Decimal,
}

/// Partial consumer update; only populated fields are written
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerPatch {
    /// New full name
    pub full_name: Option<String>,
    /// New legal name
    pub legal_name: Option<String>,
    /// New place of birth
    pub birth_place: Option<String>,
    /// New date of birth, `YYYY-MM-DD`
    pub birth_date: Option<String>,
    /// New monthly salary
    pub salary: Option<Decimal>,
    /// New overall credit limit
    pub overall_credit_limit: Option<Decimal>,
}

impl ConsumerPatch {
    /// True when no field is populated
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.legal_name.is_none()
            && self.birth_place.is_none()
            && self.birth_date.is_none()
            && self.salary.is_none()
            && self.overall_credit_limit.is_none()
    }

    /// Validate populated fields into typed changes
    pub fn validate(&self) -> Result<ConsumerChanges> {
        let full_name = self
            .full_name
            .as_deref()
            .map(|name| validate_name("full_name", name))
            .transpose()?;
        let legal_name = self
            .legal_name
            .as_deref()
            .map(|name| validate_name("legal_name", name))
            .transpose()?;
        let birth_place = match self.birth_place.as_deref().map(str::trim) {
            Some("") => {
                return Err(Error::Validation("birth_place cannot be empty".to_string()))
            }
            other => other.map(str::to_string),
        };
        let birth_date = self.birth_date.as_deref().map(parse_date).transpose()?;
        if let Some(salary) = self.salary {
            validate_salary(salary)?;
        }
        if let Some(limit) = self.overall_credit_limit {
            validate_overall_limit(limit)?;
        }

        Ok(ConsumerChanges {
            full_name,
            legal_name,
            birth_place,
            birth_date,
            salary: self.salary,
            overall_credit_limit: self.overall_credit_limit,
        })
    }
}

/// Validated partial update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerChanges {
    /// New full name
    pub full_name: Option<String>,
    /// New legal name
    pub legal_name: Option<String>,
    /// New place of birth
    pub birth_place: Option<String>,
    /// New date of birth
    pub birth_date: Option<NaiveDate>,
    /// New monthly salary
    pub salary: Option<Decimal>,
    /// New overall credit limit
    pub overall_credit_limit: Option<Decimal>,
}

impl ConsumerChanges {
    /// Write the populated fields onto `consumer`
    pub fn apply(&self, consumer: &mut Consumer) {
        if let Some(ref name) = self.full_name {
            consumer.full_name = name.clone();
        }
        if let Some(ref name) = self.legal_name {
            consumer.legal_name = name.clone();
        }
        if let Some(ref place) = self.birth_place {
            consumer.birth_place = place.clone();
        }
        if let Some(date) = self.birth_date {
            consumer.birth_date = Some(date);
        }
        if let Some(salary) = self.salary {
            consumer.salary = salary;
        }
        if let Some(limit) = self.overall_credit_limit {
            consumer.overall_credit_limit = limit;
        }
    }
}

/// Credit ceiling scoped to one (consumer, tenor) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSubLimit {
    /// Primary key
    pub id: SubLimitId,

    /// Owning consumer
    pub consumer_id: ConsumerId,

    /// Tenor this ceiling applies to
    pub tenor: Tenor,

    /// Maximum principal for a single loan at this tenor
    pub limit_amount: Decimal,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Sub-limit allocation input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubLimitRequest {
    /// Tenor in months, must be one of 1, 2, 3, 6
    pub tenor_months: i32,
    /// Ceiling amount
    pub limit_amount: Decimal,
}

/// Validated sub-limit ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubLimit {
    /// Owning consumer
    pub consumer_id: ConsumerId,
    /// Tenor
    pub tenor: Tenor,
    /// Ceiling amount
    pub limit_amount: Decimal,
}

/// Loan contract status
///
/// Only `Active` is ever produced; there is no closure workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Outstanding loan, counts towards overall exposure
    Active,
}

impl TransactionStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "ACTIVE",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(TransactionStatus::Active),
            other => Err(Error::Persistence(format!(
                "unknown transaction status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Approved loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Primary key
    pub id: TransactionId,

    /// Borrower
    pub consumer_id: ConsumerId,

    /// Sub-limit the loan was checked against
    pub sub_limit_id: SubLimitId,

    /// Contract number (unique)
    pub contract_number: String,

    /// Contract date
    pub contract_date: DateTime<Utc>,

    /// On-the-road price of the financed asset
    pub otr: Decimal,

    /// Down payment
    pub down_payment: Decimal,

    /// Admin fee
    pub admin_fee: Decimal,

    /// Financed amount: otr - down payment + admin fee
    pub principal: Decimal,

    /// Total flat interest
    pub interest: Decimal,

    /// Monthly installment
    pub installment_value: Decimal,

    /// Repayment period
    pub tenor: Tenor,

    /// Asset name
    pub asset_name: String,

    /// Asset type
    pub asset_type: String,

    /// Sales channel the loan came from
    pub source: String,

    /// Contract status
    pub status: TransactionStatus,

    /// Free-text notes
    pub notes: String,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Principal plus interest
    pub fn total_payable(&self) -> Decimal {
        self.principal + self.interest
    }

    /// Counts towards the consumer's outstanding exposure
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }
}

/// Transaction ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Borrower
    pub consumer_id: ConsumerId,
    /// Sub-limit the loan was checked against
    pub sub_limit_id: SubLimitId,
    /// Contract number
    pub contract_number: String,
    /// Contract date
    pub contract_date: DateTime<Utc>,
    /// On-the-road price
    pub otr: Decimal,
    /// Down payment
    pub down_payment: Decimal,
    /// Admin fee
    pub admin_fee: Decimal,
    /// Principal
    pub principal: Decimal,
    /// Interest
    pub interest: Decimal,
    /// Monthly installment
    pub installment_value: Decimal,
    /// Tenor
    pub tenor: Tenor,
    /// Asset name
    pub asset_name: String,
    /// Asset type
    pub asset_type: String,
    /// Source channel
    pub source: String,
    /// Status
    pub status: TransactionStatus,
    /// Notes
    pub notes: String,
}

/// Loan application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    /// Tenor in months
    pub tenor_months: i32,
    /// On-the-road price, must be positive
    pub otr: Decimal,
    /// Down payment, must not be negative
    #[serde(default)]
    pub down_payment: Decimal,
    /// Admin fee, must not be negative
    #[serde(default)]
    pub admin_fee: Decimal,
    /// Asset name
    pub asset_name: String,
    /// Asset type
    pub asset_type: String,
    /// Sales channel
    pub source: String,
    /// Optional notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateTransactionRequest {
    /// Reject malformed loan terms before any store access
    pub fn validate(&self) -> Result<()> {
        if self.otr <= Decimal::ZERO {
            return Err(Error::Validation("otr must be positive".to_string()));
        }
        if self.down_payment < Decimal::ZERO {
            return Err(Error::Validation("down_payment cannot be negative".to_string()));
        }
        if self.admin_fee < Decimal::ZERO {
            return Err(Error::Validation("admin_fee cannot be negative".to_string()));
        }
        for (field, amount) in [
            ("otr", self.otr),
            ("down_payment", self.down_payment),
            ("admin_fee", self.admin_fee),
        ] {
            pricing::check_money(field, amount)?;
        }
        if pricing::principal(self.otr, self.down_payment, self.admin_fee)? <= Decimal::ZERO {
            return Err(Error::Validation(
                "down_payment leaves nothing to finance".to_string(),
            ));
        }
        for (field, value) in [
            ("asset_name", &self.asset_name),
            ("asset_type", &self.asset_type),
            ("source", &self.source),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{} is required", field)));
            }
        }
        Ok(())
    }
}

fn validate_name(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.chars().count() < 2 {
        return Err(Error::Validation(format!(
            "{} must be at least 2 characters",
            field
        )));
    }
    Ok(value.to_string())
}

fn validate_salary(salary: Decimal) -> Result<()> {
    if salary <= Decimal::ZERO {
        return Err(Error::Validation("salary must be positive".to_string()));
    }
    pricing::check_money("salary", salary)
}

fn validate_overall_limit(limit: Decimal) -> Result<()> {
    if limit < Decimal::ZERO {
        return Err(Error::Validation(
            "overall_credit_limit cannot be negative".to_string(),
        ));
    }
    pricing::check_money("overall_credit_limit", limit)
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        Error::Validation(format!(
            "invalid date '{}', expected format YYYY-MM-DD",
            value
        ))
    })
}
