//! Loan economics
//!
//! Derived fields of a loan are computed once, at approval, from the
//! requested terms alone:
//!
//! ```text
//! principal   = otr - down_payment + admin_fee
//! interest    = principal * FLAT_INTEREST_RATE
//! installment = (principal + interest) / tenor_months
//! ```
//!
//! Every amount is rounded to 2 decimal places, half away from zero, to
//! match the `NUMERIC(19,2)` storage columns.

use crate::{types::Tenor, Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};

/// Flat interest rate applied to the principal, independent of tenor (10%)
pub const FLAT_INTEREST_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Scale of stored monetary amounts
pub const MONEY_SCALE: u32 = 2;

/// Largest magnitude a `NUMERIC(19,2)` column holds, 99,999,999,999,999,999.99
pub const MAX_MONEY_AMOUNT: Decimal = Decimal::from_parts(0x89E7_FFFF, 0x8AC7_2304, 0, false, 2);

/// Round to storage precision
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject an input amount the storage columns cannot hold exactly
pub fn check_money(field: &str, amount: Decimal) -> Result<()> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(Error::Validation(format!(
            "{} has more than {} decimal places",
            field, MONEY_SCALE
        )));
    }
    if amount.abs() > MAX_MONEY_AMOUNT {
        return Err(Error::Validation(format!("{} is out of range", field)));
    }
    Ok(())
}

/// Financed amount for a single loan, before any limit check
pub fn principal(otr: Decimal, down_payment: Decimal, admin_fee: Decimal) -> Result<Decimal> {
    otr.checked_sub(down_payment)
        .and_then(|amount| amount.checked_add(admin_fee))
        .filter(|amount| amount.abs() <= MAX_MONEY_AMOUNT)
        .map(round_money)
        .ok_or_else(|| Error::Validation("amount out of range".to_string()))
}

/// Derived values of an approved loan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanEconomics {
    /// Financed amount
    pub principal: Decimal,
    /// Total flat interest
    pub interest: Decimal,
    /// Monthly installment
    pub installment_value: Decimal,
}

impl LoanEconomics {
    /// Compute interest and installment for a principal
    pub fn for_principal(principal: Decimal, tenor: Tenor) -> Self {
        let interest = round_money(principal * FLAT_INTEREST_RATE);
        let installment_value =
            round_money((principal + interest) / Decimal::from(tenor.months()));

        Self {
            principal,
            interest,
            installment_value,
        }
    }

    /// Compute from the requested terms
    pub fn compute(
        otr: Decimal,
        down_payment: Decimal,
        admin_fee: Decimal,
        tenor: Tenor,
    ) -> Result<Self> {
        Ok(Self::for_principal(principal(otr, down_payment, admin_fee)?, tenor))
    }

    /// Principal plus interest
    pub fn total_payable(&self) -> Decimal {
        self.principal + self.interest
    }
}
