//! Property-based tests for underwriting invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Exposure: Σ(active principal) ≤ overall credit limit
//! - Tenor cap: principal ≤ sub-limit amount
//! - Determinism: same terms → same derived fields

use credit_engine::{
    pricing::LoanEconomics, CreateSubLimitRequest, CreateTransactionRequest, CreditEngine,
    Error, NewConsumerRequest, Tenor,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating monetary amounts in whole rupiah
fn amount_strategy(max: i64) -> impl Strategy<Value = Decimal> {
    (1i64..=max).prop_map(Decimal::from)
}

/// Strategy for generating amounts with cents
fn cents_strategy(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (0i64..=max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating supported tenors
fn tenor_strategy() -> impl Strategy<Value = Tenor> {
    prop_oneof![
        Just(Tenor::One),
        Just(Tenor::Two),
        Just(Tenor::Three),
        Just(Tenor::Six),
    ]
}

/// Strategy for generating loan requests, some against unallocated tenors
fn loan_strategy() -> impl Strategy<Value = CreateTransactionRequest> {
    (
        prop_oneof![Just(1), Just(2), Just(3), Just(4), Just(6)],
        amount_strategy(8_000_000),
        cents_strategy(50_000_000),
        cents_strategy(20_000_000),
    )
        .prop_map(|(tenor_months, otr, down_payment, admin_fee)| CreateTransactionRequest {
            tenor_months,
            otr,
            down_payment: down_payment.min(otr),
            admin_fee,
            asset_name: "Yamaha NMAX".to_string(),
            asset_type: "MOTOR".to_string(),
            source: "ECOMMERCE".to_string(),
            notes: None,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: no sequence of loans pushes exposure past either limit
    #[test]
    fn prop_limits_never_exceeded(
        overall_limit in amount_strategy(20_000_000),
        sub_limit_shares in prop::collection::vec(1u32..=100, 3),
        loans in prop::collection::vec(loan_strategy(), 1..20),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let engine = CreditEngine::in_memory().unwrap();
            let consumer = engine
                .consumers()
                .create_consumer(&NewConsumerRequest {
                    national_id: "3273012345670001".to_string(),
                    full_name: "Dewi Lestari".to_string(),
                    legal_name: "Dewi Lestari".to_string(),
                    birth_place: "Surabaya".to_string(),
                    birth_date: "1988-11-02".to_string(),
                    salary: Decimal::from(7_500_000),
                    overall_credit_limit: overall_limit,
                })
                .await
                .unwrap();

            // Tenors 1, 3 and 6 get a share of the overall limit; 2 stays unallocated
            for (tenor, share) in [1, 3, 6].into_iter().zip(&sub_limit_shares) {
                let limit_amount = (overall_limit * Decimal::from(*share) / Decimal::from(100))
                    .round_dp(2);
                engine
                    .allocator()
                    .create_sub_limit(
                        consumer.id,
                        &CreateSubLimitRequest { tenor_months: tenor, limit_amount },
                    )
                    .await
                    .unwrap();
            }

            for loan in &loans {
                match engine.underwriter().create_transaction(consumer.id, loan).await {
                    Ok(_)
                    | Err(Error::LimitExceeded { .. })
                    | Err(Error::SubLimitNotFound { .. })
                    | Err(Error::Validation(_)) => {}
                    Err(other) => panic!("unexpected error: {:?}", other),
                }
            }

            let sub_limits = engine.allocator().list_sub_limits(consumer.id).await.unwrap();
            let transactions = engine
                .underwriter()
                .get_transactions_for_consumer(consumer.id)
                .await
                .unwrap();

            let active: Decimal = transactions
                .iter()
                .filter(|t| t.is_active())
                .map(|t| t.principal)
                .sum();
            assert!(active <= overall_limit);

            for transaction in &transactions {
                let sub_limit = sub_limits
                    .iter()
                    .find(|s| s.id == transaction.sub_limit_id)
                    .unwrap();
                assert_eq!(sub_limit.tenor, transaction.tenor);
                assert!(transaction.principal <= sub_limit.limit_amount);
            }
        });
    }

    /// Property: derived fields depend only on the loan terms
    #[test]
    fn prop_economics_deterministic(
        otr in amount_strategy(100_000_000),
        down_payment in cents_strategy(1_000_000_000),
        admin_fee in cents_strategy(100_000_000),
        tenor in tenor_strategy(),
    ) {
        let first = LoanEconomics::compute(otr, down_payment, admin_fee, tenor).unwrap();
        let second = LoanEconomics::compute(otr, down_payment, admin_fee, tenor).unwrap();
        prop_assert_eq!(first, second);

        prop_assert_eq!(first.principal, otr - down_payment + admin_fee);
        prop_assert!(first.interest.scale() <= 2);
        prop_assert!(first.installment_value.scale() <= 2);

        // Installments cover the total payable to within rounding
        let months = Decimal::from(tenor.months());
        let shortfall = (first.total_payable() - first.installment_value * months).abs();
        prop_assert!(shortfall <= Decimal::new(1, 2) * months);
    }
}
