//! End-to-end underwriting scenarios against the in-memory store

use chrono::{DateTime, Utc};
use credit_engine::{
    contract::ContractNumberGenerator, store::InMemoryStore, ConsumerId, ConsumerPatch,
    CreateSubLimitRequest, CreateTransactionRequest, CreditEngine, Error, LimitScope,
    NewConsumerRequest, Tenor, TransactionStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct FixedContractNumber(&'static str);

impl ContractNumberGenerator for FixedContractNumber {
    fn generate(&self, _at: DateTime<Utc>) -> String {
        self.0.to_string()
    }
}

fn consumer_request(national_id: &str, overall_limit: Decimal) -> NewConsumerRequest {
    NewConsumerRequest {
        national_id: national_id.to_string(),
        full_name: "Budi Santoso".to_string(),
        legal_name: "Budi Santoso".to_string(),
        birth_place: "Jakarta".to_string(),
        birth_date: "1990-05-17".to_string(),
        salary: dec!(8000000),
        overall_credit_limit: overall_limit,
    }
}

fn loan(tenor_months: i32, otr: Decimal, down_payment: Decimal, admin_fee: Decimal) -> CreateTransactionRequest {
    CreateTransactionRequest {
        tenor_months,
        otr,
        down_payment,
        admin_fee,
        asset_name: "Honda Vario 160".to_string(),
        asset_type: "MOTOR".to_string(),
        source: "DEALER".to_string(),
        notes: None,
    }
}

/// Consumer with a 10,000,000 overall limit and a 5,000,000 six-month sub-limit
async fn scenario_setup(engine: &CreditEngine<InMemoryStore>) -> ConsumerId {
    let consumer = engine
        .consumers()
        .create_consumer(&consumer_request("3171234567890001", dec!(10000000)))
        .await
        .unwrap();
    engine
        .allocator()
        .create_sub_limit(
            consumer.id,
            &CreateSubLimitRequest {
                tenor_months: 6,
                limit_amount: dec!(5000000),
            },
        )
        .await
        .unwrap();
    consumer.id
}

#[tokio::test]
async fn scenario_a_loan_economics() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let transaction = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(5000000), dec!(500000), dec!(100000)))
        .await
        .unwrap();

    assert_eq!(transaction.principal, dec!(4600000));
    assert_eq!(transaction.interest, dec!(460000));
    assert_eq!(transaction.installment_value, dec!(843333.33));
    assert_eq!(transaction.total_payable(), dec!(5060000));
    assert_eq!(transaction.tenor, Tenor::Six);
    assert_eq!(transaction.status, TransactionStatus::Active);
}

#[tokio::test]
async fn scenario_b_tenor_limit_checked_first() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;
    engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(5000000), dec!(500000), dec!(100000)))
        .await
        .unwrap();

    // 6,500,000 breaks both the 5,000,000 sub-limit and the overall limit
    let result = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(6500000), dec!(0), dec!(0)))
        .await;

    assert!(matches!(
        result,
        Err(Error::LimitExceeded {
            scope: LimitScope::Tenor(Tenor::Six),
            ..
        })
    ));
    let transactions = engine
        .underwriter()
        .get_transactions_for_consumer(consumer_id)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
}

#[tokio::test]
async fn scenario_b_overall_limit_exceeded() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer = engine
        .consumers()
        .create_consumer(&consumer_request("3171234567890002", dec!(10000000)))
        .await
        .unwrap();
    engine
        .allocator()
        .create_sub_limit(
            consumer.id,
            &CreateSubLimitRequest {
                tenor_months: 6,
                limit_amount: dec!(10000000),
            },
        )
        .await
        .unwrap();
    engine
        .underwriter()
        .create_transaction(consumer.id, &loan(6, dec!(5000000), dec!(500000), dec!(100000)))
        .await
        .unwrap();

    let result = engine
        .underwriter()
        .create_transaction(consumer.id, &loan(6, dec!(6500000), dec!(0), dec!(0)))
        .await;

    match result {
        Err(Error::LimitExceeded {
            scope: LimitScope::Overall,
            requested,
            available,
        }) => {
            assert_eq!(requested, dec!(6500000));
            assert_eq!(available, dec!(5400000));
        }
        other => panic!("expected overall limit exceeded, got {:?}", other),
    }
    assert_eq!(
        engine
            .metrics()
            .rejected_total
            .with_label_values(&["overall_limit_exceeded"])
            .get(),
        1
    );
}

#[tokio::test]
async fn scenario_c_missing_sub_limit() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let result = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(2, dec!(1000000), dec!(0), dec!(0)))
        .await;

    assert!(matches!(
        result,
        Err(Error::SubLimitNotFound { tenor_months: 2, .. })
    ));
}

#[tokio::test]
async fn scenario_d_duplicate_sub_limit() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let result = engine
        .allocator()
        .create_sub_limit(
            consumer_id,
            &CreateSubLimitRequest {
                tenor_months: 6,
                limit_amount: dec!(1000000),
            },
        )
        .await;

    assert!(matches!(result, Err(Error::DuplicateSubLimit { .. })));
}

#[tokio::test]
async fn scenario_e_invalid_tenor() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let result = engine
        .allocator()
        .create_sub_limit(
            consumer_id,
            &CreateSubLimitRequest {
                tenor_months: 5,
                limit_amount: dec!(1000000),
            },
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidTenor(5))));
}

#[tokio::test]
async fn test_exact_remaining_capacity() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer = engine
        .consumers()
        .create_consumer(&consumer_request("3171234567890003", dec!(10000000)))
        .await
        .unwrap();
    engine
        .allocator()
        .create_sub_limit(
            consumer.id,
            &CreateSubLimitRequest {
                tenor_months: 3,
                limit_amount: dec!(10000000),
            },
        )
        .await
        .unwrap();

    engine
        .underwriter()
        .create_transaction(consumer.id, &loan(3, dec!(4600000), dec!(0), dec!(0)))
        .await
        .unwrap();

    let over = engine
        .underwriter()
        .create_transaction(consumer.id, &loan(3, dec!(5400000.01), dec!(0), dec!(0)))
        .await;
    assert!(matches!(
        over,
        Err(Error::LimitExceeded {
            scope: LimitScope::Overall,
            ..
        })
    ));

    let exact = engine
        .underwriter()
        .create_transaction(consumer.id, &loan(3, dec!(5400000), dec!(0), dec!(0)))
        .await
        .unwrap();
    assert_eq!(exact.principal, dec!(5400000));
}

#[tokio::test]
async fn test_sub_limit_boundary() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let over = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(5000000), dec!(0), dec!(0.01)))
        .await;
    assert!(matches!(
        over,
        Err(Error::LimitExceeded {
            scope: LimitScope::Tenor(Tenor::Six),
            ..
        })
    ));

    let exact = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(5000000), dec!(0), dec!(0)))
        .await;
    assert!(exact.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loans_serialized() {
    let engine = Arc::new(CreditEngine::in_memory().unwrap());
    let consumer = engine
        .consumers()
        .create_consumer(&consumer_request("3171234567890004", dec!(10000000)))
        .await
        .unwrap();
    engine
        .allocator()
        .create_sub_limit(
            consumer.id,
            &CreateSubLimitRequest {
                tenor_months: 6,
                limit_amount: dec!(10000000),
            },
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let consumer_id = consumer.id;
            tokio::spawn(async move {
                engine
                    .underwriter()
                    .create_transaction(consumer_id, &loan(6, dec!(6000000), dec!(0), dec!(0)))
                    .await
            })
        })
        .collect();

    let mut approved = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => approved += 1,
            Err(Error::LimitExceeded {
                scope: LimitScope::Overall,
                ..
            }) => refused += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!((approved, refused), (1, 1));
    let transactions = engine
        .underwriter()
        .get_transactions_for_consumer(consumer.id)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
}

#[tokio::test]
async fn test_failed_commit_leaves_no_transaction() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    engine.store().fail_next_commit();
    let result = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(5000000), dec!(500000), dec!(100000)))
        .await;

    assert!(matches!(result, Err(ref e) if e.is_persistence()));
    let transactions = engine
        .underwriter()
        .get_transactions_for_consumer(consumer_id)
        .await
        .unwrap();
    assert!(transactions.is_empty());

    // The lock was released with the failed unit
    let retry = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(5000000), dec!(500000), dec!(100000)))
        .await;
    assert!(retry.is_ok());
}

#[tokio::test]
async fn test_contract_number_collision() {
    let engine = CreditEngine::new(
        InMemoryStore::new(),
        Arc::new(FixedContractNumber("KONTRAK/0/000000")),
    )
    .unwrap();
    let consumer_id = scenario_setup(&engine).await;

    engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(1000000), dec!(0), dec!(0)))
        .await
        .unwrap();
    let result = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(1000000), dec!(0), dec!(0)))
        .await;

    assert!(matches!(result, Err(Error::Persistence(_))));
    let transactions = engine
        .underwriter()
        .get_transactions_for_consumer(consumer_id)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
}

#[tokio::test]
async fn test_transactions_most_recent_first() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let mut created = Vec::new();
    for otr in [dec!(1000000), dec!(2000000), dec!(1500000)] {
        let transaction = engine
            .underwriter()
            .create_transaction(consumer_id, &loan(6, otr, dec!(0), dec!(0)))
            .await
            .unwrap();
        created.push(transaction.id);
    }

    let listed: Vec<_> = engine
        .underwriter()
        .get_transactions_for_consumer(consumer_id)
        .await
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    created.reverse();
    assert_eq!(listed, created);
}

#[tokio::test]
async fn test_unknown_consumer() {
    let engine = CreditEngine::in_memory().unwrap();
    let missing = ConsumerId::new(404);

    let underwrite = engine
        .underwriter()
        .create_transaction(missing, &loan(6, dec!(1000000), dec!(0), dec!(0)))
        .await;
    assert!(matches!(underwrite, Err(Error::ConsumerNotFound(id)) if id == missing));

    let listing = engine.underwriter().get_transactions_for_consumer(missing).await;
    assert!(matches!(listing, Err(Error::ConsumerNotFound(_))));
}

#[tokio::test]
async fn test_invalid_request_rejected_before_store() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let mut request = loan(6, dec!(1000000), dec!(0), dec!(0));
    request.asset_name = "  ".to_string();
    let result = engine.underwriter().create_transaction(consumer_id, &request).await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let negative = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(1000000), dec!(-1), dec!(0)))
        .await;
    assert!(matches!(negative, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_delete_refused_while_loans_exist() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;
    engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(1000000), dec!(0), dec!(0)))
        .await
        .unwrap();

    let result = engine.consumers().delete_consumer(consumer_id).await;
    assert!(matches!(result, Err(Error::ConsumerInUse(id)) if id == consumer_id));
    assert!(engine.consumers().get_consumer(consumer_id).await.is_ok());
}

#[tokio::test]
async fn test_raised_overall_limit_applies_to_next_loan() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer = engine
        .consumers()
        .create_consumer(&consumer_request("3171234567890005", dec!(1000000)))
        .await
        .unwrap();
    engine
        .allocator()
        .create_sub_limit(
            consumer.id,
            &CreateSubLimitRequest {
                tenor_months: 1,
                limit_amount: dec!(1000000),
            },
        )
        .await
        .unwrap();
    engine
        .underwriter()
        .create_transaction(consumer.id, &loan(1, dec!(1000000), dec!(0), dec!(0)))
        .await
        .unwrap();

    let refused = engine
        .underwriter()
        .create_transaction(consumer.id, &loan(1, dec!(500000), dec!(0), dec!(0)))
        .await;
    assert!(refused.is_err());

    let patch = ConsumerPatch {
        overall_credit_limit: Some(dec!(2000000)),
        ..Default::default()
    };
    engine.consumers().update_consumer(consumer.id, &patch).await.unwrap();

    let approved = engine
        .underwriter()
        .create_transaction(consumer.id, &loan(1, dec!(500000), dec!(0), dec!(0)))
        .await;
    assert!(approved.is_ok());
}

#[tokio::test]
async fn test_out_of_range_amounts_rejected() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let result = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, Decimal::MAX, dec!(0), Decimal::MAX))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let transactions = engine
        .underwriter()
        .get_transactions_for_consumer(consumer_id)
        .await
        .unwrap();
    assert!(transactions.is_empty());
}

#[tokio::test]
async fn test_sub_cent_amounts_rejected() {
    let engine = CreditEngine::in_memory().unwrap();
    let consumer_id = scenario_setup(&engine).await;

    let result = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(0.004), dec!(0), dec!(0)))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let smallest = engine
        .underwriter()
        .create_transaction(consumer_id, &loan(6, dec!(0.01), dec!(0), dec!(0)))
        .await
        .unwrap();
    assert_eq!(smallest.principal, dec!(0.01));

    let transactions = engine
        .underwriter()
        .get_transactions_for_consumer(consumer_id)
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
}
