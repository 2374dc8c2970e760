use std::sync::Arc;

use common::decimal::dec;
use common::model::{CreditPack, EntityRef, ReasonCode, ReviewDecision, Role, TransactionStatus};
use common::{Store, StoreType};
use dotenv::dotenv;
use futures::future::join_all;
use ledger_service::{
    CreditTransactionWorkflow, LedgerEntry, LedgerService, RegisterAccount,
    ReviewCreditTransaction, SubmitCreditTransaction,
};
use tokio::test;
use uuid::Uuid;

// PostgreSQL integration tests for the ledger service
// These tests require a running PostgreSQL database
// Run with: cargo test --test ledger_postgres_tests -- --ignored

async fn create_test_service() -> LedgerService {
    dotenv().ok();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");

    LedgerService::with_store(StoreType::Postgres(Some(database_url)))
        .await
        .expect("Failed to create ledger service with PostgreSQL store")
}

async fn register(service: &LedgerService, role: Role, balance: i64) -> Uuid {
    service
        .register_account(RegisterAccount {
            name: format!("pg-{}", Uuid::new_v4()),
            role,
            opening_balance: Some(balance),
        })
        .await
        .unwrap()
        .id
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_debit_and_history() {
    let service = create_test_service().await;
    let account_id = register(&service, Role::Seller, 10).await;

    let entry = LedgerEntry::new(account_id, 7, ReasonCode::ListingPublication, EntityRef::None);
    service.debit(entry).await.unwrap();
    assert_eq!(service.get_balance(account_id).await.unwrap(), 3);

    let entry = LedgerEntry::new(account_id, 5, ReasonCode::ListingPublication, EntityRef::None);
    let err = service.debit(entry).await.unwrap_err();
    assert_eq!(err.code(), "insufficient_funds");

    let movements = service.movements(account_id).await.unwrap();
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().all(|m| m.is_consistent()));
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_concurrent_debits() {
    let service = Arc::new(create_test_service().await);
    let account_id = register(&service, Role::Seller, 10).await;

    let handles = (0..10).map(|_| {
        let service = service.clone();
        tokio::spawn(async move {
            let entry = LedgerEntry::new(account_id, 3, ReasonCode::ListingPublication, EntityRef::None);
            service.debit(entry).await
        })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(service.get_balance(account_id).await.unwrap(), 1);
}

#[test]
#[ignore = "Requires test database"]
async fn test_postgres_credit_review() {
    let service = create_test_service().await;
    let store: Arc<dyn Store> = service.store();
    let workflow = CreditTransactionWorkflow::new(store.clone());

    let seller = register(&service, Role::Seller, 0).await;
    let admin = register(&service, Role::Admin, 0).await;
    let pack = CreditPack::new(format!("pack-{}", Uuid::new_v4()), 15, dec!(5000));
    store.insert_pack(&pack).await.unwrap();

    let transaction = workflow
        .submit(SubmitCreditTransaction {
            account_id: seller,
            pack_id: pack.id,
            proof_ref: "proof.png".to_string(),
            credits: None,
            amount_paid: None,
        })
        .await
        .unwrap();

    let review = ReviewCreditTransaction {
        transaction_id: transaction.id,
        decision: ReviewDecision::Approve,
        reviewer_id: admin,
        comment: None,
    };
    let approved = workflow.review(review.clone()).await.unwrap();
    assert_eq!(approved.transaction.status, TransactionStatus::Approved);
    assert_eq!(service.get_balance(seller).await.unwrap(), 15);

    assert_eq!(workflow.review(review).await.unwrap_err().code(), "conflict");
    assert_eq!(service.get_balance(seller).await.unwrap(), 15);
}
