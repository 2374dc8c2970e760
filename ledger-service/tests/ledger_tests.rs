use std::sync::Arc;

use common::db::InMemoryStore;
use common::model::{AccountStatus, Direction, EntityRef, ReasonCode, Role};
use common::Store;
use futures::future::join_all;
use ledger_service::{LedgerEntry, LedgerService, RegisterAccount};
use uuid::Uuid;

fn create_service() -> LedgerService {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    LedgerService::new(store)
}

async fn seller_with(service: &LedgerService, balance: i64) -> Uuid {
    service
        .register_account(RegisterAccount {
            name: "Ana Seller".to_string(),
            role: Role::Seller,
            opening_balance: Some(balance),
        })
        .await
        .unwrap()
        .id
}

fn publication(account_id: Uuid, amount: i64) -> LedgerEntry {
    LedgerEntry::new(
        account_id,
        amount,
        ReasonCode::ListingPublication,
        EntityRef::Listing(Uuid::new_v4()),
    )
}

#[tokio::test]
async fn test_register_account_with_opening_balance() {
    let service = create_service();
    let account_id = seller_with(&service, 25).await;

    let account = service.get_account(account_id).await.unwrap();
    assert_eq!(account.credit_balance, 25);
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.role, Role::Seller);

    // The opening balance goes through the ledger like any other credit
    let movements = service.movements(account_id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].direction, Direction::Credit);
    assert_eq!(movements[0].reason, ReasonCode::ManualAdjustment);
    assert_eq!(movements[0].balance_before, 0);
    assert_eq!(movements[0].balance_after, 25);
}

#[tokio::test]
async fn test_register_account_without_balance_has_no_movements() {
    let service = create_service();
    let account = service
        .register_account(RegisterAccount {
            name: "Bruno Buyer".to_string(),
            role: Role::Buyer,
            opening_balance: None,
        })
        .await
        .unwrap();

    assert_eq!(account.credit_balance, 0);
    assert!(service.movements(account.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_register_account_rejects_blank_name() {
    let service = create_service();
    let err = service
        .register_account(RegisterAccount {
            name: "   ".to_string(),
            role: Role::Buyer,
            opening_balance: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn test_debit_then_insufficient_funds() {
    let service = create_service();
    let account_id = seller_with(&service, 10).await;

    let movement = service.debit(publication(account_id, 7)).await.unwrap();
    assert_eq!(movement.balance_before, 10);
    assert_eq!(movement.balance_after, 3);
    assert!(movement.is_consistent());
    assert_eq!(service.get_balance(account_id).await.unwrap(), 3);

    let err = service.debit(publication(account_id, 5)).await.unwrap_err();
    assert_eq!(err.code(), "insufficient_funds");
    assert_eq!(service.get_balance(account_id).await.unwrap(), 3);

    // The failed debit left no trace
    let movements = service.movements(account_id).await.unwrap();
    assert_eq!(movements.len(), 2);
}

#[tokio::test]
async fn test_debit_requires_active_account() {
    let service = create_service();
    let account_id = seller_with(&service, 10).await;
    service.set_status(account_id, AccountStatus::Suspended).await.unwrap();

    let err = service.debit(publication(account_id, 1)).await.unwrap_err();
    assert_eq!(err.code(), "account_inactive");
    assert_eq!(service.get_balance(account_id).await.unwrap(), 10);
}

#[tokio::test]
async fn test_credit_applies_to_inactive_account() {
    let service = create_service();
    let account_id = seller_with(&service, 0).await;
    service.set_status(account_id, AccountStatus::Inactive).await.unwrap();

    let movement = service
        .credit(LedgerEntry::new(account_id, 4, ReasonCode::ManualAdjustment, EntityRef::None))
        .await
        .unwrap();
    assert_eq!(movement.balance_after, 4);

    let account = service.get_account(account_id).await.unwrap();
    assert_eq!(account.credit_balance, 4);
    assert_eq!(account.status, AccountStatus::Inactive);
}

#[tokio::test]
async fn test_non_positive_amounts_are_rejected() {
    let service = create_service();
    let account_id = seller_with(&service, 10).await;

    for amount in [0, -3] {
        let err = service.debit(publication(account_id, amount)).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        let err = service
            .credit(LedgerEntry::new(account_id, amount, ReasonCode::ManualAdjustment, EntityRef::None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
    assert_eq!(service.get_balance(account_id).await.unwrap(), 10);
}

#[tokio::test]
async fn test_unknown_account() {
    let service = create_service();
    let err = service.debit(publication(Uuid::new_v4(), 1)).await.unwrap_err();
    assert_eq!(err.code(), "not_found");
    assert_eq!(service.get_account(Uuid::new_v4()).await.unwrap_err().code(), "not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_full_balance_debits() {
    let service = Arc::new(create_service());
    let account_id = seller_with(&service, 10).await;

    let handles = (0..2).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.debit(publication(account_id, 10)).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(failure.code(), "insufficient_funds");
    assert_eq!(service.get_balance(account_id).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_exceeding_balance() {
    let service = Arc::new(create_service());
    let account_id = seller_with(&service, 10).await;

    let handles = (0..10).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.debit(publication(account_id, 3)).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    // Exactly the debits that fit succeed
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.code() == "insufficient_funds"));
    assert_eq!(service.get_balance(account_id).await.unwrap(), 1);

    // History is a consistent chain ending at the current balance
    let movements = service.movements(account_id).await.unwrap();
    assert_eq!(movements.len(), 4);
    for pair in movements.windows(2) {
        assert_eq!(pair[0].balance_after, pair[1].balance_before);
    }
    assert!(movements.iter().all(|m| m.is_consistent()));
    assert_eq!(movements.last().unwrap().balance_after, 1);
}
