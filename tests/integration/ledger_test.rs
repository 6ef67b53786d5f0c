use std::cmp::Ordering;
use std::sync::Arc;

use creditd::error::ApiError;
use creditd::services::ledger_service::{
    allocate, consumption_order, select_for_consumption, BalanceChangeKind, ChargeMode,
    UsageCharge,
};
use creditd::services::{LedgerService, UsageReporter};
use entity::credit_grants;
use entity::sea_orm_active_enums::GrantType;
use sea_orm::{DatabaseBackend, DatabaseConnection, DbErr, MockDatabase, MockExecResult};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn grant(grant_type: GrantType, priority: i32, balance: i64) -> credit_grants::Model {
    credit_grants::Model {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        organization_id: None,
        grant_type,
        principal: balance.max(0),
        balance,
        priority,
        description: None,
        expires_at: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Connection that accepts up to `exec_slots` balance writes
fn mock_conn(exec_slots: usize) -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results(vec![
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            };
            exec_slots
        ])
        .into_connection()
}

#[tokio::test]
async fn overdraw_single_grant_records_debt() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![grant(GrantType::Free, 1, 100)];

    let outcome = allocate(&conn, owner, &grants, 150).await.unwrap();

    assert_eq!(outcome.consumed, 150);
    assert_eq!(outcome.from_purchased, 0);
    assert_eq!(outcome.applied.len(), 2);

    assert_eq!(outcome.applied[0].kind, BalanceChangeKind::Consumption);
    assert_eq!(outcome.applied[0].amount, 100);
    assert_eq!(outcome.applied[0].new_balance, 0);

    assert_eq!(outcome.applied[1].kind, BalanceChangeKind::DebtCreation);
    assert_eq!(outcome.applied[1].amount, 50);
    assert_eq!(outcome.applied[1].new_balance, -50);
    assert_eq!(outcome.applied[1].grant_id, grants[0].id);
}

#[tokio::test]
async fn debt_lands_on_last_consumed_grant() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![
        grant(GrantType::Free, 1, 50),
        grant(GrantType::Purchase, 2, 50),
    ];

    let outcome = allocate(&conn, owner, &grants, 150).await.unwrap();

    assert_eq!(outcome.consumed, 150);
    assert_eq!(outcome.from_purchased, 50);

    let debt: Vec<_> = outcome
        .applied
        .iter()
        .filter(|c| c.kind == BalanceChangeKind::DebtCreation)
        .collect();
    assert_eq!(debt.len(), 1);
    assert_eq!(debt[0].grant_id, grants[1].id);
    assert_eq!(debt[0].amount, 50);
    assert_eq!(debt[0].new_balance, -50);
}

/// Regression for effective-balance tracking: debt repaid earlier in the
/// same invocation must not be recomputed from the stale snapshot. One
/// grant at -50 charged 100 must end at exactly -50, never -100.
#[tokio::test]
async fn new_debt_computed_from_post_repayment_balance() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![grant(GrantType::Free, 1, -50)];

    let outcome = allocate(&conn, owner, &grants, 100).await.unwrap();

    assert_eq!(outcome.consumed, 100);
    assert_eq!(outcome.applied.len(), 2);

    assert_eq!(outcome.applied[0].kind, BalanceChangeKind::DebtRepayment);
    assert_eq!(outcome.applied[0].amount, 50);
    assert_eq!(outcome.applied[0].new_balance, 0);

    assert_eq!(outcome.applied[1].kind, BalanceChangeKind::DebtCreation);
    assert_eq!(outcome.applied[1].amount, 50);
    assert_eq!(outcome.applied[1].new_balance, -50);
}

#[tokio::test]
async fn exact_consumption_creates_no_debt() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![
        grant(GrantType::Free, 1, 75),
        grant(GrantType::Purchase, 2, 25),
    ];

    let outcome = allocate(&conn, owner, &grants, 100).await.unwrap();

    assert_eq!(outcome.consumed, 100);
    assert_eq!(outcome.from_purchased, 25);
    assert!(outcome
        .applied
        .iter()
        .all(|c| c.kind != BalanceChangeKind::DebtCreation));
    assert!(outcome.applied.iter().all(|c| c.new_balance >= 0));
}

#[tokio::test]
async fn zero_balance_grant_is_skipped() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![
        grant(GrantType::Free, 1, 40),
        grant(GrantType::Free, 2, 0),
        grant(GrantType::Purchase, 3, 30),
    ];

    let outcome = allocate(&conn, owner, &grants, 60).await.unwrap();

    assert_eq!(outcome.consumed, 60);
    assert_eq!(outcome.from_purchased, 20);
    assert_eq!(outcome.applied.len(), 2);
    assert_eq!(outcome.applied[0].grant_id, grants[0].id);
    assert_eq!(outcome.applied[0].amount, 40);
    assert_eq!(outcome.applied[1].grant_id, grants[2].id);
    assert_eq!(outcome.applied[1].amount, 20);
    assert!(outcome.applied.iter().all(|c| c.grant_id != grants[1].id));
}

#[tokio::test]
async fn debt_repaid_before_positive_balances() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![
        grant(GrantType::Free, 1, 100),
        grant(GrantType::Purchase, 2, -30),
    ];

    let outcome = allocate(&conn, owner, &grants, 50).await.unwrap();

    assert_eq!(outcome.consumed, 50);
    // Repayment of a purchase grant's debt counts toward the metered portion
    assert_eq!(outcome.from_purchased, 30);

    assert_eq!(outcome.applied[0].kind, BalanceChangeKind::DebtRepayment);
    assert_eq!(outcome.applied[0].grant_id, grants[1].id);
    assert_eq!(outcome.applied[0].amount, 30);
    assert_eq!(outcome.applied[0].new_balance, 0);

    assert_eq!(outcome.applied[1].kind, BalanceChangeKind::Consumption);
    assert_eq!(outcome.applied[1].grant_id, grants[0].id);
    assert_eq!(outcome.applied[1].amount, 20);
    assert_eq!(outcome.applied[1].new_balance, 80);
}

#[tokio::test]
async fn shortfall_equals_total_debt_created() {
    let conn = mock_conn(8);
    let owner = Uuid::new_v4();
    let grants = vec![
        grant(GrantType::Free, 1, 10),
        grant(GrantType::Referral, 2, 15),
    ];

    let outcome = allocate(&conn, owner, &grants, 100).await.unwrap();

    assert_eq!(outcome.consumed, 100);
    let debt_created: i64 = outcome
        .applied
        .iter()
        .filter(|c| c.kind == BalanceChangeKind::DebtCreation)
        .map(|c| c.amount)
        .sum();
    assert_eq!(debt_created, 100 - (10 + 15));
}

/// When nothing had positive balance to consume from, the shortfall must
/// land on the last grant in the ordered list (the zero-balance debt
/// target the selector appends), not get dropped.
#[tokio::test]
async fn debt_falls_to_last_ordered_grant_when_nothing_consumed() {
    let conn = mock_conn(4);
    let owner = Uuid::new_v4();
    let grants = vec![
        grant(GrantType::Free, 1, 0),
        grant(GrantType::Organization, 5, 0),
    ];

    let outcome = allocate(&conn, owner, &grants, 40).await.unwrap();

    assert_eq!(outcome.consumed, 40);
    assert_eq!(outcome.from_purchased, 0);
    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.applied[0].kind, BalanceChangeKind::DebtCreation);
    assert_eq!(outcome.applied[0].grant_id, grants[1].id);
    assert_eq!(outcome.applied[0].amount, 40);
    assert_eq!(outcome.applied[0].new_balance, -40);
}

#[tokio::test]
async fn empty_grant_list_is_an_error() {
    let conn = mock_conn(0);
    let owner = Uuid::new_v4();

    let result = allocate(&conn, owner, &[], 10).await;

    assert!(matches!(result, Err(ApiError::NoActiveGrants(id)) if id == owner));
}

#[test]
fn order_is_priority_then_expiry_then_creation() {
    let now = OffsetDateTime::now_utc();

    let mut low_priority = grant(GrantType::Free, 5, 10);
    let high_priority = grant(GrantType::Purchase, 1, 10);
    assert_eq!(
        consumption_order(&high_priority, &low_priority),
        Ordering::Less
    );

    // Same priority: earlier expiry first, "never expires" last
    let mut expiring = grant(GrantType::Free, 5, 10);
    expiring.expires_at = Some(now + Duration::days(7));
    low_priority.expires_at = None;
    assert_eq!(consumption_order(&expiring, &low_priority), Ordering::Less);

    // Same priority and expiry: earlier creation first
    let mut older = grant(GrantType::Free, 5, 10);
    let mut newer = grant(GrantType::Free, 5, 10);
    older.created_at = now - Duration::days(3);
    newer.created_at = now;
    assert_eq!(consumption_order(&older, &newer), Ordering::Less);
}

#[tokio::test]
async fn selector_appends_zero_balance_debt_target() {
    let now = OffsetDateTime::now_utc();
    let owner = Uuid::new_v4();

    let mut funded = grant(GrantType::Free, 1, 50);
    funded.owner_id = owner;
    let mut exhausted_subscription = grant(GrantType::Organization, 9, 0);
    exhausted_subscription.owner_id = owner;

    let conn = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([
            vec![funded.clone()],
            vec![exhausted_subscription.clone()],
        ])
        .into_connection();

    let grants = select_for_consumption(&conn, owner, now).await.unwrap();

    assert_eq!(grants.len(), 2);
    assert_eq!(grants[0].id, funded.id);
    assert_eq!(grants[1].id, exhausted_subscription.id);
}

/// A passthrough charge writes the usage record only. The mock carries no
/// query results, so any grant selection or allocation attempt would fail
/// the test outright; the two exec slots are the owner lock and the insert.
#[tokio::test]
async fn passthrough_charge_writes_record_without_consuming() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results(vec![
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            };
            2
        ])
        .into_connection();
    let service = LedgerService::new(db, Arc::new(UsageReporter::disabled()));

    let receipt = service
        .consume_and_record_usage(
            Uuid::new_v4(),
            0,
            UsageCharge {
                action: "story.generate".to_string(),
                organization_id: None,
            },
            ChargeMode::Passthrough,
        )
        .await
        .unwrap();

    assert!(receipt.consumption.is_none());
}

#[tokio::test]
async fn metered_charge_consumes_and_records_atomically() {
    let owner = Uuid::new_v4();
    let mut funded = grant(GrantType::Purchase, 1, 100);
    funded.owner_id = owner;

    // lock, one balance write, one record insert
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![funded.clone()], vec![funded.clone()]])
        .append_exec_results(vec![
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            };
            3
        ])
        .into_connection();
    let service = LedgerService::new(db, Arc::new(UsageReporter::disabled()));

    let receipt = service
        .consume_and_record_usage(
            owner,
            60,
            UsageCharge {
                action: "story.generate".to_string(),
                organization_id: None,
            },
            ChargeMode::Metered,
        )
        .await
        .unwrap();

    let consumption = receipt.consumption.expect("metered charge must consume");
    assert_eq!(consumption.consumed, 60);
    assert_eq!(consumption.from_purchased, 60);
}

/// When the usage record insert fails after balances were already mutated
/// in the transaction, the whole operation must surface the record-write
/// error and roll back rather than let the consumption stick unrecorded.
#[tokio::test]
async fn failed_usage_record_write_rolls_back_consumption() {
    let owner = Uuid::new_v4();
    let mut funded = grant(GrantType::Free, 1, 100);
    funded.owner_id = owner;

    // lock and balance write succeed, the record insert errors
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![funded.clone()], vec![funded.clone()]])
        .append_exec_results(vec![
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            };
            2
        ])
        .append_exec_errors([DbErr::Custom("usage_records insert rejected".to_string())])
        .into_connection();
    let service = LedgerService::new(db, Arc::new(UsageReporter::disabled()));

    let result = service
        .consume_and_record_usage(
            owner,
            60,
            UsageCharge {
                action: "story.generate".to_string(),
                organization_id: None,
            },
            ChargeMode::Metered,
        )
        .await;

    assert!(matches!(result, Err(ApiError::UsageRecordWrite(_))));
}

#[tokio::test]
async fn selector_dedups_debt_target_already_in_set() {
    let now = OffsetDateTime::now_utc();
    let owner = Uuid::new_v4();

    let mut only = grant(GrantType::Purchase, 1, 25);
    only.owner_id = owner;

    let conn = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![only.clone()], vec![only.clone()]])
        .into_connection();

    let grants = select_for_consumption(&conn, owner, now).await.unwrap();

    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].id, only.id);
}
