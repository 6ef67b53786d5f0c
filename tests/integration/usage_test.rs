use creditd::models::common::UsageScope;
use creditd::services::usage_service::{summarize, UsageService};
use entity::credit_grants;
use entity::sea_orm_active_enums::GrantType;
use sea_orm::{DatabaseBackend, MockDatabase};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn grant(grant_type: GrantType, principal: i64, balance: i64) -> credit_grants::Model {
    credit_grants::Model {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        organization_id: None,
        grant_type,
        principal,
        balance,
        priority: 0,
        description: None,
        expires_at: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[test]
fn usage_is_principal_minus_balance() {
    let now = OffsetDateTime::now_utc();
    let grants = vec![
        grant(GrantType::Free, 100, 40),
        grant(GrantType::Purchase, 500, 500),
    ];

    let summary = summarize(&grants, now);

    assert_eq!(summary.usage_this_cycle, 60);
    assert_eq!(summary.balance.remaining, 540);
    assert_eq!(summary.balance.debt, 0);
    assert_eq!(summary.balance.net, 540);
}

#[test]
fn expired_grant_counts_toward_usage_but_not_balance() {
    let now = OffsetDateTime::now_utc();

    let mut expired = grant(GrantType::Free, 100, 30);
    expired.expires_at = Some(now - Duration::days(2));
    let active = grant(GrantType::Purchase, 200, 150);

    let summary = summarize(&[expired, active], now);

    // 70 consumed before expiry still attributed to this cycle
    assert_eq!(summary.usage_this_cycle, 70 + 50);
    // but the leftover 30 on the expired grant is unspendable
    assert_eq!(summary.balance.remaining, 150);
    assert_eq!(summary.balance.by_type.len(), 1);
    assert_eq!(summary.balance.by_type[0].grant_type, GrantType::Purchase);
}

#[test]
fn debt_reported_per_type_and_in_net() {
    let now = OffsetDateTime::now_utc();
    let grants = vec![
        grant(GrantType::Free, 100, 80),
        grant(GrantType::Organization, 50, -30),
    ];

    let summary = summarize(&grants, now);

    // 20 consumed from free, 80 consumed against the org grant (50 + 30 debt)
    assert_eq!(summary.usage_this_cycle, 100);
    assert_eq!(summary.balance.remaining, 80);
    assert_eq!(summary.balance.debt, 30);
    assert_eq!(summary.balance.net, 50);

    let org = summary
        .balance
        .by_type
        .iter()
        .find(|t| t.grant_type == GrantType::Organization)
        .unwrap();
    assert_eq!(org.remaining, 0);
    assert_eq!(org.debt, 30);
}

#[test]
fn same_type_grants_are_aggregated() {
    let now = OffsetDateTime::now_utc();
    let grants = vec![
        grant(GrantType::Purchase, 100, 60),
        grant(GrantType::Purchase, 200, -10),
    ];

    let summary = summarize(&grants, now);

    assert_eq!(summary.balance.by_type.len(), 1);
    assert_eq!(summary.balance.by_type[0].remaining, 60);
    assert_eq!(summary.balance.by_type[0].debt, 10);
}

#[tokio::test]
async fn balance_and_usage_reads_reporting_set() {
    let owner = Uuid::new_v4();
    let cycle_start = OffsetDateTime::now_utc() - Duration::days(10);

    let mut g = grant(GrantType::Free, 100, 25);
    g.owner_id = owner;

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![g]])
        .into_connection();

    let service = UsageService::new(db);
    let summary = service
        .balance_and_usage(owner, cycle_start, UsageScope::Personal)
        .await
        .unwrap();

    assert_eq!(summary.usage_this_cycle, 75);
    assert_eq!(summary.balance.remaining, 25);
}
