use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use entity::sea_orm_active_enums::GrantType;
use entity::{credit_grants, usage_records};
use sea_orm::sea_query::Expr;
use sea_orm::{
    entity::*, query::*, Condition, ConnectionTrait, DatabaseConnection, DbBackend, Statement,
    TransactionTrait,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, Result},
    models::common::UsageScope,
    services::UsageReporter,
};

/// Lock class for owner-scoped ledger locks, shared by every mutation path.
const LEDGER_LOCK_CLASS: i32 = 0x4352_4544;

pub struct LedgerService {
    db: Arc<DatabaseConnection>,
    reporter: Arc<UsageReporter>,
}

/// What a single consumption attempt did, step by step. `consumed` always
/// equals the requested amount once at least one active grant exists; any
/// shortfall shows up as a `DebtCreation` entry instead of a partial result.
#[derive(Debug, Clone)]
pub struct ConsumptionOutcome {
    pub consumed: i64,
    pub from_purchased: i64,
    pub applied: Vec<BalanceChange>,
}

#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub grant_id: Uuid,
    pub grant_type: GrantType,
    pub amount: i64,
    pub new_balance: i64,
    pub kind: BalanceChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChangeKind {
    DebtRepayment,
    Consumption,
    DebtCreation,
}

/// Result of a combined consume-and-record operation.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub record_id: Uuid,
    pub consumption: Option<ConsumptionOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeMode {
    /// Consume credits and write the usage record in one transaction
    Metered,
    /// Caller paid out-of-band; write the usage record only
    Passthrough,
}

/// The unit of work a charge pays for.
#[derive(Debug, Clone)]
pub struct UsageCharge {
    pub action: String,
    pub organization_id: Option<Uuid>,
}

impl LedgerService {
    pub fn new(db: impl Into<Arc<DatabaseConnection>>, reporter: Arc<UsageReporter>) -> Self {
        Self {
            db: db.into(),
            reporter,
        }
    }

    /// Consume `amount` credits for an owner. Serialized per owner via the
    /// advisory lock; fails only when the owner has no active grants at all.
    #[instrument(skip(self))]
    pub async fn consume_credits(
        &self,
        owner_id: Uuid,
        amount: i64,
    ) -> Result<ConsumptionOutcome> {
        if amount <= 0 {
            return Err(ApiError::BadRequest(format!(
                "Consumption amount must be positive, got {}",
                amount
            )));
        }

        let txn = self.db.begin().await?;
        let lock_wait = lock_owner(&txn, owner_id).await?;

        let now = OffsetDateTime::now_utc();
        let grants = select_for_consumption(&txn, owner_id, now).await?;
        if grants.is_empty() {
            txn.rollback().await?;
            return Err(ApiError::NoActiveGrants(owner_id));
        }

        let outcome = allocate(&txn, owner_id, &grants, amount).await?;
        txn.commit().await?;

        info!(
            owner_id = %owner_id,
            consumed = outcome.consumed,
            from_purchased = outcome.from_purchased,
            lock_wait_ms = lock_wait.as_millis() as u64,
            "Consumed credits"
        );

        // Best-effort side channel; never affects the committed consumption
        if outcome.from_purchased > 0 {
            self.reporter
                .report_purchased_usage(Uuid::new_v4(), owner_id, outcome.from_purchased)
                .await;
        }

        Ok(outcome)
    }

    /// Consume credits and persist the usage record they paid for inside the
    /// same owner-locked transaction. If the record cannot be written the
    /// whole transaction rolls back, so consumption never sticks without it.
    #[instrument(skip(self, charge))]
    pub async fn consume_and_record_usage(
        &self,
        owner_id: Uuid,
        amount: i64,
        charge: UsageCharge,
        mode: ChargeMode,
    ) -> Result<ChargeReceipt> {
        if mode == ChargeMode::Metered && amount <= 0 {
            return Err(ApiError::BadRequest(format!(
                "Consumption amount must be positive, got {}",
                amount
            )));
        }

        let txn = self.db.begin().await?;
        let lock_wait = lock_owner(&txn, owner_id).await?;
        let now = OffsetDateTime::now_utc();

        let consumption = match mode {
            ChargeMode::Passthrough => None,
            ChargeMode::Metered => {
                let grants = select_for_consumption(&txn, owner_id, now).await?;
                if grants.is_empty() {
                    txn.rollback().await?;
                    return Err(ApiError::NoActiveGrants(owner_id));
                }
                Some(allocate(&txn, owner_id, &grants, amount).await?)
            }
        };

        let (credits, purchased) = consumption
            .as_ref()
            .map(|o| (o.consumed, o.from_purchased))
            .unwrap_or((0, 0));

        let record_id = Uuid::new_v4();
        let record = usage_records::ActiveModel {
            id: Set(record_id),
            owner_id: Set(owner_id),
            organization_id: Set(charge.organization_id),
            action: Set(charge.action),
            credits: Set(credits),
            purchased_credits: Set(purchased),
            passthrough: Set(mode == ChargeMode::Passthrough),
            created_at: Set(now),
        };

        if let Err(e) = usage_records::Entity::insert(record)
            .exec_without_returning(&txn)
            .await
        {
            txn.rollback().await?;
            return Err(ApiError::UsageRecordWrite(e.to_string()));
        }

        txn.commit().await?;

        info!(
            owner_id = %owner_id,
            record_id = %record_id,
            credits,
            purchased,
            passthrough = mode == ChargeMode::Passthrough,
            lock_wait_ms = lock_wait.as_millis() as u64,
            "Charged usage"
        );

        if purchased > 0 {
            self.reporter
                .report_purchased_usage(record_id, owner_id, purchased)
                .await;
        }

        Ok(ChargeReceipt {
            record_id,
            consumption,
        })
    }
}

/// Acquire the owner-scoped advisory lock on the open transaction. The lock
/// is transaction-scoped (`pg_advisory_xact_lock`), so Postgres releases it
/// at commit or rollback; a concurrent attempt for the same owner queues here
/// instead of racing the read-modify-write sequence. Returns how long the
/// acquisition blocked, which callers surface as a metric.
pub async fn lock_owner<C: ConnectionTrait>(conn: &C, owner_id: Uuid) -> Result<Duration> {
    let started = Instant::now();
    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock($1, $2)",
        [
            LEDGER_LOCK_CLASS.into(),
            owner_lock_key(owner_id).into(),
        ],
    ))
    .await?;
    Ok(started.elapsed())
}

fn owner_lock_key(owner_id: Uuid) -> i32 {
    let bits = owner_id.as_u128();
    (bits ^ (bits >> 32) ^ (bits >> 64) ^ (bits >> 96)) as u32 as i32
}

fn active_at(now: OffsetDateTime) -> Condition {
    Condition::any()
        .add(credit_grants::Column::ExpiresAt.is_null())
        .add(credit_grants::Column::ExpiresAt.gt(now))
}

/// Canonical consumption order: priority, then expiry ("never expires" is
/// drawn from last), then creation time, then id as the final tie-break so
/// the order is total.
pub fn consumption_order(a: &credit_grants::Model, b: &credit_grants::Model) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| match (a.expires_at, b.expires_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Grants eligible for a consumption attempt, in canonical order.
///
/// Candidates are the active grants with a non-zero balance, plus the single
/// last-ordered active grant even when its balance is zero: if everything
/// else is exhausted, new debt must be recorded on the grant that would
/// naturally be drawn from last, so future grants of the same kind repay it.
pub async fn select_for_consumption<C: ConnectionTrait>(
    conn: &C,
    owner_id: Uuid,
    now: OffsetDateTime,
) -> Result<Vec<credit_grants::Model>> {
    let mut grants = credit_grants::Entity::find()
        .filter(credit_grants::Column::OwnerId.eq(owner_id))
        .filter(active_at(now))
        .filter(credit_grants::Column::Balance.ne(0))
        .all(conn)
        .await?;

    // DESC ordering puts NULL expiries first on Postgres, which is exactly
    // the reverse of the canonical order, so LIMIT 1 is the debt target.
    let debt_target = credit_grants::Entity::find()
        .filter(credit_grants::Column::OwnerId.eq(owner_id))
        .filter(active_at(now))
        .order_by_desc(credit_grants::Column::Priority)
        .order_by_desc(credit_grants::Column::ExpiresAt)
        .order_by_desc(credit_grants::Column::CreatedAt)
        .order_by_desc(credit_grants::Column::Id)
        .one(conn)
        .await?;

    if let Some(last) = debt_target {
        if !grants.iter().any(|g| g.id == last.id) {
            grants.push(last);
        }
    }

    grants.sort_by(consumption_order);
    Ok(grants)
}

/// Grants relevant to cycle-to-date reporting: unexpired, expired after the
/// cycle started, or created during the cycle. Read-only callers only.
pub async fn select_for_reporting<C: ConnectionTrait>(
    conn: &C,
    owner_id: Uuid,
    cycle_start: OffsetDateTime,
    scope: UsageScope,
) -> Result<Vec<credit_grants::Model>> {
    let mut query = credit_grants::Entity::find()
        .filter(credit_grants::Column::OwnerId.eq(owner_id))
        .filter(
            Condition::any()
                .add(credit_grants::Column::ExpiresAt.is_null())
                .add(credit_grants::Column::ExpiresAt.gt(cycle_start))
                .add(credit_grants::Column::CreatedAt.gte(cycle_start)),
        );

    if scope == UsageScope::Personal {
        query = query.filter(credit_grants::Column::OrganizationId.is_null());
    }

    let grants = query
        .order_by_asc(credit_grants::Column::CreatedAt)
        .all(conn)
        .await?;

    Ok(grants)
}

/// Point update of one grant's balance, inside the caller's transaction.
async fn write_balance<C: ConnectionTrait>(
    conn: &C,
    grant_id: Uuid,
    balance: i64,
) -> Result<()> {
    credit_grants::Entity::update_many()
        .col_expr(credit_grants::Column::Balance, Expr::value(balance))
        .filter(credit_grants::Column::Id.eq(grant_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Allocate `amount` across `grants` (already in canonical order): repay
/// debt first, then draw down positive balances, then record any shortfall
/// as new debt on the last grant consumed from (or the last grant overall).
///
/// Pass 1 mutates balances that pass 2 and the debt step must see, and the
/// snapshot in `grants` does not reflect those writes, so `effective` keeps
/// the read-your-writes view per grant id. Every balance used for a later
/// computation comes from that map, falling back to the snapshot only for
/// grants untouched so far. Skipping this turns "repay 50 of debt, then
/// re-exhaust" into debt computed from the stale -50 instead of 0.
pub async fn allocate<C: ConnectionTrait>(
    conn: &C,
    owner_id: Uuid,
    grants: &[credit_grants::Model],
    amount: i64,
) -> Result<ConsumptionOutcome> {
    let Some(fallback_target) = grants.last() else {
        return Err(ApiError::NoActiveGrants(owner_id));
    };

    let mut effective: HashMap<Uuid, i64> = HashMap::new();
    let balance_of = |effective: &HashMap<Uuid, i64>, grant: &credit_grants::Model| {
        effective.get(&grant.id).copied().unwrap_or(grant.balance)
    };

    let mut remaining = amount;
    let mut consumed = 0i64;
    let mut from_purchased = 0i64;
    let mut applied: Vec<BalanceChange> = Vec::new();
    let mut last_consumed: Option<&credit_grants::Model> = None;

    // Pass 1: repay existing debt, in canonical order
    for grant in grants {
        if remaining == 0 {
            break;
        }
        let balance = balance_of(&effective, grant);
        if balance >= 0 {
            continue;
        }

        let repaid = remaining.min(-balance);
        let new_balance = balance + repaid;
        write_balance(conn, grant.id, new_balance).await?;
        effective.insert(grant.id, new_balance);

        remaining -= repaid;
        consumed += repaid;
        if grant.grant_type == GrantType::Purchase {
            from_purchased += repaid;
        }
        applied.push(BalanceChange {
            grant_id: grant.id,
            grant_type: grant.grant_type,
            amount: repaid,
            new_balance,
            kind: BalanceChangeKind::DebtRepayment,
        });
    }

    // Pass 2: draw down positive balances, same order, effective values
    for grant in grants {
        if remaining == 0 {
            break;
        }
        let balance = balance_of(&effective, grant);
        if balance <= 0 {
            continue;
        }

        let drawn = remaining.min(balance);
        let new_balance = balance - drawn;
        write_balance(conn, grant.id, new_balance).await?;
        effective.insert(grant.id, new_balance);

        remaining -= drawn;
        consumed += drawn;
        if grant.grant_type == GrantType::Purchase {
            from_purchased += drawn;
        }
        last_consumed = Some(grant);
        applied.push(BalanceChange {
            grant_id: grant.id,
            grant_type: grant.grant_type,
            amount: drawn,
            new_balance,
            kind: BalanceChangeKind::Consumption,
        });
    }

    // Shortfall becomes debt on the last grant consumed from, or the last
    // grant in order when nothing had positive balance.
    if remaining > 0 {
        let target = last_consumed.unwrap_or(fallback_target);
        let balance = balance_of(&effective, target);
        let new_balance = balance - remaining;
        write_balance(conn, target.id, new_balance).await?;
        effective.insert(target.id, new_balance);

        warn!(
            owner_id = %owner_id,
            grant_id = %target.id,
            debt = remaining,
            balance = new_balance,
            "Credit grants exhausted; recording debt"
        );

        consumed += remaining;
        applied.push(BalanceChange {
            grant_id: target.id,
            grant_type: target.grant_type,
            amount: remaining,
            new_balance,
            kind: BalanceChangeKind::DebtCreation,
        });
    }

    Ok(ConsumptionOutcome {
        consumed,
        from_purchased,
        applied,
    })
}
