use entity::credit_grants;
use entity::sea_orm_active_enums::GrantType;
use sea_orm::{DatabaseConnection, Iterable};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{common::UsageScope, grant_ext::CreditGrantExt},
    services::ledger_service::select_for_reporting,
};

/// Read-only cycle-usage and balance reporting. Never writes, never locks;
/// slightly stale reads are acceptable here and are not used for allocation.
pub struct UsageService {
    db: Arc<DatabaseConnection>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAndUsage {
    pub usage_this_cycle: i64,
    pub balance: BalanceSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub remaining: i64,
    pub debt: i64,
    pub net: i64,
    pub by_type: Vec<TypeBalance>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBalance {
    pub grant_type: GrantType,
    pub remaining: i64,
    pub debt: i64,
}

impl UsageService {
    pub fn new(db: impl Into<Arc<DatabaseConnection>>) -> Self {
        Self { db: db.into() }
    }

    #[instrument(skip(self))]
    pub async fn balance_and_usage(
        &self,
        owner_id: Uuid,
        cycle_start: OffsetDateTime,
        scope: UsageScope,
    ) -> Result<BalanceAndUsage> {
        let now = OffsetDateTime::now_utc();
        let grants = select_for_reporting(self.db.as_ref(), owner_id, cycle_start, scope).await?;
        Ok(summarize(&grants, now))
    }
}

/// Reconcile the reporting grant set into cycle usage plus a balance
/// breakdown. Usage counts every grant in the set, including ones that
/// expired mid-cycle, so credits drawn before expiry are still attributed.
/// The balance summary counts only grants active now; an expired grant's
/// leftover balance is unspendable and never reported as remaining.
pub fn summarize(grants: &[credit_grants::Model], now: OffsetDateTime) -> BalanceAndUsage {
    let usage_this_cycle = grants.iter().map(|g| g.principal - g.balance).sum();

    let mut remaining_total = 0i64;
    let mut debt_total = 0i64;
    let mut by_type: Vec<TypeBalance> = Vec::new();

    for grant_type in GrantType::iter() {
        let mut remaining = 0i64;
        let mut debt = 0i64;
        for grant in grants
            .iter()
            .filter(|g| g.grant_type == grant_type && g.is_active(now))
        {
            if grant.in_debt() {
                debt += -grant.balance;
            } else {
                remaining += grant.balance;
            }
        }
        if remaining > 0 || debt > 0 {
            remaining_total += remaining;
            debt_total += debt;
            by_type.push(TypeBalance {
                grant_type,
                remaining,
                debt,
            });
        }
    }

    BalanceAndUsage {
        usage_this_cycle,
        balance: BalanceSummary {
            remaining: remaining_total,
            debt: debt_total,
            net: remaining_total - debt_total,
            by_type,
        },
    }
}
