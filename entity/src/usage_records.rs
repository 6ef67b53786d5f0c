use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One billable unit of work and the credits it cost. The record id
/// doubles as the idempotency key for external usage reporting.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usage_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    pub organization_id: Option<Uuid>,
    pub action: String,
    pub credits: i64,
    pub purchased_credits: i64,
    pub passthrough: bool,
    pub created_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
