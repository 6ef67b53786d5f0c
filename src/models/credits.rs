use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{SuccessResponse, UsageScope};

/// Request to consume credits for an owner
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeCreditsRequest {
    pub owner_id: Uuid,

    #[validate(range(min = 1))]
    pub amount: i64,
}

pub type ConsumeCreditsResponse = SuccessResponse<ConsumptionData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionData {
    pub consumed: i64,
    pub from_purchased: i64,
}

/// Request to charge one unit of billable work: consume credits and
/// record the usage atomically. With `passthrough` set the caller paid
/// out-of-band (e.g. their own provider key); only the record is written.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChargeUsageRequest {
    pub owner_id: Uuid,

    #[serde(default)]
    pub organization_id: Option<Uuid>,

    #[serde(default)]
    #[validate(range(min = 0))]
    pub amount: i64,

    #[validate(length(min = 1, max = 100))]
    pub action: String,

    #[serde(default)]
    pub passthrough: bool,
}

pub type ChargeUsageResponse = SuccessResponse<ChargeData>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeData {
    pub record_id: Uuid,
    pub consumed: i64,
    pub from_purchased: i64,
    pub passthrough: bool,
}

/// Query parameters for the balance/usage read
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub owner_id: Uuid,

    #[serde(with = "time::serde::rfc3339")]
    pub cycle_start: time::OffsetDateTime,

    #[serde(default)]
    pub scope: UsageScope,
}
