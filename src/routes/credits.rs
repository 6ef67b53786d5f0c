use axum::{
    extract::{Query, State},
    Json,
};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{
        common::SuccessResponse,
        credits::{
            BalanceQuery, ChargeData, ChargeUsageRequest, ChargeUsageResponse,
            ConsumeCreditsRequest, ConsumeCreditsResponse, ConsumptionData,
        },
    },
    services::ledger_service::{ChargeMode, UsageCharge},
    services::usage_service::BalanceAndUsage,
};

/// POST /api/v1/credits/consume
#[instrument(skip(state, request))]
pub async fn consume_credits(
    State(state): State<AppState>,
    Json(request): Json<ConsumeCreditsRequest>,
) -> Result<Json<ConsumeCreditsResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let outcome = state
        .ledger_service
        .consume_credits(request.owner_id, request.amount)
        .await?;

    Ok(Json(SuccessResponse::new(ConsumptionData {
        consumed: outcome.consumed,
        from_purchased: outcome.from_purchased,
    })))
}

/// POST /api/v1/usage/charge
#[instrument(skip(state, request))]
pub async fn charge_usage(
    State(state): State<AppState>,
    Json(request): Json<ChargeUsageRequest>,
) -> Result<Json<ChargeUsageResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let mode = if request.passthrough {
        ChargeMode::Passthrough
    } else {
        ChargeMode::Metered
    };

    let receipt = state
        .ledger_service
        .consume_and_record_usage(
            request.owner_id,
            request.amount,
            UsageCharge {
                action: request.action,
                organization_id: request.organization_id,
            },
            mode,
        )
        .await?;

    let (consumed, from_purchased) = receipt
        .consumption
        .as_ref()
        .map(|o| (o.consumed, o.from_purchased))
        .unwrap_or((0, 0));

    Ok(Json(SuccessResponse::new(ChargeData {
        record_id: receipt.record_id,
        consumed,
        from_purchased,
        passthrough: receipt.consumption.is_none(),
    })))
}

/// GET /api/v1/credits/balance
#[instrument(skip(state))]
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<SuccessResponse<BalanceAndUsage>>> {
    let summary = state
        .usage_service
        .balance_and_usage(query.owner_id, query.cycle_start, query.scope)
        .await?;

    Ok(Json(SuccessResponse::new(summary)))
}
