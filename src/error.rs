use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("No active credit grants for owner {0}")]
    NoActiveGrants(uuid::Uuid),

    #[error("Failed to persist usage record: {0}")]
    UsageRecordWrite(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Database(ref e) => {
                // Keep the store's structured detail (error code, constraint,
                // table) in the logs even though the response stays generic.
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::NoActiveGrants(owner_id) => (
                StatusCode::PAYMENT_REQUIRED,
                "NO_ACTIVE_GRANTS",
                format!("Owner {} has no active credit grants", owner_id),
            ),
            ApiError::UsageRecordWrite(ref msg) => {
                tracing::error!("Usage record write failed, transaction rolled back: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "USAGE_RECORD_WRITE_FAILED",
                    "Failed to record usage; no credits were consumed".to_string(),
                )
            }
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
