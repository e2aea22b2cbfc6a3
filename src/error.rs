use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// User-facing error messages shared between handlers and tests.
pub mod msg {
    pub const PARISH_NOT_FOUND: &str = "Parish not found";
    pub const CAMPAIGN_NOT_FOUND: &str = "Campaign not found";
    pub const DONATION_NOT_FOUND: &str = "Donation not found";
    pub const GATEWAY_NOT_CONFIGURED: &str = "Payment gateway not configured for this parish";
    pub const GATEWAY_REJECTED: &str = "Payment processing failed";
    pub const GATEWAY_UNAVAILABLE: &str = "Payment gateway unavailable";
    pub const INVALID_AMOUNT: &str = "Invalid amount";
    pub const MISSING_TRANSACTION_ID: &str = "Transaction ID not found";
    pub const INVALID_SIGNATURE: &str = "Invalid webhook signature";
    pub const PAYMENT_IN_FLIGHT: &str = "A payment with this idempotency key is already being processed";
    pub const IDEMPOTENCY_KEY_REUSED: &str =
        "This idempotency key was already used for a different payment";
    pub const INVALID_DONATION_ID: &str = "Invalid donation id";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Parish not found")]
    ParishNotFound,

    #[error("Campaign not found")]
    CampaignNotFound,

    #[error("Payment gateway not configured")]
    GatewayNotConfigured,

    #[error("Gateway rejected charge (HTTP {status})")]
    GatewayRejected {
        status: u16,
        details: serde_json::Value,
    },

    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Missing transaction id")]
    MissingTransactionId,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let text = |s: &str| Some(serde_json::Value::String(s.to_string()));

        let (status, error, details) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "Validation error", text(msg)),
            AppError::InvalidAmount(reason) => {
                (StatusCode::BAD_REQUEST, msg::INVALID_AMOUNT, text(reason))
            }
            AppError::ParishNotFound => (StatusCode::NOT_FOUND, msg::PARISH_NOT_FOUND, None),
            AppError::CampaignNotFound => (StatusCode::NOT_FOUND, msg::CAMPAIGN_NOT_FOUND, None),
            AppError::GatewayNotConfigured => {
                (StatusCode::BAD_REQUEST, msg::GATEWAY_NOT_CONFIGURED, None)
            }
            AppError::GatewayRejected { details, .. } => (
                StatusCode::BAD_REQUEST,
                msg::GATEWAY_REJECTED,
                Some(details.clone()),
            ),
            AppError::GatewayUnavailable(e) => {
                tracing::error!("Gateway unavailable: {}", e);
                (StatusCode::BAD_GATEWAY, msg::GATEWAY_UNAVAILABLE, None)
            }
            AppError::MissingTransactionId => {
                (StatusCode::BAD_REQUEST, msg::MISSING_TRANSACTION_ID, None)
            }
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, msg::INVALID_SIGNATURE, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", text(msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", text(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", text(msg)),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::debug!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", text(&e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts `Option<T>` lookups into typed errors.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}
