use axum::extract::State;

use crate::checkout::{PaymentRequest, PaymentResult, initiate_payment};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{IdempotencyKey, Json};

/// POST /payments - create a charge for a donation
pub async fn create_payment(
    State(state): State<AppState>,
    IdempotencyKey(client_key): IdempotencyKey,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentResult>> {
    let result = initiate_payment(&state, request, client_key).await?;
    Ok(Json(result))
}
