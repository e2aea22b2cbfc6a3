use axum::{body::Bytes, extract::State, http::HeaderMap};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::models::DonationStatus;
use crate::payments::{SIGNATURE_HEADER, verify_webhook_signature};
use crate::reconcile::{ReconcileOutcome, reconcile_event};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    /// Donation status after processing; null when no donation was touched.
    pub status: Option<DonationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<String>,
    pub outcome: ReconcileOutcome,
}

/// POST /webhooks/pagarme
///
/// Acknowledges with 200 whenever the event was understood, including
/// orphans, duplicates and unknown event types, so the gateway stops retrying.
/// Only a bad signature (401), a malformed payload (400) or a store failure
/// (500) produce an error.
pub async fn handle_pagarme_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    if let Some(secret) = state.webhook_secret.as_ref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        verify_webhook_signature(secret.expose_secret(), &body, signature).inspect_err(|_| {
            tracing::warn!("Rejected Pagar.me webhook with missing or invalid signature");
        })?;
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)?;

    let mut conn = state.db.get()?;
    let report = reconcile_event(&mut conn, &payload)?;

    tracing::debug!(
        "Webhook {:?} for transaction {} -> {:?}",
        report.event_type,
        report.transaction_id,
        report.outcome
    );

    Ok(Json(WebhookResponse {
        success: true,
        status: report.status,
        donation_id: report.donation_id,
        outcome: report.outcome,
    }))
}
