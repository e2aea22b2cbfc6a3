mod card;
mod idempotency;
mod money;
mod pagarme;
mod phone;

pub use card::*;
pub use idempotency::*;
pub use money::*;
pub use pagarme::*;
pub use phone::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{DonationStatus, ParishCredentials, PaymentMethod};

/// Method-specific part of a charge.
#[derive(Debug, Clone)]
pub enum MethodDetails {
    CreditCard(ValidatedCard),
    Pix { expires_in_secs: u64 },
    Boleto { instructions: String, due_at: DateTime<Utc> },
}

impl MethodDetails {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            Self::CreditCard(_) => PaymentMethod::CreditCard,
            Self::Pix { .. } => PaymentMethod::Pix,
            Self::Boleto { .. } => PaymentMethod::Boleto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: Option<PhoneNumber>,
}

/// Everything a gateway needs to create one charge for a reserved donation.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub donation_id: String,
    pub campaign_id: String,
    pub parish_id: String,
    pub amount_cents: i64,
    pub method: MethodDetails,
    pub customer: Customer,
    pub anonymous: bool,
    pub message: Option<String>,
    pub idempotency_key: String,
}

/// Data the donor needs to finish paying outside the card flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NextAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_qr_code_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boleto_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boleto_barcode: Option<String>,
}

/// A charge the gateway accepted.
#[derive(Debug, Clone)]
pub struct GatewayCharge {
    /// Gateway transaction id, used to correlate webhooks.
    pub id: String,
    /// Status string as reported by the gateway.
    pub status: String,
    pub next_action: NextAction,
    /// Full response body, kept for audit.
    pub raw: serde_json::Value,
}

impl GatewayCharge {
    pub fn initial_status(&self) -> DonationStatus {
        initial_status(&self.status)
    }
}

/// Map the gateway's synchronous order status to the donation's first status.
/// Anything not clearly captured or in progress starts as `pending`.
pub fn initial_status(gateway_status: &str) -> DonationStatus {
    match gateway_status.trim().to_ascii_lowercase().as_str() {
        "paid" => DonationStatus::Paid,
        "processing" => DonationStatus::Processing,
        _ => DonationStatus::Pending,
    }
}

/// An external payment processor able to create charges.
///
/// Implementations must send `request.idempotency_key` with the call so a
/// retried request cannot produce a second charge.
#[async_trait]
pub trait ChargeGateway: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Create a charge. Non-2xx answers are `GatewayRejected`; transport
    /// failures and timeouts are `GatewayUnavailable`.
    async fn create_charge(
        &self,
        credentials: &ParishCredentials,
        request: &ChargeRequest,
    ) -> Result<GatewayCharge>;
}
