use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::payments::format_cents;

/// Lifecycle state of a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DonationStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Refunded,
}

/// What to do when a gateway event asks for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write the new status.
    Apply,
    /// Donation is already in the target status (duplicate delivery).
    AlreadyInState,
    /// Target would regress the donation or leave a terminal state.
    Reject,
}

impl DonationStatus {
    /// `failed` and `refunded` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }

    /// Decide whether moving from `self` to `target` is allowed.
    ///
    /// Allowed moves:
    /// - pending -> processing | paid | failed | refunded
    /// - processing -> paid | failed | refunded
    /// - paid -> refunded
    pub fn transition_to(&self, target: DonationStatus) -> Transition {
        use DonationStatus::*;

        if *self == target {
            return Transition::AlreadyInState;
        }

        match (self, target) {
            (Pending, Processing | Paid | Failed | Refunded) => Transition::Apply,
            (Processing, Paid | Failed | Refunded) => Transition::Apply,
            (Paid, Refunded) => Transition::Apply,
            _ => Transition::Reject,
        }
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Pix,
    Boleto,
}

/// A single donor's contribution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub campaign_id: String,
    pub parish_id: String,
    pub donor_name: String,
    pub donor_email: String,
    pub donor_phone: Option<String>,
    /// Amount in centavos.
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: DonationStatus,
    pub anonymous: bool,
    pub message: Option<String>,
    /// Gateway order id. NULL while the reservation waits on the gateway.
    pub transaction_id: Option<String>,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub failure_reason: Option<String>,
    /// Raw payload of the last gateway response or applied webhook.
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Donation {
    /// Amount as a two-decimal string, e.g. `"10.00"`.
    pub fn amount(&self) -> String {
        format_cents(self.amount_cents)
    }
}

/// Input for the reservation row written before the gateway is called.
#[derive(Debug, Clone)]
pub struct CreateDonation {
    pub campaign_id: String,
    pub parish_id: String,
    pub donor_name: String,
    pub donor_email: String,
    pub donor_phone: Option<String>,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub anonymous: bool,
    pub message: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Donor-facing projection used by the success screen. Omits contact
/// details and the raw gateway payload.
#[derive(Debug, Clone, Serialize)]
pub struct DonationView {
    pub id: String,
    pub campaign_id: String,
    pub parish_id: String,
    pub donor_name: String,
    pub amount: String,
    pub payment_method: PaymentMethod,
    pub status: DonationStatus,
    pub transaction_id: Option<String>,
    pub created_at: i64,
}

pub const ANONYMOUS_DONOR_NAME: &str = "Anônimo";

impl From<&Donation> for DonationView {
    fn from(d: &Donation) -> Self {
        Self {
            id: d.id.clone(),
            campaign_id: d.campaign_id.clone(),
            parish_id: d.parish_id.clone(),
            donor_name: if d.anonymous {
                ANONYMOUS_DONOR_NAME.to_string()
            } else {
                d.donor_name.clone()
            },
            amount: d.amount(),
            payment_method: d.payment_method,
            status: d.status,
            transaction_id: d.transaction_id.clone(),
            created_at: d.created_at,
        }
    }
}
