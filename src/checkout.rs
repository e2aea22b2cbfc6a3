//! Payment initiation: validate a donor's request, reserve a ledger row,
//! create the charge at the gateway, then record the gateway's answer.
//!
//! The reservation is written before the gateway call, so every charge the
//! gateway accepts has a row, and every failed attempt keeps its reason.

use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::models::{CreateDonation, Donation, DonationStatus, PaymentMethod};
use crate::payments::{
    CardData, ChargeRequest, Customer, KeyMaterial, MethodDetails, NextAction, derive_key,
    extract_next_action, parse_amount_cents, parse_phone,
};

/// Donor checkout submission. Every field is optional at the serde level so
/// a missing value is reported by name instead of as a JSON error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub parish_id: Option<String>,
    #[serde(default)]
    pub donor_name: Option<String>,
    #[serde(default)]
    pub donor_email: Option<String>,
    #[serde(default)]
    pub donor_phone: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub anonymous: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub card_data: Option<CardData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub success: bool,
    pub donation_id: String,
    pub transaction_id: String,
    pub status: DonationStatus,
    /// Set when an earlier request with the same idempotency key is answered again.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
    #[serde(flatten)]
    pub next_action: NextAction,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One `@`, non-empty local part and domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

/// A request that passed every local check.
struct ValidatedRequest {
    campaign_id: String,
    parish_id: String,
    customer: Customer,
    donor_phone: Option<String>,
    amount_cents: i64,
    method: MethodDetails,
    anonymous: bool,
    message: Option<String>,
}

fn validate(request: &PaymentRequest, state: &AppState) -> Result<ValidatedRequest> {
    let campaign_id = required(&request.campaign_id, "campaign_id")?;
    let parish_id = required(&request.parish_id, "parish_id")?;
    let donor_name = required(&request.donor_name, "donor_name")?;
    let donor_email = required(&request.donor_email, "donor_email")?;
    if !is_valid_email(donor_email) {
        return Err(AppError::Validation("donor_email is invalid".into()));
    }

    let amount_cents = parse_amount_cents(&request.amount)?;

    let method: PaymentMethod = required(&request.payment_method, "payment_method")?
        .parse()
        .map_err(|_| {
            AppError::Validation("payment_method must be credit_card, pix or boleto".into())
        })?;

    let phone = optional(&request.donor_phone);
    let parsed_phone = phone.as_deref().map(parse_phone).transpose()?;

    let settings = &state.payments;
    let method = match method {
        PaymentMethod::CreditCard => {
            let card = request
                .card_data
                .as_ref()
                .ok_or_else(|| AppError::Validation("card_data is required".into()))?;
            MethodDetails::CreditCard(card.validate(Utc::now().date_naive())?)
        }
        PaymentMethod::Pix => MethodDetails::Pix {
            expires_in_secs: settings.pix_expires_in_secs,
        },
        PaymentMethod::Boleto => MethodDetails::Boleto {
            instructions: settings.boleto_instructions.clone(),
            due_at: TimeDelta::try_days(settings.boleto_due_days)
                .and_then(|due_in| Utc::now().checked_add_signed(due_in))
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "Boleto due date out of range ({} days)",
                        settings.boleto_due_days
                    ))
                })?,
        },
    };

    Ok(ValidatedRequest {
        campaign_id: campaign_id.to_string(),
        parish_id: parish_id.to_string(),
        customer: Customer {
            name: donor_name.to_string(),
            email: donor_email.to_string(),
            phone: parsed_phone,
        },
        donor_phone: phone,
        amount_cents,
        method,
        anonymous: request.anonymous.unwrap_or(false),
        message: optional(&request.message),
    })
}

/// Rebuild the answer for a donation that already went through the gateway.
fn replay(donation: &Donation) -> Option<PaymentResult> {
    let transaction_id = donation.transaction_id.clone()?;
    let next_action = donation
        .gateway_response
        .as_ref()
        .map(|raw| extract_next_action(donation.payment_method, raw))
        .unwrap_or_default();
    Some(PaymentResult {
        success: donation.status != DonationStatus::Failed,
        donation_id: donation.id.clone(),
        transaction_id,
        status: donation.status,
        replayed: true,
        next_action,
    })
}

/// Record a failed gateway call on its reservation and decide the answer.
///
/// A rejection is final: the row fails and its key is released. Any other
/// error leaves the outcome open for a webhook or a retry. When a webhook has
/// already linked the charge, the stored result is returned instead of `error`.
fn record_gateway_error(state: &AppState, donation_id: &str, error: AppError) -> Result<PaymentResult> {
    let recorded = state.db.get().map_err(AppError::from).and_then(|conn| {
        let marked = match &error {
            AppError::GatewayRejected { details, .. } => {
                queries::mark_donation_failed(&conn, donation_id, &error.to_string(), Some(details))?
            }
            _ => {
                tracing::warn!(
                    "Gateway outcome unknown for donation {}: {}. Left pending for webhook or retry",
                    donation_id,
                    error
                );
                queries::mark_donation_unresolved(&conn, donation_id, &error.to_string())?
            }
        };
        if marked {
            return Ok(None);
        }
        queries::get_donation_by_id(&conn, donation_id)
    });

    match recorded {
        Ok(None) => Err(error),
        Ok(Some(current)) => match replay(&current) {
            Some(result) => {
                tracing::warn!(
                    "Gateway error for donation {} ({}), but it is already linked to {:?}; reporting status {}",
                    donation_id,
                    error,
                    current.transaction_id,
                    current.status
                );
                Ok(PaymentResult {
                    replayed: false,
                    ..result
                })
            }
            None => Err(error),
        },
        Err(mark_err) => {
            tracing::error!(
                "Could not record failure of donation {}: {} (gateway error: {})",
                donation_id,
                mark_err,
                error
            );
            Err(error)
        }
    }
}

/// Run one payment initiation end to end.
///
/// `client_key` is the validated `Idempotency-Key` header, if the caller sent one.
pub async fn initiate_payment(
    state: &AppState,
    request: PaymentRequest,
    client_key: Option<String>,
) -> Result<PaymentResult> {
    let input = validate(&request, state)?;
    let payment_method = input.method.payment_method();

    let (credentials, donation) = {
        let mut conn = state.db.get()?;

        let credentials = queries::get_parish_credentials(&conn, &input.parish_id, &state.master_key)?;
        let campaign = queries::get_campaign_by_id(&conn, &input.campaign_id)?
            .ok_or(AppError::CampaignNotFound)?;
        if campaign.parish_id != input.parish_id {
            return Err(AppError::CampaignNotFound);
        }

        let material = KeyMaterial {
            campaign_id: &input.campaign_id,
            parish_id: &input.parish_id,
            donor_email: &input.customer.email,
            amount_cents: input.amount_cents,
            payment_method,
        };
        let idempotency_key = client_key.unwrap_or_else(|| {
            derive_key(
                &material,
                Utc::now().timestamp(),
                state.payments.idempotency_window_secs,
            )
        });

        let reservation = queries::reserve_donation(
            &mut conn,
            &CreateDonation {
                campaign_id: input.campaign_id.clone(),
                parish_id: input.parish_id.clone(),
                donor_name: input.customer.name.clone(),
                donor_email: input.customer.email.clone(),
                donor_phone: input.donor_phone.clone(),
                amount_cents: input.amount_cents,
                payment_method,
                anonymous: input.anonymous,
                message: input.message.clone(),
                idempotency_key: Some(idempotency_key),
            },
        )?;

        let donation = match reservation {
            queries::Reservation::Created(donation) => donation,
            queries::Reservation::Existing(existing) => {
                if !material.matches(&existing) {
                    tracing::warn!(
                        "Idempotency key of donation {} reused for a different payment",
                        existing.id
                    );
                    return Err(AppError::Conflict(msg::IDEMPOTENCY_KEY_REUSED.into()));
                }
                if let Some(result) = replay(&existing) {
                    tracing::info!("Replaying donation {} for repeated request", existing.id);
                    return Ok(result);
                }
                if !queries::claim_unresolved_donation(&conn, &existing.id)? {
                    return Err(AppError::Conflict(msg::PAYMENT_IN_FLIGHT.into()));
                }
                tracing::info!("Retrying unresolved donation {} under its original key", existing.id);
                existing
            }
        };
        (credentials, donation)
    };

    let charge_request = ChargeRequest {
        donation_id: donation.id.clone(),
        campaign_id: input.campaign_id,
        parish_id: input.parish_id,
        amount_cents: input.amount_cents,
        method: input.method,
        customer: input.customer,
        anonymous: input.anonymous,
        message: input.message,
        idempotency_key: donation.idempotency_key.clone().unwrap_or_default(),
    };

    let charge = match state.gateway.create_charge(&credentials, &charge_request).await {
        Ok(charge) => charge,
        Err(e) => return record_gateway_error(state, &donation.id, e),
    };

    tracing::info!(
        "{} accepted charge {} for donation {} (status {:?})",
        state.gateway.name(),
        charge.id,
        donation.id,
        charge.status
    );

    let persisted = state.db.get().map_err(AppError::from).and_then(|mut conn| {
        queries::attach_gateway_result(
            &mut conn,
            &donation.id,
            &charge.id,
            charge.initial_status(),
            &charge.raw,
        )
    });

    let change = match persisted {
        Ok(change) => change,
        Err(e) => {
            tracing::error!(
                "CHARGE NOT RECORDED: gateway transaction {} succeeded but donation {} could not be updated: {}. Manual reconciliation required.",
                charge.id,
                donation.id,
                e
            );
            return Err(e);
        }
    };

    Ok(PaymentResult {
        success: true,
        donation_id: change.donation.id,
        transaction_id: charge.id,
        status: change.donation.status,
        replayed: false,
        next_action: charge.next_action,
    })
}
