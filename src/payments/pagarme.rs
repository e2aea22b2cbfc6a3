use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{ChargeGateway, ChargeRequest, GatewayCharge, MethodDetails, NextAction, PhoneNumber};
use crate::error::{AppError, Result};
use crate::models::{ParishCredentials, PaymentMethod};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_API_URL: &str = "https://api.pagar.me/core/v5";
pub const ITEM_DESCRIPTION: &str = "Doação para campanha";
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

// ============ Order payload ============

#[derive(Debug, Serialize)]
pub struct OrderPayload {
    items: Vec<OrderItem>,
    customer: OrderCustomer,
    payments: Vec<OrderPayment>,
    metadata: OrderMetadata,
}

#[derive(Debug, Serialize)]
struct OrderItem {
    amount: i64,
    description: &'static str,
    quantity: u32,
    code: String,
}

#[derive(Debug, Serialize)]
struct OrderCustomer {
    name: String,
    email: String,
    #[serde(rename = "type")]
    customer_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phones: Option<CustomerPhones>,
}

#[derive(Debug, Serialize)]
struct CustomerPhones {
    mobile_phone: PhoneNumber,
}

#[derive(Debug, Serialize)]
struct OrderPayment {
    payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    credit_card: Option<CreditCardPayment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pix: Option<PixPayment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boleto: Option<BoletoPayment>,
}

#[derive(Debug, Serialize)]
struct CreditCardPayment {
    card: CardPayload,
}

// Carries the full card number and CVV, so Debug is redacted.
#[derive(Serialize)]
struct CardPayload {
    number: String,
    holder_name: String,
    exp_month: u32,
    exp_year: i32,
    cvv: String,
}

impl std::fmt::Debug for CardPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CardPayload(..)")
    }
}

#[derive(Debug, Serialize)]
struct PixPayment {
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct BoletoPayment {
    instructions: String,
    due_at: String,
}

#[derive(Debug, Serialize)]
struct OrderMetadata {
    donation_id: String,
    campaign_id: String,
    parish_id: String,
    anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Build the `POST /orders` body for a charge request.
pub fn build_order_payload(request: &ChargeRequest) -> OrderPayload {
    let mut payment = OrderPayment {
        payment_method: request.method.payment_method(),
        credit_card: None,
        pix: None,
        boleto: None,
    };
    match &request.method {
        MethodDetails::CreditCard(card) => {
            payment.credit_card = Some(CreditCardPayment {
                card: CardPayload {
                    number: card.number.clone(),
                    holder_name: card.holder_name.clone(),
                    exp_month: card.exp_month,
                    exp_year: card.exp_year,
                    cvv: card.cvv.clone(),
                },
            });
        }
        MethodDetails::Pix { expires_in_secs } => {
            payment.pix = Some(PixPayment {
                expires_in: *expires_in_secs,
            });
        }
        MethodDetails::Boleto {
            instructions,
            due_at,
        } => {
            payment.boleto = Some(BoletoPayment {
                instructions: instructions.clone(),
                due_at: due_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            });
        }
    }

    OrderPayload {
        items: vec![OrderItem {
            amount: request.amount_cents,
            description: ITEM_DESCRIPTION,
            quantity: 1,
            code: request.campaign_id.clone(),
        }],
        customer: OrderCustomer {
            name: request.customer.name.clone(),
            email: request.customer.email.clone(),
            customer_type: "individual",
            phones: request.customer.phone.clone().map(|mobile_phone| CustomerPhones { mobile_phone }),
        },
        payments: vec![payment],
        metadata: OrderMetadata {
            donation_id: request.donation_id.clone(),
            campaign_id: request.campaign_id.clone(),
            parish_id: request.parish_id.clone(),
            anonymous: request.anonymous,
            message: request.message.clone(),
        },
    }
}

// ============ Response handling ============

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Pull PIX / boleto follow-up data from `charges[0].last_transaction`.
pub fn extract_next_action(method: PaymentMethod, order: &Value) -> NextAction {
    let Some(tx) = order.pointer("/charges/0/last_transaction") else {
        return NextAction::default();
    };
    let owned = |key: &str| str_field(tx, key).map(str::to_string);

    match method {
        PaymentMethod::Pix => NextAction {
            pix_qr_code: owned("qr_code"),
            pix_qr_code_url: owned("qr_code_url"),
            ..Default::default()
        },
        PaymentMethod::Boleto => NextAction {
            boleto_url: owned("url").or_else(|| owned("pdf")),
            boleto_barcode: owned("line").or_else(|| owned("barcode")),
            ..Default::default()
        },
        PaymentMethod::CreditCard => NextAction::default(),
    }
}

/// Interpret a successful order response.
pub fn parse_order_response(method: PaymentMethod, order: Value) -> Result<GatewayCharge> {
    let id = str_field(&order, "id")
        .map(str::to_string)
        .ok_or_else(|| AppError::GatewayUnavailable("Pagar.me response has no order id".into()))?;
    let status = str_field(&order, "status").unwrap_or_default().to_string();
    let next_action = extract_next_action(method, &order);

    Ok(GatewayCharge {
        id,
        status,
        next_action,
        raw: order,
    })
}

// ============ Client ============

#[derive(Debug, Clone)]
pub struct PagarmeClient {
    client: Client,
    base_url: String,
}

impl PagarmeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChargeGateway for PagarmeClient {
    fn name(&self) -> &'static str {
        "pagarme"
    }

    async fn create_charge(
        &self,
        credentials: &ParishCredentials,
        request: &ChargeRequest,
    ) -> Result<GatewayCharge> {
        let payload = build_order_payload(request);

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .bearer_auth(credentials.secret_key.expose_secret())
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "request timed out" } else { "request failed" };
                AppError::GatewayUnavailable(format!("Pagar.me {}: {}", reason, e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Pagar.me body read failed: {}", e)))?;
        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            tracing::warn!(
                "Pagar.me rejected charge for donation {} (HTTP {})",
                request.donation_id,
                status.as_u16()
            );
            return Err(AppError::GatewayRejected {
                status: status.as_u16(),
                details: parsed.unwrap_or(Value::String(body)),
            });
        }

        let order = parsed.ok_or_else(|| {
            AppError::GatewayUnavailable("Pagar.me returned a non-JSON success body".into())
        })?;
        parse_order_response(request.method.payment_method(), order)
    }
}

// ============ Webhook signatures ============

/// Check an `X-Hub-Signature: sha256=<hex>` header against the raw body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<()> {
    let provided = header
        .map(str::trim)
        .map(|h| h.strip_prefix("sha256=").unwrap_or(h))
        .ok_or(AppError::InvalidSignature)?
        .to_ascii_lowercase();

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Length is not secret; it is always 64 hex chars.
    if expected.len() != provided.len() {
        return Err(AppError::InvalidSignature);
    }
    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

/// Compute the `X-Hub-Signature` value for a body.
pub fn sign_webhook_body(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
