//! Test utilities and fixtures for the parish donations integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use rusqlite::Connection;
use serde_json::{Value, json};
use tower::ServiceExt;

pub use parish_donations::config::PaymentSettings;
pub use parish_donations::crypto::MasterKey;
pub use parish_donations::db::{AppState, create_memory_pool, init_db, queries};
pub use parish_donations::error::{AppError, Result};
pub use parish_donations::handlers::public::{create_payment, get_donation, health};
pub use parish_donations::handlers::webhooks;
pub use parish_donations::models::*;
pub use parish_donations::payments::{
    ChargeGateway, ChargeRequest, GatewayCharge, extract_next_action,
};

pub const TEST_SECRET_KEY: &str = "sk_test_parish_123";

/// Create a test master key (deterministic for testing)
pub fn test_master_key() -> MasterKey {
    MasterKey::from_bytes([0u8; 32])
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

// ============ Fake gateway ============

/// What the fake gateway does with the next charge.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Accept and report this order status (`paid`, `pending`, ...).
    Accept { status: String },
    /// Answer 400 with a Pagar.me style error body.
    Reject,
    /// Fail as if the connection timed out.
    Unavailable,
}

/// Runs inside the fake gateway call, before it answers.
pub type CallHook = Box<dyn Fn(&ChargeRequest) + Send + Sync>;

/// In-process `ChargeGateway` that records every call.
pub struct FakeGateway {
    outcome: Mutex<FakeOutcome>,
    calls: Mutex<Vec<ChargeRequest>>,
    on_call: Mutex<Option<CallHook>>,
}

impl FakeGateway {
    pub fn new(outcome: FakeOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            calls: Mutex::new(Vec::new()),
            on_call: Mutex::new(None),
        })
    }

    pub fn accepting(status: &str) -> Arc<Self> {
        Self::new(FakeOutcome::Accept {
            status: status.to_string(),
        })
    }

    pub fn set_outcome(&self, outcome: FakeOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    /// Simulate something happening while the charge request is in flight
    /// (e.g. a webhook delivered before the gateway's answer).
    pub fn set_on_call(&self, hook: impl Fn(&ChargeRequest) + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<ChargeRequest> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChargeGateway for FakeGateway {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_charge(
        &self,
        _credentials: &ParishCredentials,
        request: &ChargeRequest,
    ) -> Result<GatewayCharge> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len()
        };
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook(request);
        }
        let outcome = self.outcome.lock().unwrap().clone();

        match outcome {
            FakeOutcome::Accept { status } => {
                let id = format!("or_fake_{}", call_number);
                let raw = json!({
                    "id": id,
                    "status": status,
                    "charges": [{
                        "id": format!("ch_fake_{}", call_number),
                        "last_transaction": {
                            "qr_code": "00020126580014br.gov.bcb.pix",
                            "qr_code_url": "https://pix.example/qr.png",
                            "url": "https://boleto.example/b.pdf",
                            "line": "23793.38128 60000.000003 00000.000400 1 84340000005000"
                        }
                    }]
                });
                let method = request.method.payment_method();
                Ok(GatewayCharge {
                    id,
                    status,
                    next_action: extract_next_action(method, &raw),
                    raw,
                })
            }
            FakeOutcome::Reject => Err(AppError::GatewayRejected {
                status: 400,
                details: json!({"message": "The request is invalid.", "errors": {"card": ["declined"]}}),
            }),
            FakeOutcome::Unavailable => Err(AppError::GatewayUnavailable(
                "Pagar.me request timed out".into(),
            )),
        }
    }
}

// ============ App state and routers ============

/// Create an AppState for testing with an in-memory database and a fake gateway
pub fn create_test_app_state(gateway: Arc<FakeGateway>) -> AppState {
    let pool = create_memory_pool().expect("Failed to create in-memory pool");
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        master_key: test_master_key(),
        gateway,
        payments: PaymentSettings::default(),
        webhook_secret: None,
    }
}

/// Router with every endpoint, without rate limiting (tests have no peer IP)
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments", post(create_payment))
        .route("/donations/{id}", get(get_donation))
        .merge(webhooks::router())
        .with_state(state)
}

// ============ Fixtures ============

pub fn create_test_parish(conn: &Connection, configured: bool) -> Parish {
    let parish = queries::create_parish(
        conn,
        &CreateParish {
            name: "Paróquia Nossa Senhora Aparecida".to_string(),
        },
    )
    .expect("Failed to create test parish");
    if configured {
        queries::set_parish_gateway_key(conn, &parish.id, TEST_SECRET_KEY, &test_master_key())
            .expect("Failed to store test gateway key");
    }
    parish
}

pub fn create_test_campaign(conn: &Connection, parish_id: &str) -> Campaign {
    queries::create_campaign(
        conn,
        &CreateCampaign {
            parish_id: parish_id.to_string(),
            title: "Reforma da capela".to_string(),
            goal_cents: 1_000_000,
        },
    )
    .expect("Failed to create test campaign")
}

/// Parish (configured or not) with one campaign.
pub fn setup_parish(state: &AppState, configured: bool) -> (Parish, Campaign) {
    let conn = state.db.get().unwrap();
    let parish = create_test_parish(&conn, configured);
    let campaign = create_test_campaign(&conn, &parish.id);
    (parish, campaign)
}

/// A donation that already went through the gateway, in `status`.
pub fn create_test_donation(
    conn: &mut Connection,
    campaign: &Campaign,
    transaction_id: &str,
    amount_cents: i64,
    status: DonationStatus,
) -> Donation {
    let donation = create_test_reservation(conn, campaign, &format!("key-{}", transaction_id), amount_cents);

    let initial = match status {
        DonationStatus::Paid | DonationStatus::Processing => status,
        _ => DonationStatus::Pending,
    };
    queries::attach_gateway_result(conn, &donation.id, transaction_id, initial, &json!({"id": transaction_id}))
        .expect("Failed to attach gateway result");

    if initial != status {
        queries::apply_donation_status(conn, &donation.id, status, &json!({"seed": true}), None)
            .expect("Failed to set donation status");
    }

    queries::get_donation_by_id(conn, &donation.id).unwrap().unwrap()
}

/// A `pending` reservation with no transaction id yet.
pub fn create_test_reservation(
    conn: &mut Connection,
    campaign: &Campaign,
    idempotency_key: &str,
    amount_cents: i64,
) -> Donation {
    let input = CreateDonation {
        campaign_id: campaign.id.clone(),
        parish_id: campaign.parish_id.clone(),
        donor_name: "Ana Souza".to_string(),
        donor_email: "ana@example.com".to_string(),
        donor_phone: Some("11987654321".to_string()),
        amount_cents,
        payment_method: PaymentMethod::Pix,
        anonymous: false,
        message: None,
        idempotency_key: Some(idempotency_key.to_string()),
    };
    match queries::reserve_donation(conn, &input).expect("Failed to reserve donation") {
        queries::Reservation::Created(d) => d,
        queries::Reservation::Existing(d) => panic!("idempotency key already used by {}", d.id),
    }
}

pub fn payment_body(parish: &Parish, campaign: &Campaign, method: &str) -> Value {
    json!({
        "campaign_id": campaign.id,
        "parish_id": parish.id,
        "donor_name": "Ana",
        "donor_email": "a@x.com",
        "amount": 50,
        "payment_method": method,
    })
}

pub fn valid_card() -> Value {
    json!({
        "number": "4111 1111 1111 1111",
        "holder_name": "ANA SOUZA",
        "exp_month": "12",
        "exp_year": "2099",
        "cvv": "123"
    })
}

pub fn count_donations(state: &AppState) -> i64 {
    let conn = state.db.get().unwrap();
    queries::count_donations(&conn).unwrap()
}

pub fn campaign_total(state: &AppState, campaign_id: &str) -> i64 {
    let conn = state.db.get().unwrap();
    queries::get_campaign_by_id(&conn, campaign_id)
        .unwrap()
        .unwrap()
        .current_cents
}

// ============ HTTP helpers ============

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

/// Send a request and decode the JSON body (Null when empty or not JSON).
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    send(app, json_request("POST", uri, body)).await
}
