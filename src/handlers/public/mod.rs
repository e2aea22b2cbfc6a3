mod donations;
mod payments;

pub use donations::*;
pub use payments::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit::{self, RateLimitLayer};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn limited(router: Router<AppState>, layer: Option<RateLimitLayer>, name: &str) -> Router<AppState> {
    match layer {
        Some(layer) => router.layer(layer),
        None => {
            tracing::warn!("Rate limiter for {} could not be built; running unlimited", name);
            router
        }
    }
}

/// Public donor-facing routes. Limits are keyed on the peer IP, so the
/// server must be started with `into_make_service_with_connect_info`.
pub fn router(limits: RateLimitConfig) -> Router<AppState> {
    // Strict tier: each request may create a gateway charge
    let payments = limited(
        Router::new().route("/payments", post(create_payment)),
        rate_limit::strict_layer(limits.strict_rpm),
        "/payments",
    );
    let donations = limited(
        Router::new().route("/donations/{id}", get(get_donation)),
        rate_limit::standard_layer(limits.standard_rpm),
        "/donations",
    );

    Router::new()
        .route("/health", get(health))
        .merge(payments)
        .merge(donations)
}
