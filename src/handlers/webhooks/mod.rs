mod pagarme;

pub use pagarme::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/pagarme", post(handle_pagarme_webhook))
}
