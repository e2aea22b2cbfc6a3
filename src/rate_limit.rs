//! Per-IP rate limits for the public endpoints.
//!
//! Tiers:
//! - Strict: `POST /payments` (every accepted request may reach the gateway)
//! - Standard: `GET /donations/{id}`
//!
//! The gateway webhook is never limited; a throttled delivery would only be
//! retried by the gateway.
//!
//! Configure via environment variables:
//! - RATE_LIMIT_STRICT_RPM (default: 10)
//! - RATE_LIMIT_STANDARD_RPM (default: 30)

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Replenish one request every `60 / rpm` seconds, allowing a burst of `rpm`.
fn create_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    let requests_per_minute = requests_per_minute.max(1);
    let period_secs = (60 / requests_per_minute as u64).max(1);

    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs))
        .burst_size(requests_per_minute)
        .finish()?;

    Some(GovernorLayer::new(Arc::new(config)))
}

pub fn strict_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    create_layer(requests_per_minute)
}

pub fn standard_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    create_layer(requests_per_minute)
}
