//! Rate limiting middleware using governor and `tower_governor`.
//!
//! Credential endpoints (login, registration, token rotation) get a strict
//! per-IP budget to blunt brute-force and token-grinding attempts.

use std::sync::Arc;

use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor};

/// Rate limiter layer type for Axum.
///
/// `SmartIpKeyExtractor` resolves the real client IP from standard proxy
/// headers (`x-forwarded-for`, `x-real-ip`, `forwarded`) before falling back
/// to the peer address, which requires the server to be started with
/// `into_make_service_with_connect_info`.
pub type RateLimiterLayer =
    GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for credential endpoints: ~30 requests per minute per IP.
///
/// Configuration: 1 request every 2 seconds (replenish), burst of 30. The
/// burst absorbs a multi-tab login storm; the sustained rate is what blunts
/// brute-forcing.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(2)` and `burst_size(30)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(2) // Replenish 1 token every 2 seconds (~30/minute)
        .burst_size(30)
        .finish()
        .expect("rate limiter config with per_second(2) and burst_size(30) is valid");
    GovernorLayer::new(Arc::new(config))
}
