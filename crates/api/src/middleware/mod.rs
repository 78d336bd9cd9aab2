//! HTTP middleware for the API.
//!
//! - [`auth`] - Bearer-token authentication extractor and role gating
//! - [`rate_limit`] - Per-IP limits for credential endpoints

pub mod auth;
pub mod rate_limit;

pub use auth::{CurrentUser, RequireAuth, role_gate};
pub use rate_limit::auth_rate_limiter;
