//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                  - Liveness check
//! GET  /health/ready            - Readiness check (verifies database)
//!
//! # Sessions (rate-limited per IP)
//! POST /auth/register           - Create account, open first session (201)
//! POST /auth/login              - Authenticate, open session
//! POST /auth/token              - Rotate the refresh cookie into a new pair
//! POST /auth/logout             - Invalidate the presented refresh token
//!
//! # Account (requires bearer access token)
//! GET   /auth/user              - Current user's public view
//! GET   /auth/user/roles        - Current user's role list
//! PATCH /auth/user              - Update profile (name/email only)
//!
//! # Admin (requires admin role)
//! PATCH /auth/users/{id}/roles  - Replace a user's role set
//! ```

pub mod auth;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};

use peppercart_core::Role;

use crate::middleware::{auth_rate_limiter, role_gate};
use crate::state::AppState;

/// Create the session routes router (credential endpoints, rate-limited).
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/token", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route_layer(auth_rate_limiter())
}

/// Create the account routes router (guarded by the access token).
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/user", get(auth::current_user).patch(auth::update_profile))
        .route("/user/roles", get(auth::current_user_roles))
}

/// Create the admin routes router (role-gated).
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users/{id}/roles", patch(auth::assign_roles))
        .route_layer(from_fn_with_state(
            (state.clone(), Role::Admin),
            role_gate,
        ))
}

/// Create all routes for the API.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/auth",
        session_routes()
            .merge(account_routes())
            .merge(admin_routes(state)),
    )
}
