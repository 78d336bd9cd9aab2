//! Integration tests for Peppercart.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database and apply migrations
//! docker compose up -d postgres
//! sqlx migrate run --source crates/api/migrations
//!
//! # Start the API
//! cargo run -p peppercart-api
//!
//! # Run integration tests
//! cargo test -p peppercart-integration-tests -- --ignored
//! ```
//!
//! The tests drive a running server over HTTP with a cookie-storing client,
//! so refresh-cookie behavior is exercised exactly as a browser would.

use reqwest::Client;

/// Base URL for the API (configurable via environment).
#[must_use]
pub fn api_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Create an HTTP client with a cookie store, so the refresh cookie set by
/// the server is replayed on subsequent requests like a browser would.
///
/// # Panics
///
/// Panics if the client cannot be constructed.
#[must_use]
pub fn cookie_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// Generate a unique test email so runs don't collide.
#[must_use]
pub fn unique_email() -> String {
    format!("test-{}@example.com", uuid::Uuid::new_v4())
}
