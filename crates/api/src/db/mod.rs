//! Database operations for the API's `PostgreSQL` store.
//!
//! ## Tables
//!
//! - `users` - Account records: credentials, roles, denormalized order stats
//! - `user_refresh_tokens` - Refresh-token fingerprints (one row per device
//!   session; membership is the revocation contract)
//!
//! # Migrations
//!
//! Migrations live in `crates/api/migrations/` and are run out-of-band
//! (`sqlx migrate run`), never on server startup.

pub mod users;

#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use peppercart_core::{Email, Role, UserId};

use crate::models::{OrderStats, User};

pub use users::PgUserStore;

/// Upper bound on stored refresh-token fingerprints per user.
///
/// Appending beyond the cap evicts the oldest rows, so a long-lived account
/// keeps at most this many concurrently valid refresh tokens. An evicted
/// device simply authenticates again.
pub const MAX_REFRESH_TOKENS_PER_USER: i64 = 10;

/// Errors produced by the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced row does not exist.
    #[error("not found")]
    NotFound,

    /// A stored value could not be decoded into its domain type.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Persistence interface consumed by the session manager and the guard.
///
/// One implementation is backed by `PostgreSQL` ([`PgUserStore`]); tests use
/// an in-memory implementation. The two fingerprint operations are the
/// load-bearing ones: `remove_fingerprint` must be a single conditional
/// mutation so that concurrent consumers of the same refresh token produce at
/// most one success.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user with a freshly hashed password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    async fn create(
        &self,
        email: &Email,
        password_hash: &str,
        name: &str,
        roles: &[Role],
    ) -> Result<User, RepositoryError>;

    /// Look up a user by email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Look up a user by ID.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Look up a user by email together with their password hash.
    ///
    /// The hash is returned out-of-band of the domain type so it can only
    /// reach the verifier, never a response payload.
    async fn credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// Append a refresh-token fingerprint, evicting entries beyond
    /// [`MAX_REFRESH_TOKENS_PER_USER`].
    async fn append_fingerprint(
        &self,
        id: UserId,
        fingerprint: &str,
    ) -> Result<(), RepositoryError>;

    /// Remove exactly one fingerprint if present.
    ///
    /// Returns `true` if a row was removed, `false` if the fingerprint was
    /// not in the set (already consumed or never issued).
    async fn remove_fingerprint(
        &self,
        id: UserId,
        fingerprint: &str,
    ) -> Result<bool, RepositoryError>;

    /// Update the allow-listed profile fields.
    ///
    /// Returns `None` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the new email is taken.
    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&str>,
        email: Option<&Email>,
    ) -> Result<Option<User>, RepositoryError>;

    /// Replace a user's role set. Admin-only operation at the service layer.
    ///
    /// Returns `None` if the user does not exist.
    async fn set_roles(&self, id: UserId, roles: &[Role]) -> Result<Option<User>, RepositoryError>;

    /// Overwrite the denormalized order statistics.
    ///
    /// Entry point for the order aggregation collaborator; the auth core
    /// never calls this. The touched columns are disjoint from everything the
    /// session manager writes.
    async fn update_order_stats(
        &self,
        id: UserId,
        stats: &OrderStats,
    ) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
