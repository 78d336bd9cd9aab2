//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::token::TokenError;

/// Errors that can occur during session-management operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] peppercart_core::EmailError),

    /// Invalid credentials. One variant for unknown email and wrong password,
    /// so the response cannot be used to enumerate accounts.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Refresh token rejected: bad signature, expired, unknown owner, or
    /// fingerprint no longer in the owner's set (consumed or revoked).
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Display name outside the accepted bounds.
    #[error("name validation failed: {0}")]
    InvalidName(String),

    /// Role set rejected (empty or otherwise invalid).
    #[error("role validation failed: {0}")]
    InvalidRoles(String),

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// Token signing failed.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
