//! Token codec: issuance and verification for the two token classes.
//!
//! Access and refresh tokens are HS256 JWTs signed under independent
//! secrets, so compromise of one signing context cannot forge the other
//! class. Expiries and clock-skew leeway come from the injected
//! [`TokenConfig`], never from ambient state.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use peppercart_core::UserId;

use crate::config::TokenConfig;
use crate::models::User;

/// The two signing contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    /// Short-lived bearer credential, never persisted.
    Access,
    /// Long-lived rotation credential, stored as a fingerprint.
    Refresh,
}

/// Verification and signing failures.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token's expiry has elapsed (beyond the configured leeway).
    #[error("token expired")]
    Expired,

    /// The token is structurally invalid.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match the expected secret for the class.
    #[error("bad token signature")]
    BadSignature,

    /// Signing failed during issuance.
    #[error("token signing failed")]
    Signing,
}

/// JWT claim set carried by both token classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID, as a string per RFC 7519.
    pub sub: String,
    /// Owner's email at issuance time.
    pub email: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

impl Claims {
    /// Parse the subject back into a [`UserId`].
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Malformed` if the subject is not a numeric ID.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub
            .parse::<i32>()
            .map(UserId::new)
            .map_err(|_| TokenError::Malformed)
    }
}

/// Issues and verifies tokens for both classes.
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    validation: Validation,
}

impl TokenCodec {
    /// Build a codec from the injected token configuration.
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        let access = config.access_secret.expose_secret().as_bytes();
        let refresh = config.refresh_secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        // jsonwebtoken defaults to 60s of leeway; the configured value
        // (default 0) is authoritative.
        validation.leeway = config.leeway_secs;

        Self {
            access_encoding: EncodingKey::from_secret(access),
            access_decoding: DecodingKey::from_secret(access),
            refresh_encoding: EncodingKey::from_secret(refresh),
            refresh_decoding: DecodingKey::from_secret(refresh),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            validation,
        }
    }

    /// Issue a short-lived access token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn issue_access(&self, user: &User) -> Result<String, TokenError> {
        self.issue_with_ttl(user, TokenClass::Access, self.access_ttl_secs)
    }

    /// Issue a long-lived refresh token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if encoding fails.
    pub fn issue_refresh(&self, user: &User) -> Result<String, TokenError> {
        self.issue_with_ttl(user, TokenClass::Refresh, self.refresh_ttl_secs)
    }

    /// Refresh-token lifetime in seconds (drives the cookie's `Max-Age`).
    #[must_use]
    pub const fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Verify a token against the secret of the given class.
    ///
    /// # Errors
    ///
    /// - `TokenError::Expired` past the embedded expiry (plus leeway)
    /// - `TokenError::BadSignature` when signed under a different secret
    /// - `TokenError::Malformed` for anything structurally invalid
    pub fn verify(&self, token: &str, class: TokenClass) -> Result<Claims, TokenError> {
        let key = match class {
            TokenClass::Access => &self.access_decoding,
            TokenClass::Refresh => &self.refresh_decoding,
        };

        decode::<Claims>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })
    }

    fn issue_with_ttl(
        &self,
        user: &User,
        class: TokenClass,
        ttl_secs: i64,
    ) -> Result<String, TokenError> {
        let key = match class {
            TokenClass::Access => &self.access_encoding,
            TokenClass::Refresh => &self.refresh_encoding,
        };

        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        };

        encode(&Header::default(), &claims, key).map_err(|_| TokenError::Signing)
    }
}
