//! Session and authorization management.
//!
//! The session manager orchestrates the password hasher, the token codec,
//! and the refresh-token fingerprint over the user store. Sessions are
//! per-identity, not per-connection: an identity holds one fingerprint per
//! live refresh token, and logout/rotation are membership mutations on that
//! set.

mod error;
pub mod fingerprint;
pub mod password;
pub mod token;

pub use error::AuthError;
pub use fingerprint::fingerprint;
pub use token::{Claims, TokenClass, TokenCodec, TokenError};

use secrecy::SecretString;

use peppercart_core::{Email, Role, UserId};

use crate::db::{RepositoryError, UserStore};
use crate::models::{ProfilePatch, User};

/// Display-name length bounds.
const NAME_MIN_LENGTH: usize = 2;
const NAME_MAX_LENGTH: usize = 30;

/// An access/refresh pair produced by issuance or rotation.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Bearer credential for the response body.
    pub access: String,
    /// Rotation credential for the refresh cookie.
    pub refresh: String,
}

/// Session manager over a user store.
///
/// Borrowed per-request from [`crate::state::AppState`]; holds no state of
/// its own beyond the injected collaborators.
pub struct AuthService<'a, S> {
    store: &'a S,
    tokens: &'a TokenCodec,
    refresh_secret: &'a SecretString,
}

impl<'a, S: UserStore> AuthService<'a, S> {
    /// Create a new session manager.
    #[must_use]
    pub const fn new(store: &'a S, tokens: &'a TokenCodec, refresh_secret: &'a SecretString) -> Self {
        Self {
            store,
            tokens,
            refresh_secret,
        }
    }

    /// Register a new user and open their first session.
    ///
    /// The password is hashed here, before the first persist; there is no
    /// hashing hook in the persistence layer.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidEmail` / `WeakPassword` / `InvalidName` on input
    ///   validation
    /// - `AuthError::UserAlreadyExists` if the email is taken
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<(User, IssuedTokens), AuthError> {
        let email = Email::parse(email)?;
        password::validate_password(password)?;
        validate_name(name)?;

        let password_hash = hash_blocking(password.to_owned()).await?;

        let user = self
            .store
            .create(&email, &password_hash, name, &[Role::Customer])
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        let tokens = self.open_session(&user).await?;

        Ok((user, tokens))
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` whether the email is unknown
    /// or the password is wrong; the two cases are indistinguishable to the
    /// caller.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, IssuedTokens), AuthError> {
        // A malformed email cannot match an account; same generic failure.
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::InvalidCredentials);
        };

        let (user, password_hash) = self
            .store
            .credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_blocking(password.to_owned(), password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.open_session(&user).await?;

        Ok((user, tokens))
    }

    /// Invalidate the presented refresh token.
    ///
    /// Exactly the presented token's fingerprint is removed; other devices'
    /// sessions stay valid. A second logout with the same token fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRefreshToken` if the token does not
    /// verify, its owner is gone, or its fingerprint was already consumed.
    pub async fn logout(&self, raw_refresh: &str) -> Result<(), AuthError> {
        self.consume_refresh(raw_refresh).await?;
        Ok(())
    }

    /// Rotate the presented refresh token into a fresh access/refresh pair.
    ///
    /// Single-use: the old fingerprint is removed before the new pair is
    /// issued, so of two concurrent rotations of the same token at most one
    /// succeeds, and replaying a rotated token always fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRefreshToken` under the same conditions as
    /// [`Self::logout`].
    pub async fn refresh(&self, raw_refresh: &str) -> Result<(User, IssuedTokens), AuthError> {
        let user = self.consume_refresh(raw_refresh).await?;
        let tokens = self.open_session(&user).await?;

        Ok((user, tokens))
    }

    /// Load the current user by the ID embedded in a verified access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the account was deleted between
    /// token issuance and use.
    pub async fn current_user(&self, id: UserId) -> Result<User, AuthError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Apply an allow-listed profile mutation (name and email only).
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidEmail` / `InvalidName` on validation
    /// - `AuthError::UserAlreadyExists` if the new email is taken
    /// - `AuthError::UserNotFound` if the user does not exist
    pub async fn update_profile(
        &self,
        id: UserId,
        patch: &ProfilePatch,
    ) -> Result<User, AuthError> {
        let email = match patch.email.as_deref() {
            Some(raw) => Some(Email::parse(raw)?),
            None => None,
        };
        if let Some(name) = patch.name.as_deref() {
            validate_name(name)?;
        }

        self.store
            .update_profile(id, patch.name.as_deref(), email.as_ref())
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?
            .ok_or(AuthError::UserNotFound)
    }

    /// Replace a user's role set. Admin-only; audited.
    ///
    /// Roles never flow through the profile path, so every role change comes
    /// through here and leaves a log line.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidRoles` if the set is empty
    /// - `AuthError::UserNotFound` if the target does not exist
    pub async fn assign_roles(
        &self,
        actor: UserId,
        target: UserId,
        roles: &[Role],
    ) -> Result<User, AuthError> {
        if roles.is_empty() {
            return Err(AuthError::InvalidRoles(
                "role set cannot be empty".to_owned(),
            ));
        }

        let mut deduped = roles.to_vec();
        deduped.sort_unstable_by_key(Role::as_str);
        deduped.dedup();

        let user = self
            .store
            .set_roles(target, &deduped)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        tracing::info!(
            actor = %actor,
            target = %target,
            roles = ?deduped,
            "role assignment"
        );

        Ok(user)
    }

    /// Issue an access/refresh pair and record the refresh fingerprint.
    async fn open_session(&self, user: &User) -> Result<IssuedTokens, AuthError> {
        let access = self.tokens.issue_access(user)?;
        let refresh = self.tokens.issue_refresh(user)?;

        let digest = fingerprint(&refresh, self.refresh_secret);
        self.store.append_fingerprint(user.id, &digest).await?;

        Ok(IssuedTokens { access, refresh })
    }

    /// Validate a presented refresh token and consume its fingerprint.
    ///
    /// The conditional removal is the rotation/logout linchpin: the store
    /// deletes the fingerprint only if it is still present, so the token is
    /// single-use even under concurrent presentation.
    async fn consume_refresh(&self, raw_refresh: &str) -> Result<User, AuthError> {
        let claims = self
            .tokens
            .verify(raw_refresh, TokenClass::Refresh)
            .map_err(|e| {
                tracing::debug!(error = %e, "refresh token rejected");
                AuthError::InvalidRefreshToken
            })?;

        let user_id = claims
            .user_id()
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let digest = fingerprint(raw_refresh, self.refresh_secret);
        if !self.store.remove_fingerprint(user.id, &digest).await? {
            return Err(AuthError::InvalidRefreshToken);
        }

        Ok(user)
    }
}

/// Validate a display name against the policy.
fn validate_name(name: &str) -> Result<(), AuthError> {
    let len = name.chars().count();
    if !(NAME_MIN_LENGTH..=NAME_MAX_LENGTH).contains(&len) {
        return Err(AuthError::InvalidName(format!(
            "name must be {NAME_MIN_LENGTH}-{NAME_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Run argon2 hashing off the async path.
async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|_| AuthError::PasswordHash)?
}

/// Run argon2 verification off the async path.
async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|_| AuthError::PasswordHash)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use secrecy::SecretString;

    use crate::config::TokenConfig;
    use crate::db::memory::MemoryUserStore;

    fn token_config() -> TokenConfig {
        TokenConfig {
            access_secret: SecretString::from("wN8#kT3$vQ6!bR9@mJ2^xZ5&cF1*dG4h"),
            refresh_secret: SecretString::from("dG4h*cF1&xZ5^mJ2@bR9!vQ6$kT3#wN8"),
            access_ttl_secs: 900,
            refresh_ttl_secs: 604_800,
            leeway_secs: 0,
        }
    }

    struct Fixture {
        store: MemoryUserStore,
        codec: TokenCodec,
        refresh_secret: SecretString,
    }

    impl Fixture {
        fn new() -> Self {
            let config = token_config();
            Self {
                store: MemoryUserStore::new(),
                codec: TokenCodec::new(&config),
                refresh_secret: config.refresh_secret,
            }
        }

        fn service(&self) -> AuthService<'_, MemoryUserStore> {
            AuthService::new(&self.store, &self.codec, &self.refresh_secret)
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (registered, _) = auth.register("a@x.com", "secret1", "A").await.unwrap();
        assert_eq!(registered.roles, vec![Role::Customer]);

        let (logged_in, tokens) = auth.login("a@x.com", "secret1").await.unwrap();
        assert_eq!(logged_in.id, registered.id);

        // The access token's subject matches the stored identity.
        let claims = fx.codec.verify(&tokens.access, TokenClass::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), registered.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let fx = Fixture::new();
        let auth = fx.service();

        auth.register("a@x.com", "secret1", "A").await.unwrap();
        let err = auth.register("a@x.com", "secret2", "B").await.unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_register_input_validation() {
        let fx = Fixture::new();
        let auth = fx.service();

        assert!(matches!(
            auth.register("not-an-email", "secret1", "A").await,
            Err(AuthError::InvalidEmail(_))
        ));
        assert!(matches!(
            auth.register("a@x.com", "short", "A").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            auth.register("a@x.com", "secret1", "A".repeat(31).as_str()).await,
            Err(AuthError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_login_enumeration_resistance() {
        let fx = Fixture::new();
        let auth = fx.service();

        auth.register("a@x.com", "secret1", "A").await.unwrap();

        let unknown = auth.login("nobody@x.com", "secret1").await.unwrap_err();
        let wrong = auth.login("a@x.com", "wrong-password").await.unwrap_err();

        // Identical error kind and identical message text.
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_refresh_rotation_is_single_use() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (_, tokens) = auth.register("a@x.com", "secret1", "A").await.unwrap();

        let (_, rotated) = auth.refresh(&tokens.refresh).await.unwrap();
        assert_ne!(rotated.refresh, tokens.refresh);

        // Replaying the consumed token fails.
        let err = auth.refresh(&tokens.refresh).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));

        // The rotated token is live.
        auth.refresh(&rotated.refresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_logout_fails_cleanly() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (_, tokens) = auth.register("a@x.com", "secret1", "A").await.unwrap();

        auth.logout(&tokens.refresh).await.unwrap();
        let err = auth.logout(&tokens.refresh).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_logout_leaves_other_sessions_valid() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (_, first) = auth.register("a@x.com", "secret1", "A").await.unwrap();
        let (_, second) = auth.login("a@x.com", "secret1").await.unwrap();

        auth.logout(&second.refresh).await.unwrap();

        // The first device's refresh token is still separately valid.
        auth.refresh(&first.refresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (_, tokens) = auth.register("a@x.com", "secret1", "A").await.unwrap();

        let err = auth.refresh(&tokens.access).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_current_user_not_found_after_deletion() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (user, _) = auth.register("a@x.com", "secret1", "A").await.unwrap();
        fx.store.delete_user(user.id);

        let err = auth.current_user(user.id).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn test_update_profile_allow_list_and_conflict() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (user, _) = auth.register("a@x.com", "secret1", "A").await.unwrap();
        auth.register("b@x.com", "secret1", "B").await.unwrap();

        let patch = ProfilePatch {
            name: Some("Alice".to_owned()),
            email: None,
        };
        let updated = auth.update_profile(user.id, &patch).await.unwrap();
        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.email.as_str(), "a@x.com");

        // Taking another account's email conflicts.
        let patch = ProfilePatch {
            name: None,
            email: Some("b@x.com".to_owned()),
        };
        let err = auth.update_profile(user.id, &patch).await.unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_assign_roles() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (admin, _) = auth.register("root@x.com", "secret1", "Root").await.unwrap();
        let (user, _) = auth.register("a@x.com", "secret1", "A").await.unwrap();

        let err = auth.assign_roles(admin.id, user.id, &[]).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRoles(_)));

        let updated = auth
            .assign_roles(admin.id, user.id, &[Role::Admin, Role::Customer, Role::Admin])
            .await
            .unwrap();
        assert_eq!(updated.roles.len(), 2);
        assert!(updated.has_role(Role::Admin));
    }

    #[tokio::test]
    async fn test_fingerprint_set_is_capped() {
        let fx = Fixture::new();
        let auth = fx.service();

        let (user, _) = auth.register("a@x.com", "secret1", "A").await.unwrap();

        for _ in 0..15 {
            auth.login("a@x.com", "secret1").await.unwrap();
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cap = crate::db::MAX_REFRESH_TOKENS_PER_USER as usize;
        assert_eq!(fx.store.fingerprint_count(user.id), cap);
    }

    #[tokio::test]
    async fn test_account_lifecycle() {
        let fx = Fixture::new();
        let auth = fx.service();

        // register → roles == ["customer"], session opened
        let (user, registration_tokens) =
            auth.register("a@x.com", "secret1", "A").await.unwrap();
        assert_eq!(user.roles, vec![Role::Customer]);

        // wrong password → unauthorized
        assert!(matches!(
            auth.login("a@x.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));

        // correct password → new pair; the registration refresh token stays
        // separately valid until explicitly consumed.
        let (_, login_tokens) = auth.login("a@x.com", "secret1").await.unwrap();
        assert_ne!(login_tokens.refresh, registration_tokens.refresh);

        auth.refresh(&registration_tokens.refresh).await.unwrap();
    }
}
