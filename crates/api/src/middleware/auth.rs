//! Authentication middleware and extractors.
//!
//! The guard runs in two stages, in order:
//!
//! 1. **Authentication** ([`RequireAuth`]): extract the bearer access token,
//!    verify it against the access signing context, and load the identity it
//!    names. Every failure collapses to 401 - the response does not say
//!    whether the token was missing, expired, malformed, or orphaned by a
//!    deleted account. Internal logs keep the distinction.
//! 2. **Authorization** ([`role_gate`]): optional per-route role check,
//!    applied only after authentication succeeded, so an authentication
//!    failure is never reported as 403.

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use peppercart_core::{Email, Role, UserId};

use crate::db::UserStore;
use crate::error::AppError;
use crate::services::auth::TokenClass;
use crate::state::AppState;

/// The authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Role set.
    pub roles: Vec<Role>,
}

/// Extractor that requires a valid bearer access token.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

fn unauthorized() -> AppError {
    AppError::Unauthorized("authentication required".to_owned())
}

impl<S> FromRequestParts<S> for RequireAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let token = bearer_token(&parts.headers).ok_or_else(unauthorized)?;

        let claims = state
            .tokens()
            .verify(&token, TokenClass::Access)
            .map_err(|e| {
                // Expired vs malformed matters for operators, not callers.
                tracing::debug!(error = %e, "access token rejected");
                unauthorized()
            })?;

        let user_id = claims.user_id().map_err(|_| unauthorized())?;

        // A deleted account is unauthenticated, not "not found" - 404 here
        // would confirm the account once existed.
        let user = state
            .store()
            .find_by_id(user_id)
            .await?
            .ok_or_else(unauthorized)?;

        Ok(Self(CurrentUser {
            id: user.id,
            email: user.email,
            name: user.name,
            roles: user.roles,
        }))
    }
}

/// Role-gate middleware, composable per route:
///
/// ```rust,ignore
/// router.route_layer(middleware::from_fn_with_state(
///     (state.clone(), Role::Admin),
///     role_gate,
/// ))
/// ```
///
/// Authenticates first (so the failure mode of a bad token stays 401), then
/// requires the given role, and attaches the identity to the request
/// extensions for the handler.
pub async fn role_gate(
    State((_, required)): State<(AppState, Role)>,
    RequireAuth(user): RequireAuth,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !user.roles.contains(&required) {
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

impl FromRef<(AppState, Role)> for AppState {
    fn from_ref(input: &(AppState, Role)) -> Self {
        input.0.clone()
    }
}

/// Extract the token from the standard `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        let headers = headers_with_auth("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_lowercase_scheme() {
        let headers = headers_with_auth("bearer abc");
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_bearer_token_missing_header() {
        assert!(bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let headers = headers_with_auth("Basic dXNlcjpwYXNz");
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_bearer_token_empty_token() {
        let headers = headers_with_auth("Bearer ");
        assert!(bearer_token(&headers).is_none());
    }
}
