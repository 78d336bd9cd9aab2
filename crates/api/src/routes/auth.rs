//! Session route handlers.
//!
//! JSON in, JSON out. Success payloads use one envelope shape:
//! `{"success": true, "user": {...}, "accessToken"?: "..."}` - the access
//! token appears only on issuance and rotation, never on plain reads. The
//! refresh token never appears in a body; it travels exclusively in the
//! `HttpOnly` cookie set here.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use peppercart_core::{Role, UserId};

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, RequireAuth};
use crate::models::{ProfilePatch, User, UserPublic};
use crate::services::auth::IssuedTokens;
use crate::state::AppState;

/// Fixed name of the refresh-token cookie.
pub const REFRESH_COOKIE_NAME: &str = "peppercart_refresh";

/// The cookie is scoped to the session routes; nothing else reads it.
const REFRESH_COOKIE_PATH: &str = "/auth";

// =============================================================================
// Request / Response Types
// =============================================================================

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Admin role-assignment request body.
#[derive(Debug, Deserialize)]
pub struct RolesRequest {
    pub roles: Vec<Role>,
}

/// Success envelope for session and profile responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub user: UserPublic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl SessionResponse {
    fn issued(user: &User, tokens: &IssuedTokens) -> Self {
        Self {
            success: true,
            user: UserPublic::from(user),
            access_token: Some(tokens.access.clone()),
        }
    }

    fn read(user: &User) -> Self {
        Self {
            success: true,
            user: UserPublic::from(user),
            access_token: None,
        }
    }
}

// =============================================================================
// Session Routes
// =============================================================================

/// `POST /auth/register` - create an account and open its first session.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response> {
    let auth = state.auth();
    let (user, tokens) = auth.register(&body.email, &body.password, &body.name).await?;

    issuance_response(StatusCode::CREATED, &state, &user, &tokens)
}

/// `POST /auth/login` - authenticate and open a session.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response> {
    let auth = state.auth();
    let (user, tokens) = auth.login(&body.email, &body.password).await?;

    issuance_response(StatusCode::OK, &state, &user, &tokens)
}

/// `POST /auth/token` - rotate the refresh token from the cookie.
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let raw = refresh_cookie_value(&headers)
        .ok_or_else(|| AppError::Unauthorized("invalid refresh token".to_owned()))?;

    let auth = state.auth();
    let (user, tokens) = auth.refresh(&raw).await?;

    issuance_response(StatusCode::OK, &state, &user, &tokens)
}

/// `POST /auth/logout` - invalidate the refresh token from the cookie.
///
/// Only the presented token's session ends; the user's other devices stay
/// logged in. The cookie is cleared with an immediately-expiring replacement
/// of the same name and path.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let raw = refresh_cookie_value(&headers)
        .ok_or_else(|| AppError::Unauthorized("invalid refresh token".to_owned()))?;

    state.auth().logout(&raw).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        SET_COOKIE,
        clear_refresh_cookie(state.config().cookie_secure)
            .map_err(|e| AppError::Internal(e.to_string()))?,
    );

    Ok((
        StatusCode::OK,
        response_headers,
        Json(serde_json::json!({ "success": true })),
    )
        .into_response())
}

// =============================================================================
// Account Routes (guarded)
// =============================================================================

/// `GET /auth/user` - the current user's public view.
pub async fn current_user(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SessionResponse>> {
    // Re-read instead of echoing the guard's copy: the account may have been
    // deleted between token issuance and this call.
    let user = state.auth().current_user(user.id).await?;

    Ok(Json(SessionResponse::read(&user)))
}

/// `GET /auth/user/roles` - the current user's role list.
pub async fn current_user_roles(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Role>>> {
    let user = state.auth().current_user(user.id).await?;

    Ok(Json(user.roles))
}

/// `PATCH /auth/user` - update the allow-listed profile fields.
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<SessionResponse>> {
    let updated = state.auth().update_profile(user.id, &patch).await?;

    Ok(Json(SessionResponse::read(&updated)))
}

// =============================================================================
// Admin Routes (role-gated)
// =============================================================================

/// `PATCH /auth/users/{id}/roles` - replace a user's role set.
///
/// Gated by `role_gate(Role::Admin)`; the acting admin arrives via request
/// extensions.
pub async fn assign_roles(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(body): Json<RolesRequest>,
) -> Result<Json<SessionResponse>> {
    let updated = state
        .auth()
        .assign_roles(actor.id, UserId::new(id), &body.roles)
        .await?;

    Ok(Json(SessionResponse::read(&updated)))
}

// =============================================================================
// Cookie Helpers
// =============================================================================

/// Build the envelope + `Set-Cookie` response for an issuance or rotation.
fn issuance_response(
    status: StatusCode,
    state: &AppState,
    user: &User,
    tokens: &IssuedTokens,
) -> Result<Response> {
    let cookie = refresh_cookie(
        &tokens.refresh,
        state.tokens().refresh_ttl_secs(),
        state.config().cookie_secure,
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((status, headers, Json(SessionResponse::issued(user, tokens))).into_response())
}

/// Build the `HttpOnly` refresh cookie, expiring with the token itself.
fn refresh_cookie(
    token: &str,
    max_age_secs: i64,
    secure: bool,
) -> std::result::Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={token}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build the clearing cookie: same name and path, immediate expiry.
fn clear_refresh_cookie(secure: bool) -> std::result::Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Lax; Max-Age=0"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read the refresh token out of the request's `Cookie` header.
fn refresh_cookie_value(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use chrono::Utc;

    use peppercart_core::{Email, UserId};

    use crate::models::OrderStats;

    fn sample_user() -> User {
        User {
            id: UserId::new(5),
            email: Email::parse("a@x.com").unwrap(),
            name: "A".to_owned(),
            roles: vec![Role::Customer],
            stats: OrderStats::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie("tok.en.value", 604_800, true).unwrap();
        let s = cookie.to_str().unwrap();

        assert!(s.starts_with("peppercart_refresh=tok.en.value"));
        assert!(s.contains("Path=/auth"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("SameSite=Lax"));
        assert!(s.contains("Max-Age=604800"));
        assert!(s.contains("Secure"));
    }

    #[test]
    fn test_refresh_cookie_insecure_dev_mode() {
        let cookie = refresh_cookie("t", 60, false).unwrap();
        assert!(!cookie.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let cookie = clear_refresh_cookie(true).unwrap();
        let s = cookie.to_str().unwrap();

        assert!(s.starts_with("peppercart_refresh=;"));
        assert!(s.contains("Max-Age=0"));
        assert!(s.contains("Path=/auth"));
    }

    #[test]
    fn test_refresh_cookie_value_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; peppercart_refresh=abc.def; theme=dark"),
        );

        assert_eq!(refresh_cookie_value(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_refresh_cookie_value_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("other=1"));
        assert!(refresh_cookie_value(&headers).is_none());
        assert!(refresh_cookie_value(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_envelope_includes_access_token_only_on_issuance() {
        let user = sample_user();
        let tokens = IssuedTokens {
            access: "acc".to_owned(),
            refresh: "ref".to_owned(),
        };

        let issued = serde_json::to_value(SessionResponse::issued(&user, &tokens)).unwrap();
        assert_eq!(issued["success"], true);
        assert_eq!(issued["accessToken"], "acc");
        assert_eq!(issued["user"]["email"], "a@x.com");
        // The refresh token never appears anywhere in the body.
        assert!(!issued.to_string().contains("ref\""));

        let read = serde_json::to_value(SessionResponse::read(&user)).unwrap();
        assert!(read.get("accessToken").is_none());
    }
}
