//! User domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use peppercart_core::{Email, OrderId, Role, UserId};

/// A registered user (domain type).
///
/// Deliberately does not implement `Serialize`: responses go through
/// [`UserPublic`], so the password hash and refresh-token fingerprints can
/// never leak through an accidental serialization. The hash itself lives only
/// in the credential-lookup path of the store.
#[derive(Debug, Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address (unique).
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Role set; non-empty, defaults to `[customer]`.
    pub roles: Vec<Role>,
    /// Denormalized order statistics, written by the order subsystem.
    pub stats: OrderStats,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the user's role set contains `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Denormalized order statistics.
///
/// Owned by the order aggregation process, which recomputes them after each
/// order mutation via [`crate::db::UserStore::update_order_stats`]. The auth
/// core never writes these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderStats {
    /// Lifetime order total.
    pub total_amount: Decimal,
    /// Number of orders placed.
    pub order_count: i32,
    /// Most recent order, if any.
    pub last_order_id: Option<OrderId>,
    /// When the most recent order was placed.
    pub last_order_date: Option<DateTime<Utc>>,
}

/// Public projection of a user for response payloads.
///
/// The only user shape that crosses the response boundary.
#[derive(Debug, Clone, Serialize)]
pub struct UserPublic {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Role set.
    pub roles: Vec<Role>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            roles: user.roles.clone(),
        }
    }
}

/// Allow-listed profile mutation.
///
/// Only `name` and `email` are mutable through the profile path; any other
/// field in the request body is rejected at deserialization. Role changes go
/// through the separate admin-only operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    /// New display name, if changing.
    pub name: Option<String>,
    /// New email address, if changing.
    pub email: Option<String>,
}

impl ProfilePatch {
    /// Whether the patch carries no changes at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: UserId::new(1),
            email: Email::parse("a@x.com").unwrap(),
            name: "A".to_owned(),
            roles: vec![Role::Customer],
            stats: OrderStats::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_public_projection_fields() {
        let user = sample_user();
        let public = UserPublic::from(&user);
        let json = serde_json::to_value(&public).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["email"], "a@x.com");
        assert_eq!(json["roles"], serde_json::json!(["customer"]));
        // Nothing beyond the four public fields is serialized.
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_has_role() {
        let mut user = sample_user();
        assert!(user.has_role(Role::Customer));
        assert!(!user.has_role(Role::Admin));

        user.roles.push(Role::Admin);
        assert!(user.has_role(Role::Admin));
    }

    #[test]
    fn test_profile_patch_rejects_unknown_fields() {
        let err = serde_json::from_str::<ProfilePatch>(r#"{"roles": ["admin"]}"#);
        assert!(err.is_err());

        let ok: ProfilePatch = serde_json::from_str(r#"{"name": "B"}"#).unwrap();
        assert_eq!(ok.name.as_deref(), Some("B"));
        assert!(ok.email.is_none());
    }

    #[test]
    fn test_profile_patch_is_empty() {
        let empty: ProfilePatch = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }
}
