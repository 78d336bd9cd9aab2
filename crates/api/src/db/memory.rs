//! In-memory user store for unit tests.
//!
//! Mirrors the `PostgreSQL` store's contract, including the conditional
//! fingerprint removal and the per-user fingerprint cap, so the session
//! manager and guard can be exercised without a database.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use peppercart_core::{Email, Role, UserId};

use super::{MAX_REFRESH_TOKENS_PER_USER, RepositoryError, UserStore};
use crate::models::{OrderStats, User};

#[derive(Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
    fingerprints: Vec<String>,
}

/// In-memory [`UserStore`] implementation.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<HashMap<i32, StoredUser>>,
    next_id: Mutex<i32>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored fingerprints for a user (test inspection).
    pub fn fingerprint_count(&self, id: UserId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .get(&id.as_i32())
            .map_or(0, |s| s.fingerprints.len())
    }

    /// Remove a user entirely (simulates account deletion between token
    /// issuance and use).
    pub fn delete_user(&self, id: UserId) {
        self.inner.lock().unwrap().remove(&id.as_i32());
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(
        &self,
        email: &Email,
        password_hash: &str,
        name: &str,
        roles: &[Role],
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.values().any(|s| s.user.email == *email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(*next_id),
            email: email.clone(),
            name: name.to_owned(),
            roles: roles.to_vec(),
            stats: OrderStats::default(),
            created_at: now,
            updated_at: now,
        };

        inner.insert(
            user.id.as_i32(),
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_owned(),
                fingerprints: Vec::new(),
            },
        );

        Ok(user)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .values()
            .find(|s| s.user.email == *email)
            .map(|s| s.user.clone()))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.get(&id.as_i32()).map(|s| s.user.clone()))
    }

    async fn credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .values()
            .find(|s| s.user.email == *email)
            .map(|s| (s.user.clone(), s.password_hash.clone())))
    }

    async fn append_fingerprint(
        &self,
        id: UserId,
        fingerprint: &str,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .get_mut(&id.as_i32())
            .ok_or(RepositoryError::NotFound)?;

        stored.fingerprints.push(fingerprint.to_owned());

        // Same eviction as the Postgres store: newest N kept, oldest dropped.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cap = MAX_REFRESH_TOKENS_PER_USER as usize;
        while stored.fingerprints.len() > cap {
            stored.fingerprints.remove(0);
        }

        Ok(())
    }

    async fn remove_fingerprint(
        &self,
        id: UserId,
        fingerprint: &str,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(stored) = inner.get_mut(&id.as_i32()) else {
            return Ok(false);
        };

        let before = stored.fingerprints.len();
        if let Some(pos) = stored.fingerprints.iter().position(|f| f == fingerprint) {
            stored.fingerprints.remove(pos);
        }

        Ok(stored.fingerprints.len() < before)
    }

    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&str>,
        email: Option<&Email>,
    ) -> Result<Option<User>, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(new_email) = email
            && inner
                .values()
                .any(|s| s.user.email == *new_email && s.user.id != id)
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let Some(stored) = inner.get_mut(&id.as_i32()) else {
            return Ok(None);
        };

        if let Some(name) = name {
            stored.user.name = name.to_owned();
        }
        if let Some(email) = email {
            stored.user.email = email.clone();
        }
        stored.user.updated_at = Utc::now();

        Ok(Some(stored.user.clone()))
    }

    async fn set_roles(&self, id: UserId, roles: &[Role]) -> Result<Option<User>, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(stored) = inner.get_mut(&id.as_i32()) else {
            return Ok(None);
        };

        stored.user.roles = roles.to_vec();
        stored.user.updated_at = Utc::now();

        Ok(Some(stored.user.clone()))
    }

    async fn update_order_stats(
        &self,
        id: UserId,
        stats: &OrderStats,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .get_mut(&id.as_i32())
            .ok_or(RepositoryError::NotFound)?;

        stored.user.stats = stats.clone();
        stored.user.updated_at = Utc::now();

        Ok(())
    }
}
