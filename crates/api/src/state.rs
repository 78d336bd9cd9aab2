//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::PgUserStore;
use crate::services::auth::{AuthService, TokenCodec};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; holds the configuration, the database pool,
/// and the token codec built once from the injected secrets.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    store: PgUserStore,
    tokens: TokenCodec,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ApiConfig, pool: PgPool) -> Self {
        let tokens = TokenCodec::new(&config.tokens);
        let store = PgUserStore::new(pool.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                store,
                tokens,
            }),
        }
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the user store.
    #[must_use]
    pub fn store(&self) -> &PgUserStore {
        &self.inner.store
    }

    /// Get a reference to the token codec.
    #[must_use]
    pub fn tokens(&self) -> &TokenCodec {
        &self.inner.tokens
    }

    /// Borrow a session manager over the store and codec.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_, PgUserStore> {
        AuthService::new(
            self.store(),
            self.tokens(),
            &self.config().tokens.refresh_secret,
        )
    }
}
