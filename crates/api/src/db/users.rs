//! `PostgreSQL` implementation of the user store.
//!
//! Queries are runtime-bound (no compile-time checked macros) so the crate
//! builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use peppercart_core::{Email, OrderId, Role, UserId};

use super::{MAX_REFRESH_TOKENS_PER_USER, RepositoryError, UserStore};
use crate::models::{OrderStats, User};

/// Columns shared by every query that materializes a [`User`].
const USER_COLUMNS: &str = "id, email, name, roles, total_amount, order_count, \
     last_order_id, last_order_date, created_at, updated_at";

/// User store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a row to the domain type, validating stored email and role values.
fn user_from_row(row: &PgRow) -> Result<User, RepositoryError> {
    let email_raw: String = row.try_get("email")?;
    let email = Email::parse(&email_raw).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
    })?;

    let roles_raw: Vec<String> = row.try_get("roles")?;
    let roles = roles_raw
        .iter()
        .map(|r| r.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid role in database: {e}")))?;

    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email,
        name: row.try_get("name")?,
        roles,
        stats: OrderStats {
            total_amount: row.try_get::<Decimal, _>("total_amount")?,
            order_count: row.try_get("order_count")?,
            last_order_id: row
                .try_get::<Option<i32>, _>("last_order_id")?
                .map(OrderId::new),
            last_order_date: row.try_get::<Option<DateTime<Utc>>, _>("last_order_date")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Map a unique violation to `Conflict`, everything else to `Database`.
fn map_insert_error(e: sqlx::Error, conflict_msg: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(conflict_msg.to_owned());
    }
    RepositoryError::Database(e)
}

fn roles_to_text(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_owned()).collect()
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(
        &self,
        email: &Email,
        password_hash: &str,
        name: &str,
        roles: &[Role],
    ) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (email, name, password_hash, roles)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(email.as_str())
            .bind(name)
            .bind(password_hash)
            .bind(roles_to_text(roles))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, "email already exists"))?;

        user_from_row(&row)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let user = user_from_row(&row)?;
        let password_hash: String = row.try_get("password_hash")?;

        Ok(Some((user, password_hash)))
    }

    async fn append_fingerprint(
        &self,
        id: UserId,
        fingerprint: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO user_refresh_tokens (user_id, token_hash) VALUES ($1, $2)",
        )
        .bind(id.as_i32())
        .bind(fingerprint)
        .execute(&mut *tx)
        .await?;

        // Evict everything older than the newest MAX_REFRESH_TOKENS_PER_USER rows.
        sqlx::query(
            "DELETE FROM user_refresh_tokens
             WHERE user_id = $1
               AND id NOT IN (
                   SELECT id FROM user_refresh_tokens
                   WHERE user_id = $1
                   ORDER BY created_at DESC, id DESC
                   LIMIT $2
               )",
        )
        .bind(id.as_i32())
        .bind(MAX_REFRESH_TOKENS_PER_USER)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn remove_fingerprint(
        &self,
        id: UserId,
        fingerprint: &str,
    ) -> Result<bool, RepositoryError> {
        // Single conditional delete: of two concurrent consumers of the same
        // token, exactly one sees rows_affected == 1.
        let result = sqlx::query(
            "DELETE FROM user_refresh_tokens WHERE user_id = $1 AND token_hash = $2",
        )
        .bind(id.as_i32())
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&str>,
        email: Option<&Email>,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users
             SET name = COALESCE($2, name),
                 email = COALESCE($3, email),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i32())
            .bind(name)
            .bind(email.map(Email::as_str))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, "email already exists"))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_roles(&self, id: UserId, roles: &[Role]) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users SET roles = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i32())
            .bind(roles_to_text(roles))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn update_order_stats(
        &self,
        id: UserId,
        stats: &OrderStats,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users
             SET total_amount = $2,
                 order_count = $3,
                 last_order_id = $4,
                 last_order_date = $5,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(stats.total_amount)
        .bind(stats.order_count)
        .bind(stats.last_order_id.map(|o| o.as_i32()))
        .bind(stats.last_order_date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
