//! PostgreSQL store. Schema lives in `sql/schema.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;

use super::{
    Category, CreateDummiesOutcome, CreateUserOutcome, Dummy, NewDummy, NewUser, RevokedToken,
    Store, User, UserId,
};

const USER_COLUMNS: &str =
    "id, email, password_hash, is_active, is_staff, last_login, date_joined";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool and verify the database answers.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be created or the first query fails.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPool::connect(dsn)
            .await
            .context("Failed to create database pool")?;
        Ok(Self::from_pool(pool))
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        last_login: row.get("last_login"),
        date_joined: row.get("date_joined"),
    }
}

fn dummy_from_row(row: &PgRow) -> Dummy {
    Dummy {
        id: row.get("id"),
        label: row.get("label"),
        description: row.get("description"),
        category: row.get("category_id"),
    }
}

fn has_sqlstate(err: &sqlx::Error, sqlstate: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == sqlstate),
        _ => false,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_sqlstate(err, "23503")
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("database ping failed")?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<CreateUserOutcome> {
        let query = format!(
            "INSERT INTO users (email, password_hash, is_active) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        let result = sqlx::query(&query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.is_active)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await;

        match result {
            Ok(row) => Ok(CreateUserOutcome::Created(user_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn activate_user(&self, id: UserId) -> Result<bool> {
        // Conditional update so concurrent verifications flip the flag once.
        let query = "UPDATE users SET is_active = TRUE WHERE id = $1 AND is_active = FALSE";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to activate user")?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update password")?;
        Ok(())
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        let query = "UPDATE users SET last_login = $2 WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to record login")?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let query = "SELECT id, label FROM categories ORDER BY id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list categories")?;
        Ok(rows
            .iter()
            .map(|row| Category {
                id: row.get("id"),
                label: row.get("label"),
            })
            .collect())
    }

    async fn create_category(&self, label: &str) -> Result<Category> {
        let query = "INSERT INTO categories (label) VALUES ($1) RETURNING id, label";
        let row = sqlx::query(query)
            .bind(label)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert category")?;
        Ok(Category {
            id: row.get("id"),
            label: row.get("label"),
        })
    }

    async fn category_exists(&self, id: i64) -> Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1) AS found";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup category")?;
        Ok(row.get("found"))
    }

    async fn delete_category(&self, id: i64) -> Result<bool> {
        // dummies.category_id is ON DELETE CASCADE
        let query = "DELETE FROM categories WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete category")?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_dummies(&self) -> Result<Vec<Dummy>> {
        let query = "SELECT id, label, description, category_id FROM dummies ORDER BY id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list dummies")?;
        Ok(rows.iter().map(dummy_from_row).collect())
    }

    async fn get_dummy(&self, id: i64) -> Result<Option<Dummy>> {
        let query = "SELECT id, label, description, category_id FROM dummies WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup dummy")?;
        Ok(row.as_ref().map(dummy_from_row))
    }

    async fn create_dummies(&self, dummies: Vec<NewDummy>) -> Result<CreateDummiesOutcome> {
        // Batch creates are all-or-nothing; dropping `tx` rolls back.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin dummy transaction")?;

        let query = r"
            INSERT INTO dummies (label, description, category_id)
            VALUES ($1, $2, $3)
            RETURNING id, label, description, category_id
        ";
        let mut created = Vec::with_capacity(dummies.len());
        for dummy in dummies {
            let result = sqlx::query(query)
                .bind(&dummy.label)
                .bind(&dummy.description)
                .bind(dummy.category)
                .fetch_one(&mut *tx)
                .instrument(query_span("INSERT", query))
                .await;
            match result {
                Ok(row) => created.push(dummy_from_row(&row)),
                Err(err) if is_foreign_key_violation(&err) => {
                    return Ok(CreateDummiesOutcome::MissingCategory(dummy.category));
                }
                Err(err) => return Err(err).context("failed to insert dummy"),
            }
        }

        tx.commit().await.context("commit dummy transaction")?;
        Ok(CreateDummiesOutcome::Created(created))
    }

    async fn delete_dummy(&self, id: i64) -> Result<bool> {
        let query = "DELETE FROM dummies WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete dummy")?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_token(&self, token: RevokedToken) -> Result<bool> {
        let prune = "DELETE FROM revoked_tokens WHERE expires_at <= NOW()";
        let pruned = sqlx::query(prune)
            .execute(&self.pool)
            .instrument(query_span("DELETE", prune))
            .await
            .context("failed to prune revoked tokens")?;
        if pruned.rows_affected() > 0 {
            tracing::debug!(rows = pruned.rows_affected(), "pruned expired revoked tokens");
        }

        let query = r"
            INSERT INTO revoked_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(&token.jti)
            .bind(token.user_id)
            .bind(token.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to revoke token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        let query = "SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE jti = $1) AS found";
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check revoked token")?;
        Ok(row.get("found"))
    }
}
