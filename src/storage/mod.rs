//! Persistence for accounts, demo resources and the refresh-token deny-list.
//!
//! Handlers only see `Arc<dyn Store>`. Two backends exist:
//!
//! - [`PgStore`]: `sqlx` + PostgreSQL, schema in `sql/schema.sql`. Category deletes
//!   cascade through the foreign key.
//! - [`MemoryStore`]: `RwLock`-guarded maps for local development and tests.
//!
//! Both backends give read-your-writes on the deny-list, which is what keeps a
//! logged-out refresh token from being reused.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub type UserId = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Outcome when inserting a user; emails are unique regardless of active state.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    Conflict,
}

/// Outcome of a dummy insert. `MissingCategory` means a referenced category
/// was gone by the time of the write; nothing was stored.
#[derive(Debug)]
pub enum CreateDummiesOutcome {
    Created(Vec<Dummy>),
    MissingCategory(i64),
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub label: String,
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Dummy {
    pub id: i64,
    pub label: String,
    pub description: String,
    /// Id of the owning category.
    pub category: i64,
}

#[derive(Clone, Debug)]
pub struct NewDummy {
    pub label: String,
    pub description: String,
    pub category: i64,
}

/// A refresh token placed on the deny-list by logout.
#[derive(Clone, Debug)]
pub struct RevokedToken {
    pub jti: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity check used by `/health`.
    async fn ping(&self) -> Result<()>;

    async fn create_user(&self, user: NewUser) -> Result<CreateUserOutcome>;
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Flip `is_active` from false to true. Returns `false` if the user is
    /// missing or already active.
    async fn activate_user(&self, id: UserId) -> Result<bool>;
    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<()>;
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()>;

    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn create_category(&self, label: &str) -> Result<Category>;
    async fn category_exists(&self, id: i64) -> Result<bool>;
    /// Delete a category and every dummy that references it.
    async fn delete_category(&self, id: i64) -> Result<bool>;

    /// Dummies ordered by id (insertion order).
    async fn list_dummies(&self) -> Result<Vec<Dummy>>;
    async fn get_dummy(&self, id: i64) -> Result<Option<Dummy>>;
    /// Persist already validated dummies, returning them in input order.
    async fn create_dummies(&self, dummies: Vec<NewDummy>) -> Result<CreateDummiesOutcome>;
    async fn delete_dummy(&self, id: i64) -> Result<bool>;

    /// Insert into the deny-list, dropping entries whose token has expired.
    /// Returns `false` when the `jti` was already there.
    async fn revoke_token(&self, token: RevokedToken) -> Result<bool>;
    async fn is_token_revoked(&self, jti: &str) -> Result<bool>;
}

/// Build a store from a DSN: `memory://` or `postgres://…`.
///
/// # Errors
/// Returns an error for unsupported schemes or when the database is unreachable.
pub async fn connect(dsn: &str) -> Result<Arc<dyn Store>> {
    let scheme = dsn
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| anyhow!("DSN must include a scheme"))?;

    match scheme {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "postgres" | "postgresql" => {
            let store = PgStore::connect(dsn)
                .await
                .context("Failed to connect to database")?;
            Ok(Arc::new(store))
        }
        other => Err(anyhow!("Unsupported DSN scheme: {other}")),
    }
}
