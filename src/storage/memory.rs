//! In-process store used by `memory://` and the test suite.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    Category, CreateDummiesOutcome, CreateUserOutcome, Dummy, NewDummy, NewUser, RevokedToken,
    Store, User, UserId,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    categories: BTreeMap<i64, Category>,
    dummies: BTreeMap<i64, Dummy>,
    revoked: HashMap<String, RevokedToken>,
    next_user_id: i64,
    next_category_id: i64,
    next_dummy_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<CreateUserOutcome> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Ok(CreateUserOutcome::Conflict);
        }
        let id = Tables::next_id(&mut tables.next_user_id);
        let record = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            is_active: user.is_active,
            is_staff: false,
            last_login: None,
            date_joined: Utc::now(),
        };
        tables.users.insert(id, record.clone());
        Ok(CreateUserOutcome::Created(record))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn activate_user(&self, id: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&id) {
            Some(user) if !user.is_active => {
                user.is_active = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.tables.write().await.users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.tables.read().await.categories.values().cloned().collect())
    }

    async fn create_category(&self, label: &str) -> Result<Category> {
        let mut tables = self.tables.write().await;
        let id = Tables::next_id(&mut tables.next_category_id);
        let category = Category {
            id,
            label: label.to_string(),
        };
        tables.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn category_exists(&self, id: i64) -> Result<bool> {
        Ok(self.tables.read().await.categories.contains_key(&id))
    }

    async fn delete_category(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.categories.remove(&id).is_none() {
            return Ok(false);
        }
        tables.dummies.retain(|_, dummy| dummy.category != id);
        Ok(true)
    }

    async fn list_dummies(&self) -> Result<Vec<Dummy>> {
        Ok(self.tables.read().await.dummies.values().cloned().collect())
    }

    async fn get_dummy(&self, id: i64) -> Result<Option<Dummy>> {
        Ok(self.tables.read().await.dummies.get(&id).cloned())
    }

    async fn create_dummies(&self, dummies: Vec<NewDummy>) -> Result<CreateDummiesOutcome> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = dummies
            .iter()
            .find(|new| !tables.categories.contains_key(&new.category))
        {
            return Ok(CreateDummiesOutcome::MissingCategory(missing.category));
        }
        let mut created = Vec::with_capacity(dummies.len());
        for new in dummies {
            let id = Tables::next_id(&mut tables.next_dummy_id);
            let dummy = Dummy {
                id,
                label: new.label,
                description: new.description,
                category: new.category,
            };
            tables.dummies.insert(id, dummy.clone());
            created.push(dummy);
        }
        Ok(CreateDummiesOutcome::Created(created))
    }

    async fn delete_dummy(&self, id: i64) -> Result<bool> {
        Ok(self.tables.write().await.dummies.remove(&id).is_some())
    }

    async fn revoke_token(&self, token: RevokedToken) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        tables.revoked.retain(|_, revoked| revoked.expires_at > now);
        if tables.revoked.contains_key(&token.jti) {
            return Ok(false);
        }
        tables.revoked.insert(token.jti.clone(), token);
        Ok(true)
    }

    async fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        Ok(self.tables.read().await.revoked.contains_key(jti))
    }
}
