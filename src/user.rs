//! User entity, repository seam and user service
//!
//! The service owns the update path that feeds the saga: it pre-reads the
//! old record so the workflow has a compensation payload, submits the
//! update to the orchestrator, and persists the new record only once the
//! workflow completed. Reads and deletes never involve the workflow host.

use crate::error::{OrchestratorError, Result};
use crate::orchestrator::WorkflowOrchestrator;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A user record as carried through the saga
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            address: address.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage seam for user records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;
    async fn get_by_id(&self, id: &str) -> Result<User>;
    async fn update(&self, user: &User) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<User>>;
}

/// In-process user store
///
/// Listing is ordered by creation time, then id, so pagination is stable.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(OrchestratorError::Conflict(format!(
                "user {} already exists",
                user.id
            )));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<User> {
        let users = self.users.read().await;
        users
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("user {id}")))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                let mut updated = user.clone();
                updated.created_at = existing.created_at;
                updated.updated_at = Utc::now();
                *existing = updated;
                Ok(())
            }
            None => Err(OrchestratorError::NotFound(format!("user {}", user.id))),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut users = self.users.write().await;
        users
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OrchestratorError::NotFound(format!("user {id}")))
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<User>> {
        let users = self.users.read().await;
        let mut all: Vec<User> = users.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }
}

/// User operations over the repository, with the orchestrated update path
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    orchestrator: Arc<dyn WorkflowOrchestrator>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, orchestrator: Arc<dyn WorkflowOrchestrator>) -> Self {
        Self { repo, orchestrator }
    }

    pub async fn create_user(&self, user: &User) -> Result<()> {
        self.repo.create(user).await
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<User> {
        self.repo.get_by_id(id).await
    }

    /// Update a user through the saga
    ///
    /// The old record is read first so the workflow carries a compensation
    /// payload; the new record is persisted only after the workflow
    /// completed.
    pub async fn update_user(&self, ctx: &CancellationToken, user: &User) -> Result<()> {
        let old_user = self.repo.get_by_id(&user.id).await?;
        debug!(user_id = %user.id, "captured pre-update snapshot");

        self.orchestrator
            .execute_user_update(ctx, &old_user, user)
            .await?;

        self.repo.update(user).await?;
        info!(user_id = %user.id, "user update persisted");
        Ok(())
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.repo.delete(id).await
    }

    pub async fn list_users(&self, offset: usize, limit: usize) -> Result<Vec<User>> {
        self.repo.list(offset, limit).await
    }
}
