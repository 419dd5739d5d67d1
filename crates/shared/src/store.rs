//! Contracts for the collaborators the client core talks to.

use async_trait::async_trait;

use crate::{
    domain::{AuthUser, Entity, EntityId, EntityPatch, NewEntity},
    error::{AuthError, StoreError},
};

/// Source of truth for catalog records.
#[async_trait]
pub trait RemoteEntityStore: Send + Sync {
    /// `Ok(None)` when the record does not exist.
    async fn get(&self, collection: &str, id: &EntityId) -> Result<Option<Entity>, StoreError>;
    async fn create(&self, collection: &str, record: NewEntity) -> Result<EntityId, StoreError>;
    /// Merges only the keys present in `patch`.
    async fn update(
        &self,
        collection: &str,
        id: &EntityId,
        patch: EntityPatch,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user(&self) -> Option<AuthUser>;
    async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn register(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError>;
    async fn logout(&self);
}
