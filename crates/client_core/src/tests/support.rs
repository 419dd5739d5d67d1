use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{AuthUser, Creator, Entity, EntityId, EntityPatch, NewEntity, UserId},
    error::{AuthError, StoreError},
    store::{AuthProvider, RemoteEntityStore},
};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, EntityId), Entity>>,
    fail_updates_with: Mutex<Option<StoreError>>,
    fail_gets_with: Mutex<Option<StoreError>>,
    pub updates: Mutex<Vec<(EntityId, EntityPatch)>>,
    pub gets: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, collection: &str, entity: Entity) {
        self.records
            .lock()
            .await
            .insert((collection.to_string(), entity.id.clone()), entity);
    }

    pub async fn record(&self, collection: &str, id: &EntityId) -> Option<Entity> {
        self.records
            .lock()
            .await
            .get(&(collection.to_string(), id.clone()))
            .cloned()
    }

    pub async fn fail_updates(&self, err: StoreError) {
        *self.fail_updates_with.lock().await = Some(err);
    }

    pub async fn fail_gets(&self, err: Option<StoreError>) {
        *self.fail_gets_with.lock().await = err;
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteEntityStore for MemoryStore {
    async fn get(&self, collection: &str, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_gets_with.lock().await.clone() {
            return Err(err);
        }
        Ok(self.record(collection, id).await)
    }

    async fn create(&self, collection: &str, record: NewEntity) -> Result<EntityId, StoreError> {
        let id = EntityId::generate();
        self.insert(collection, Entity::from_new(id.clone(), record))
            .await;
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &EntityId,
        patch: EntityPatch,
    ) -> Result<(), StoreError> {
        if let Some(err) = self.fail_updates_with.lock().await.clone() {
            return Err(err);
        }
        let mut records = self.records.lock().await;
        let Some(entity) = records.get_mut(&(collection.to_string(), id.clone())) else {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };
        entity.apply_patch(&patch);
        self.updates.lock().await.push((id.clone(), patch));
        Ok(())
    }
}

pub struct StaticAuth {
    current: Mutex<Option<AuthUser>>,
    accounts: Vec<(String, String, AuthUser)>,
}

impl StaticAuth {
    pub fn signed_in(uid: &str, display_name: &str) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Some(user(uid, display_name))),
            accounts: Vec::new(),
        })
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
            accounts: Vec::new(),
        })
    }

    pub fn with_account(email: &str, password: &str, account: AuthUser) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
            accounts: vec![(email.to_string(), password.to_string(), account)],
        })
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        self.current.lock().await.clone()
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let account = self
            .accounts
            .iter()
            .find(|(e, p, _)| e == email && p == password)
            .map(|(_, _, account)| account.clone())
            .ok_or_else(AuthError::invalid_credentials)?;
        *self.current.lock().await = Some(account.clone());
        Ok(account)
    }

    async fn register(
        &self,
        display_name: &str,
        _email: &str,
        _password: &str,
    ) -> Result<AuthUser, AuthError> {
        let account = user(&format!("uid-{display_name}"), display_name);
        *self.current.lock().await = Some(account.clone());
        Ok(account)
    }

    async fn logout(&self) {
        *self.current.lock().await = None;
    }
}

pub fn user(uid: &str, display_name: &str) -> AuthUser {
    AuthUser {
        uid: UserId::from(uid),
        display_name: display_name.to_string(),
    }
}

pub fn entity(id: &str, votes: u64, voters: &[&str]) -> Entity {
    Entity {
        id: EntityId::from(id),
        name: "Widget".into(),
        company: "Acme".into(),
        url: "https://acme.test".into(),
        description: "rocket skates".into(),
        image_url: String::new(),
        votes,
        voters: voters.iter().map(|v| UserId::from(*v)).collect::<BTreeSet<_>>(),
        comments: Vec::new(),
        created_at: Utc::now(),
        creator: Creator {
            id: UserId::from("owner"),
            display_name: "Owner".into(),
        },
    }
}
