use std::sync::Arc;

use shared::{
    domain::{EntityId, DEFAULT_COLLECTION},
    store::{AuthProvider, RemoteEntityStore},
};
use storage::Storage;
use tokio::sync::broadcast;

pub mod auth;
pub mod error;
pub mod fetch;
pub mod flows;
pub mod form;
pub mod http;
pub mod mutation;
pub mod upload;
pub mod validation;

pub use auth::LocalAuthProvider;
pub use error::{ClientError, FormError};
pub use fetch::{EntityFetchStateMachine, FetchState, FetchTicket};
pub use flows::{EntityPage, GatedForm, Navigation};
pub use form::{FormState, FormStore, SubmissionController, SubmitEvent, SubmitOutcome};
pub use http::HttpBackend;
pub use mutation::{
    MutationKind, MutationOutcome, OptimisticMutationCoordinator, WriteFailurePolicy,
};
pub use upload::{DownloadUrlResolver, ImageUpload, StaticUrlResolver, UploadEvent, UploadState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    EntityMutated {
        entity_id: EntityId,
        kind: MutationKind,
    },
    /// Transient message for the user, e.g. a failed store write.
    Notice(String),
}

/// Explicitly constructed backend handles shared by every form and view.
#[derive(Clone)]
pub struct CatalogContext {
    store: Arc<dyn RemoteEntityStore>,
    auth: Arc<dyn AuthProvider>,
    collection: String,
    write_failure_policy: WriteFailurePolicy,
    events: broadcast::Sender<ClientEvent>,
}

impl CatalogContext {
    pub fn new(store: Arc<dyn RemoteEntityStore>, auth: Arc<dyn AuthProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            auth,
            collection: DEFAULT_COLLECTION.to_string(),
            write_failure_policy: WriteFailurePolicy::default(),
            events,
        }
    }

    /// Store and credentials both backed by one local database.
    pub fn local(storage: Storage) -> Self {
        let auth = Arc::new(LocalAuthProvider::new(storage.clone()));
        Self::new(Arc::new(storage), auth)
    }

    /// Store and credentials both served by one HTTP backend.
    pub fn remote(backend: HttpBackend) -> Self {
        let backend = Arc::new(backend);
        Self::new(backend.clone(), backend)
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_write_failure_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.write_failure_policy = policy;
        self
    }

    pub fn store(&self) -> Arc<dyn RemoteEntityStore> {
        Arc::clone(&self.store)
    }

    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.auth)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn coordinator(&self) -> OptimisticMutationCoordinator {
        OptimisticMutationCoordinator::new(self.store(), self.auth(), self.events.clone())
            .with_policy(self.write_failure_policy)
    }

    pub fn login_form(&self) -> flows::LoginForm {
        flows::login_form(self.auth())
    }

    pub fn account_form(&self) -> flows::AccountForm {
        flows::account_form(self.auth())
    }

    pub fn new_entity_form(&self, upload: ImageUpload) -> flows::NewEntityForm {
        flows::new_entity_form(self.store(), self.auth(), self.collection.clone(), upload)
    }

    pub fn entity_page(&self, id: EntityId) -> EntityPage {
        EntityPage::new(
            self.store(),
            Arc::new(self.coordinator()),
            self.collection.clone(),
            id,
        )
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
