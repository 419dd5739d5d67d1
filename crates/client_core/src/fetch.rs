//! Loading lifecycle of one remote entity, owned by the view showing it.

use shared::{
    domain::{Entity, EntityId},
    error::StoreError,
    store::RemoteEntityStore,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Uninitialized,
    Loading,
    Loaded(Entity),
    NotFound,
    Error(String),
}

/// Identifies one fetch attempt. Results carrying an outdated ticket are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
}

#[derive(Debug)]
pub struct EntityFetchStateMachine {
    collection: String,
    id: Option<EntityId>,
    state: FetchState,
    dirty: bool,
    in_flight: Option<u64>,
    generation: u64,
    mounted: bool,
}

impl EntityFetchStateMachine {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: None,
            state: FetchState::Uninitialized,
            dirty: false,
            in_flight: None,
            generation: 0,
            mounted: true,
        }
    }

    pub fn for_id(collection: impl Into<String>, id: EntityId) -> Self {
        let mut machine = Self::new(collection);
        machine.set_id(Some(id));
        machine
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> Option<&EntityId> {
        self.id.as_ref()
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn entity(&self) -> Option<&Entity> {
        match &self.state {
            FetchState::Loaded(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_fetch_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    /// A changed id resets the machine and abandons any fetch in flight.
    pub fn set_id(&mut self, id: Option<EntityId>) {
        if self.id == id {
            return;
        }
        self.id = id;
        self.generation += 1;
        self.in_flight = None;
        self.dirty = false;
        self.state = FetchState::Uninitialized;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Allows a new attempt after `Error`.
    pub fn retry(&mut self) {
        if matches!(self.state, FetchState::Error(_)) {
            self.dirty = true;
        }
    }

    /// Enters `Loading` when there is an id, nothing in flight, and the
    /// current state calls for a read.
    pub fn begin_fetch(&mut self) -> Option<(FetchTicket, EntityId)> {
        if !self.mounted || self.in_flight.is_some() {
            return None;
        }
        let id = self.id.clone()?;
        let needs_read = match self.state {
            FetchState::Uninitialized => true,
            FetchState::Loaded(_) | FetchState::Error(_) => self.dirty,
            FetchState::Loading | FetchState::NotFound => false,
        };
        if !needs_read {
            return None;
        }

        self.generation += 1;
        self.in_flight = Some(self.generation);
        self.dirty = false;
        self.state = FetchState::Loading;
        debug!(collection = %self.collection, %id, "fetch started");
        Some((
            FetchTicket {
                generation: self.generation,
            },
            id,
        ))
    }

    /// Applies a store result. Returns `false` when the result was stale.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<Option<Entity>, StoreError>,
    ) -> bool {
        if !self.mounted || self.in_flight != Some(ticket.generation) {
            debug!(collection = %self.collection, "discarding stale fetch result");
            return false;
        }
        self.in_flight = None;
        self.state = match result {
            Ok(Some(entity)) => FetchState::Loaded(entity),
            Ok(None) => FetchState::NotFound,
            Err(err) => {
                warn!(collection = %self.collection, error = %err, "fetch failed");
                FetchState::Error(err.to_string())
            }
        };
        true
    }

    /// Write-through of a locally computed copy. Ignored unless the same
    /// entity is currently loaded.
    pub fn apply_local(&mut self, entity: Entity) -> bool {
        match &mut self.state {
            FetchState::Loaded(current) if current.id == entity.id => {
                *current = entity;
                true
            }
            _ => false,
        }
    }

    /// After unmount no result is applied any more.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.in_flight = None;
        self.generation += 1;
    }

    pub async fn refresh(&mut self, store: &dyn RemoteEntityStore) -> &FetchState {
        if let Some((ticket, id)) = self.begin_fetch() {
            let result = store.get(&self.collection, &id).await;
            self.complete(ticket, result);
        }
        &self.state
    }
}

#[cfg(test)]
#[path = "tests/fetch_tests.rs"]
mod tests;
