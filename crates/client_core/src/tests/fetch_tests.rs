use super::*;
use crate::test_support::{entity, MemoryStore};

const COLLECTION: &str = "productos";

#[test]
fn starts_uninitialized_without_id() {
    let mut machine = EntityFetchStateMachine::new(COLLECTION);
    assert_eq!(machine.state(), &FetchState::Uninitialized);
    assert!(machine.begin_fetch().is_none());
}

#[tokio::test]
async fn missing_id_ends_in_not_found() {
    let store = MemoryStore::new();
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("missing"));

    let (ticket, id) = machine.begin_fetch().expect("fetch starts");
    assert_eq!(machine.state(), &FetchState::Loading);
    let result = store.get(COLLECTION, &id).await;
    assert!(machine.complete(ticket, result));

    assert_eq!(machine.state(), &FetchState::NotFound);
    assert!(machine.entity().is_none());

    // Terminal for this id, even when marked dirty.
    machine.mark_dirty();
    assert!(machine.begin_fetch().is_none());
}

#[tokio::test]
async fn existing_record_is_loaded() {
    let store = MemoryStore::new();
    store.insert(COLLECTION, entity("p1", 2, &["a", "b"])).await;
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));

    let state = machine.refresh(store.as_ref()).await;
    assert!(matches!(state, FetchState::Loaded(e) if e.votes == 2));
    assert_eq!(store.get_count(), 1);

    // Clean cache does not refetch.
    machine.refresh(store.as_ref()).await;
    assert_eq!(store.get_count(), 1);
}

#[tokio::test]
async fn dirty_cache_forces_a_refetch() {
    let store = MemoryStore::new();
    store.insert(COLLECTION, entity("p1", 0, &[])).await;
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));
    machine.refresh(store.as_ref()).await;

    store.insert(COLLECTION, entity("p1", 3, &[])).await;
    machine.mark_dirty();
    let (ticket, id) = machine.begin_fetch().expect("dirty refetch");
    assert_eq!(machine.state(), &FetchState::Loading);
    assert!(!machine.is_dirty());
    machine.complete(ticket, store.get(COLLECTION, &id).await);

    assert_eq!(machine.entity().map(|e| e.votes), Some(3));
}

#[tokio::test]
async fn only_one_fetch_in_flight() {
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));
    assert!(machine.begin_fetch().is_some());
    machine.mark_dirty();
    assert!(machine.begin_fetch().is_none());
    assert!(machine.is_fetch_pending());
}

#[tokio::test]
async fn store_failure_is_an_error_until_retry() {
    let store = MemoryStore::new();
    store.insert(COLLECTION, entity("p1", 0, &[])).await;
    store
        .fail_gets(Some(StoreError::Unavailable("offline".into())))
        .await;
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));

    machine.refresh(store.as_ref()).await;
    assert!(matches!(machine.state(), FetchState::Error(msg) if msg.contains("offline")));
    assert!(machine.begin_fetch().is_none());

    store.fail_gets(None).await;
    machine.retry();
    machine.refresh(store.as_ref()).await;
    assert!(machine.entity().is_some());
}

#[test]
fn results_for_a_previous_id_are_discarded() {
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));
    let (stale, _) = machine.begin_fetch().expect("fetch starts");

    machine.set_id(Some(EntityId::from("p2")));
    assert!(!machine.complete(stale, Ok(Some(entity("p1", 1, &[])))));
    assert_eq!(machine.state(), &FetchState::Uninitialized);
    assert!(machine.begin_fetch().is_some());
}

#[test]
fn results_after_unmount_are_discarded() {
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));
    let (ticket, _) = machine.begin_fetch().expect("fetch starts");
    machine.unmount();
    assert!(!machine.complete(ticket, Ok(Some(entity("p1", 1, &[])))));
    assert_eq!(machine.state(), &FetchState::Loading);
}

#[test]
fn local_writes_only_replace_the_loaded_entity() {
    let mut machine = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));
    assert!(!machine.apply_local(entity("p1", 9, &[])));

    let (ticket, _) = machine.begin_fetch().expect("fetch starts");
    machine.complete(ticket, Ok(Some(entity("p1", 1, &[]))));
    assert!(!machine.apply_local(entity("other", 9, &[])));
    assert!(machine.apply_local(entity("p1", 9, &[])));
    assert_eq!(machine.entity().map(|e| e.votes), Some(9));
}
