use std::collections::BTreeSet;

use shared::{domain::EntityId, error::StoreError};

use super::*;
use crate::{
    fetch::FetchState,
    test_support::{entity, user, MemoryStore, StaticAuth},
};

const COLLECTION: &str = "productos";

async fn loaded_view(store: &MemoryStore, record: Entity) -> EntityFetchStateMachine {
    let id = record.id.clone();
    store.insert(COLLECTION, record).await;
    let mut view = EntityFetchStateMachine::for_id(COLLECTION, id);
    view.refresh(store).await;
    view
}

fn coordinator(
    store: Arc<MemoryStore>,
    auth: Arc<StaticAuth>,
) -> (OptimisticMutationCoordinator, broadcast::Receiver<ClientEvent>) {
    let (tx, rx) = broadcast::channel(16);
    (OptimisticMutationCoordinator::new(store, auth, tx), rx)
}

fn voters(ids: &[&str]) -> BTreeSet<UserId> {
    ids.iter().map(|id| UserId::from(*id)).collect()
}

#[test]
fn repeated_vote_is_a_no_op() {
    let record = entity("p1", 5, &["u1"]);
    assert!(apply_vote(&record, &UserId::from("u1")).is_none());
}

#[test]
fn new_voter_increments_once() {
    let record = entity("p1", 5, &["u1"]);
    let (updated, patch) = apply_vote(&record, &UserId::from("u2")).expect("applies");
    assert_eq!(updated.votes, 6);
    assert_eq!(updated.voters, voters(&["u1", "u2"]));
    assert_eq!(patch.votes, Some(6));
    assert_eq!(patch.voters, Some(voters(&["u1", "u2"])));
    assert!(patch.comments.is_none());
}

#[test]
fn comment_appends_to_a_copy() {
    let record = entity("p1", 0, &[]);
    let (updated, patch) = append_comment(&record, &user("u1", "Alice"), "hola", Utc::now());

    assert!(record.comments.is_empty());
    assert_eq!(updated.comments.len(), 1);
    let comment = &updated.comments[0];
    assert_eq!(comment.author_id, UserId::from("u1"));
    assert_eq!(comment.author_name, "Alice");
    assert_eq!(comment.message, "hola");
    assert_eq!(patch.comments.as_deref(), Some(updated.comments.as_slice()));
    assert!(patch.votes.is_none());
}

#[test]
fn comments_keep_prior_entries_in_order() {
    let mut record = entity("p1", 0, &[]);
    for (author, message) in [("u1", "primero"), ("u2", "segundo")] {
        record = append_comment(&record, &user(author, author), message, Utc::now()).0;
    }
    let before = record.comments.clone();
    let (updated, _) = append_comment(&record, &user("u3", "u3"), "tercero", Utc::now());
    assert_eq!(updated.comments.len(), before.len() + 1);
    assert_eq!(&updated.comments[..before.len()], before.as_slice());
    assert_eq!(updated.comments[2].message, "tercero");
}

#[tokio::test]
async fn vote_writes_partial_update_and_marks_dirty() {
    let store = MemoryStore::new();
    let mut view = loaded_view(&store, entity("p1", 5, &["u1"])).await;
    let (coordinator, mut events) = coordinator(store.clone(), StaticAuth::signed_in("u2", "Bob"));

    let outcome = coordinator.cast_vote(&mut view).await.expect("vote");
    let MutationOutcome::Applied(updated) = outcome else {
        panic!("expected applied outcome");
    };
    assert_eq!(updated.votes, 6);
    assert_eq!(view.entity(), Some(&updated));
    assert!(view.is_dirty());

    let updates = store.updates.lock().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.votes, Some(6));
    assert_eq!(updates[0].1.voters, Some(voters(&["u1", "u2"])));
    drop(updates);

    assert!(matches!(
        events.try_recv(),
        Ok(ClientEvent::EntityMutated { kind: MutationKind::Vote, .. })
    ));

    let stored = store.record(COLLECTION, &updated.id).await.expect("stored");
    assert_eq!(stored.votes, 6);
    // Seeded counts already diverge; they are kept as stored, not rederived.
    assert!(!stored.votes_consistent());
}

#[tokio::test]
async fn voting_twice_changes_votes_at_most_once() {
    let store = MemoryStore::new();
    let mut view = loaded_view(&store, entity("p1", 0, &[])).await;
    let (coordinator, _events) = coordinator(store.clone(), StaticAuth::signed_in("u1", "Alice"));

    coordinator.cast_vote(&mut view).await.expect("first");
    view.refresh(store.as_ref()).await;
    let second = coordinator.cast_vote(&mut view).await.expect("second");

    assert!(matches!(second, MutationOutcome::Unchanged(ref e) if e.votes == 1));
    assert_eq!(store.updates.lock().await.len(), 1);
    let stored = store
        .record(COLLECTION, &EntityId::from("p1"))
        .await
        .expect("stored");
    assert_eq!(stored.votes, 1);
    assert_eq!(stored.voters, voters(&["u1"]));
    assert!(stored.votes_consistent());
}

#[tokio::test]
async fn signed_out_users_are_sent_to_login() {
    let store = MemoryStore::new();
    let mut view = loaded_view(&store, entity("p1", 0, &[])).await;
    let (coordinator, _events) = coordinator(store.clone(), StaticAuth::signed_out());

    assert_eq!(
        coordinator.cast_vote(&mut view).await.expect("vote"),
        MutationOutcome::LoginRequired
    );
    assert_eq!(
        coordinator.add_comment(&mut view, "hola").await.expect("comment"),
        MutationOutcome::LoginRequired
    );
    assert!(store.updates.lock().await.is_empty());
    assert!(!view.is_dirty());
}

#[tokio::test]
async fn mutation_without_loaded_entity_fails() {
    let store = MemoryStore::new();
    let mut view = EntityFetchStateMachine::for_id(COLLECTION, EntityId::from("p1"));
    let (coordinator, _events) = coordinator(store, StaticAuth::signed_in("u1", "Alice"));

    let err = coordinator.cast_vote(&mut view).await.expect_err("not loaded");
    assert!(matches!(err, ClientError::EntityNotLoaded));
}

#[tokio::test]
async fn comment_writes_the_full_list() {
    let store = MemoryStore::new();
    let mut view = loaded_view(&store, entity("p1", 0, &[])).await;
    let (coordinator, _events) = coordinator(store.clone(), StaticAuth::signed_in("u1", "Alice"));

    let outcome = coordinator
        .add_comment(&mut view, "hola")
        .await
        .expect("comment");
    let MutationOutcome::Applied(updated) = outcome else {
        panic!("expected applied outcome");
    };
    assert_eq!(updated.comments.len(), 1);
    assert_eq!(updated.comments[0].author_name, "Alice");

    let updates = store.updates.lock().await;
    assert_eq!(updates[0].1.comments.as_ref().map(Vec::len), Some(1));
    assert!(updates[0].1.votes.is_none());
}

#[tokio::test]
async fn failed_write_rolls_back_and_posts_a_notice() {
    let store = MemoryStore::new();
    let mut view = loaded_view(&store, entity("p1", 5, &["u1"])).await;
    store
        .fail_updates(StoreError::Unavailable("offline".into()))
        .await;
    let (coordinator, mut events) = coordinator(store.clone(), StaticAuth::signed_in("u2", "Bob"));

    let err = coordinator.cast_vote(&mut view).await.expect_err("write fails");
    assert!(matches!(
        err,
        ClientError::StoreWrite {
            kind: MutationKind::Vote,
            ..
        }
    ));
    assert_eq!(view.entity().map(|e| e.votes), Some(5));
    assert!(!view.is_dirty());
    assert!(matches!(events.try_recv(), Ok(ClientEvent::Notice(msg)) if msg.contains("voto")));
}

#[tokio::test]
async fn failed_write_with_refetch_policy_keeps_copy_and_marks_dirty() {
    let store = MemoryStore::new();
    let mut view = loaded_view(&store, entity("p1", 0, &[])).await;
    store
        .fail_updates(StoreError::Unavailable("offline".into()))
        .await;
    let (coordinator, _events) = coordinator(store.clone(), StaticAuth::signed_in("u1", "Alice"));
    let coordinator = coordinator.with_policy(WriteFailurePolicy::Refetch);

    coordinator
        .add_comment(&mut view, "hola")
        .await
        .expect_err("write fails");
    assert_eq!(view.entity().map(|e| e.comments.len()), Some(1));
    assert!(view.is_dirty());

    view.refresh(store.as_ref()).await;
    assert!(matches!(view.state(), FetchState::Loaded(e) if e.comments.is_empty()));
}

#[test]
fn policy_parses_from_config_strings() {
    assert_eq!(
        "Refetch".parse::<WriteFailurePolicy>(),
        Ok(WriteFailurePolicy::Refetch)
    );
    assert_eq!(
        "rollback".parse::<WriteFailurePolicy>(),
        Ok(WriteFailurePolicy::Rollback)
    );
    assert_eq!(
        " REFETCH ".parse::<WriteFailurePolicy>(),
        Ok(WriteFailurePolicy::Refetch)
    );
    assert!("retry".parse::<WriteFailurePolicy>().is_err());
}
