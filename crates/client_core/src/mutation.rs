//! Optimistic vote/comment mutations.
//!
//! The local cache is updated before the store confirms. The read-modify-write
//! against the store is not atomic: two clients voting from the same stale
//! copy both write `votes + 1`, and two clients commenting concurrently each
//! write a full list, so one of the comments is lost.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use shared::{
    domain::{AuthUser, Comment, Entity, EntityPatch, UserId},
    store::{AuthProvider, RemoteEntityStore},
};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::{error::ClientError, fetch::EntityFetchStateMachine, ClientEvent};

/// What happens to the optimistic local copy when the store write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Restore the copy the mutation started from.
    #[default]
    Rollback,
    /// Keep the local copy and force the next read to go to the store.
    Refetch,
}

impl std::str::FromStr for WriteFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rollback" => Ok(Self::Rollback),
            "refetch" => Ok(Self::Refetch),
            other => Err(format!("unknown write failure policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Vote,
    Comment,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vote => f.write_str("vote"),
            Self::Comment => f.write_str("comment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied locally and accepted by the store.
    Applied(Entity),
    /// Nothing to do, e.g. a repeated vote.
    Unchanged(Entity),
    /// No signed-in user; the caller should send them to login.
    LoginRequired,
}

/// Adds `user_id` as a voter. `None` when they already voted.
pub fn apply_vote(entity: &Entity, user_id: &UserId) -> Option<(Entity, EntityPatch)> {
    if entity.has_voted(user_id) {
        return None;
    }
    let mut updated = entity.clone();
    updated.votes = entity.votes + 1;
    updated.voters.insert(user_id.clone());
    let patch = EntityPatch {
        votes: Some(updated.votes),
        voters: Some(updated.voters.clone()),
        comments: None,
    };
    Some((updated, patch))
}

/// Appends to a copy of the comment list; the patch carries the whole list.
pub fn append_comment(
    entity: &Entity,
    author: &AuthUser,
    message: &str,
    timestamp: DateTime<Utc>,
) -> (Entity, EntityPatch) {
    let mut comments = entity.comments.clone();
    comments.push(Comment {
        author_id: author.uid.clone(),
        author_name: author.display_name.clone(),
        message: message.to_string(),
        timestamp,
    });
    let mut updated = entity.clone();
    updated.comments = comments.clone();
    let patch = EntityPatch {
        comments: Some(comments),
        ..EntityPatch::default()
    };
    (updated, patch)
}

pub struct OptimisticMutationCoordinator {
    store: Arc<dyn RemoteEntityStore>,
    auth: Arc<dyn AuthProvider>,
    policy: WriteFailurePolicy,
    events: broadcast::Sender<ClientEvent>,
}

impl OptimisticMutationCoordinator {
    pub fn new(
        store: Arc<dyn RemoteEntityStore>,
        auth: Arc<dyn AuthProvider>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            store,
            auth,
            policy: WriteFailurePolicy::default(),
            events,
        }
    }

    pub fn with_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> WriteFailurePolicy {
        self.policy
    }

    pub async fn cast_vote(
        &self,
        view: &mut EntityFetchStateMachine,
    ) -> Result<MutationOutcome, ClientError> {
        let Some(user) = self.auth.current_user().await else {
            info!("vote requires a signed-in user");
            return Ok(MutationOutcome::LoginRequired);
        };
        let original = view.entity().cloned().ok_or(ClientError::EntityNotLoaded)?;

        let Some((updated, patch)) = apply_vote(&original, &user.uid) else {
            info!(entity_id = %original.id, user_id = %user.uid, "user already voted");
            return Ok(MutationOutcome::Unchanged(original));
        };
        self.write(MutationKind::Vote, view, original, updated, patch)
            .await
    }

    pub async fn add_comment(
        &self,
        view: &mut EntityFetchStateMachine,
        message: &str,
    ) -> Result<MutationOutcome, ClientError> {
        let Some(user) = self.auth.current_user().await else {
            info!("comment requires a signed-in user");
            return Ok(MutationOutcome::LoginRequired);
        };
        let original = view.entity().cloned().ok_or(ClientError::EntityNotLoaded)?;

        let (updated, patch) = append_comment(&original, &user, message, Utc::now());
        self.write(MutationKind::Comment, view, original, updated, patch)
            .await
    }

    async fn write(
        &self,
        kind: MutationKind,
        view: &mut EntityFetchStateMachine,
        original: Entity,
        updated: Entity,
        patch: EntityPatch,
    ) -> Result<MutationOutcome, ClientError> {
        let entity_id = original.id.clone();
        view.apply_local(updated.clone());

        match self
            .store
            .update(view.collection(), &entity_id, patch)
            .await
        {
            Ok(()) => {
                view.mark_dirty();
                info!(%entity_id, %kind, "mutation written");
                let _ = self.events.send(ClientEvent::EntityMutated {
                    entity_id,
                    kind,
                });
                Ok(MutationOutcome::Applied(updated))
            }
            Err(source) => {
                error!(%entity_id, %kind, error = %source, policy = ?self.policy, "store write failed");
                match self.policy {
                    WriteFailurePolicy::Rollback => {
                        view.apply_local(original);
                    }
                    WriteFailurePolicy::Refetch => view.mark_dirty(),
                }
                let _ = self.events.send(ClientEvent::Notice(format!(
                    "No se pudo guardar tu {}; inténtalo de nuevo",
                    match kind {
                        MutationKind::Vote => "voto",
                        MutationKind::Comment => "comentario",
                    }
                )));
                Err(ClientError::StoreWrite {
                    kind,
                    entity_id,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
