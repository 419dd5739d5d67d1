use shared::{
    domain::EntityId,
    error::{AuthError, StoreError},
};
use thiserror::Error;

use crate::mutation::MutationKind;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no entity is loaded in this view")]
    EntityNotLoaded,
    #[error("failed to write {kind} for entity {entity_id}: {source}")]
    StoreWrite {
        kind: MutationKind,
        entity_id: EntityId,
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown form field '{0}'")]
    UnknownField(String),
}
