use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(EntityId);

/// Collection holding catalog entries unless configured otherwise.
pub const DEFAULT_COLLECTION: &str = "productos";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: UserId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: UserId,
    pub display_name: String,
}

impl From<&AuthUser> for Creator {
    fn from(user: &AuthUser) -> Self {
        Self {
            id: user.uid.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author_id: UserId,
    pub author_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Catalog record shared by every client. `votes` and `voters` are stored
/// independently; nothing derives one from the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub company: String,
    pub url: String,
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub votes: u64,
    #[serde(default)]
    pub voters: BTreeSet<UserId>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub creator: Creator,
}

impl Entity {
    pub fn from_new(id: EntityId, record: NewEntity) -> Self {
        Self {
            id,
            name: record.name,
            company: record.company,
            url: record.url,
            description: record.description,
            image_url: record.image_url,
            votes: record.votes,
            voters: record.voters,
            comments: record.comments,
            created_at: record.created_at,
            creator: record.creator,
        }
    }

    pub fn has_voted(&self, user_id: &UserId) -> bool {
        self.voters.contains(user_id)
    }

    pub fn is_creator(&self, user_id: &UserId) -> bool {
        &self.creator.id == user_id
    }

    pub fn votes_consistent(&self) -> bool {
        self.votes == self.voters.len() as u64
    }

    /// Applies the keys present in `patch`, leaving every other field as is.
    pub fn apply_patch(&mut self, patch: &EntityPatch) {
        if let Some(votes) = patch.votes {
            self.votes = votes;
        }
        if let Some(voters) = &patch.voters {
            self.voters = voters.clone();
        }
        if let Some(comments) = &patch.comments {
            self.comments = comments.clone();
        }
    }
}

/// Record sent to `RemoteEntityStore::create`; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub company: String,
    pub url: String,
    pub description: String,
    pub image_url: String,
    pub votes: u64,
    pub voters: BTreeSet<UserId>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub creator: Creator,
}

/// Partial update: only `Some` keys are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voters: Option<BTreeSet<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.votes.is_none() && self.voters.is_none() && self.comments.is_none()
    }
}
