use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, warn};

use shared::{
    domain::{AuthUser, Entity, EntityId, EntityPatch, NewEntity, UserId},
    error::StoreError,
    store::RemoteEntityStore,
};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
}

impl From<StoredUser> for AuthUser {
    fn from(value: StoredUser) -> Self {
        Self {
            uid: value.user_id,
            display_name: value.display_name,
        }
    }
}

impl Storage {
    /// Accepts a `sqlite:` url or a bare file path. The parent directory of a
    /// file database is created when missing.
    pub async fn new(database_url: &str) -> Result<Self> {
        let database_url = prepare_database_url(database_url)?;

        let connect_options =
            SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> Result<StoredUser> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(anyhow!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }

        let email = normalize_email(email);
        let user_id = UserId::generate();
        let hash = hash_password(password)?;

        sqlx::query(
            "INSERT INTO users (id, email, display_name, password_hash)
             VALUES (?, ?, ?, ?)",
        )
        .bind(user_id.as_str())
        .bind(&email)
        .bind(display_name)
        .bind(&hash)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create user '{email}'"))?;

        Ok(StoredUser {
            user_id,
            email,
            display_name: display_name.to_string(),
        })
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query("SELECT id, email, display_name FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| StoredUser {
            user_id: UserId(r.get::<String, _>(0)),
            email: r.get::<String, _>(1),
            display_name: r.get::<String, _>(2),
        }))
    }

    /// Returns the user only when `password` matches the stored hash.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<StoredUser>> {
        let row = sqlx::query(
            "SELECT id, email, display_name, password_hash FROM users WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up credentials")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored: String = row.try_get("password_hash")?;
        if !password_matches(&stored, password)? {
            return Ok(None);
        }

        Ok(Some(StoredUser {
            user_id: UserId(row.try_get("id")?),
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
        }))
    }

    pub async fn list_entity_ids(&self, collection: &str) -> Result<Vec<EntityId>> {
        let rows = sqlx::query(
            "SELECT id FROM documents WHERE collection = ? ORDER BY created_at DESC, id ASC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| EntityId(r.get::<String, _>(0)))
            .collect())
    }

    async fn load_document(&self, collection: &str, id: &EntityId) -> Result<Option<String>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read {collection}/{id}"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn insert_document(&self, collection: &str, entity: &Entity) -> Result<()> {
        let body = serde_json::to_string(entity).context("failed to encode entity")?;
        sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(entity.id.as_str())
            .bind(body)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert {collection}/{}", entity.id))?;
        Ok(())
    }

    /// Read-merge-write inside one sqlite transaction. Returns `false` when the
    /// document does not exist.
    async fn merge_document(
        &self,
        collection: &str,
        id: &EntityId,
        patch: &EntityPatch,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_unavailable)?;

        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_unavailable)?;
        let Some(row) = row else {
            return Ok(false);
        };

        let mut body: serde_json::Value = serde_json::from_str(&row.get::<String, _>(0))
            .map_err(|err| StoreError::Corrupt(format!("{collection}/{id}: {err}")))?;
        let fields = serde_json::to_value(patch)
            .map_err(|err| StoreError::Rejected(format!("unencodable patch: {err}")))?;
        merge_object(&mut body, fields)?;
        // The merged body must still decode as an entity before it is written.
        serde_json::from_value::<Entity>(body.clone()).map_err(|err| {
            StoreError::Rejected(format!("patch would corrupt {collection}/{id}: {err}"))
        })?;

        sqlx::query(
            "UPDATE documents SET body = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(body.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(collection)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_unavailable)?;

        tx.commit().await.map_err(db_unavailable)?;
        Ok(true)
    }
}

#[async_trait]
impl RemoteEntityStore for Storage {
    async fn get(&self, collection: &str, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        let Some(body) = self.load_document(collection, id).await.map_err(unavailable)? else {
            debug!(collection, %id, "document not found");
            return Ok(None);
        };
        let entity = serde_json::from_str::<Entity>(&body)
            .map_err(|err| StoreError::Corrupt(format!("{collection}/{id}: {err}")))?;
        Ok(Some(entity))
    }

    async fn create(&self, collection: &str, record: NewEntity) -> Result<EntityId, StoreError> {
        let entity = Entity::from_new(EntityId::generate(), record);
        self.insert_document(collection, &entity)
            .await
            .map_err(unavailable)?;
        debug!(collection, id = %entity.id, "document created");
        Ok(entity.id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &EntityId,
        patch: EntityPatch,
    ) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        match self.merge_document(collection, id, &patch).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(err) => {
                warn!(collection, %id, error = %err, "document merge failed");
                Err(err)
            }
        }
    }
}

fn unavailable(err: anyhow::Error) -> StoreError {
    StoreError::Unavailable(format!("{err:#}"))
}

fn db_unavailable(err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn merge_object(
    target: &mut serde_json::Value,
    fields: serde_json::Value,
) -> Result<(), StoreError> {
    let serde_json::Value::Object(fields) = fields else {
        return Err(StoreError::Rejected("patch must be a json object".into()));
    };
    let Some(target) = target.as_object_mut() else {
        return Err(StoreError::Corrupt("stored body must be a json object".into()));
    };
    for (key, value) in fields {
        target.insert(key, value);
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Argon2id PHC string; the salt travels inside it.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

fn password_matches(stored: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|err| anyhow!("stored password hash is invalid: {err}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Turns a bare path into a `sqlite://` url and creates its parent directory.
fn prepare_database_url(raw: &str) -> Result<String> {
    let database_url = normalize_database_url(raw);
    let parent = sqlite_path(&database_url).and_then(|p| p.parent().map(Path::to_path_buf));
    if let Some(parent) = parent {
        fs::create_dir_all(&parent).with_context(|| {
            format!(
                "failed to create directory '{}' for database url '{database_url}'",
                parent.display()
            )
        })?;
    }
    Ok(database_url)
}

fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("sqlite:") || raw.contains("://") {
        return raw.to_string();
    }
    format!("sqlite://{}", raw.replace('\\', "/"))
}

/// File behind a sqlite url; `None` for in-memory databases.
fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") {
        return None;
    }
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
