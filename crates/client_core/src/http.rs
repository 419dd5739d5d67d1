//! Store and auth client for a catalog backend reached over HTTP.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use shared::{
    domain::{AuthUser, Entity, EntityId, EntityPatch, NewEntity},
    error::{ApiError, AuthError, ErrorCode, StoreError},
    protocol::{
        collection_route, entity_route, CreateEntityResponse, LoginRequest, RegisterRequest,
        SessionResponse, LOGIN_ROUTE, REGISTER_ROUTE,
    },
    store::{AuthProvider, RemoteEntityStore},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

pub struct HttpBackend {
    http: Client,
    base_url: Url,
    session: RwLock<Option<AuthUser>>,
}

impl HttpBackend {
    /// Routes are resolved below the path of `base_url`, so a backend may be
    /// mounted under a prefix such as `/api/v1/`.
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            session: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Each segment is percent-encoded, so ids may contain `/`, `?` or `#`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::Unavailable(format!("base url {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    async fn start_session(
        &self,
        route: &[&str],
        body: impl serde::Serialize,
    ) -> Result<AuthUser, AuthError> {
        let url = self
            .endpoint(route)
            .map_err(|err| AuthError::new(err.to_string()))?;
        let res = self.http.post(url).json(&body).send().await.map_err(|err| {
            warn!(error = %err, "auth request failed");
            AuthError::new("No se pudo conectar con el servidor")
        })?;

        if !res.status().is_success() {
            let api_error = read_api_error(res).await;
            return Err(AuthError::new(api_error.message));
        }

        let body: SessionResponse = res
            .json()
            .await
            .map_err(|err| AuthError::new(format!("respuesta de sesión inválida: {err}")))?;
        let user = AuthUser {
            uid: body.uid,
            display_name: body.display_name,
        };
        info!(user_id = %user.uid, "signed in");
        *self.session.write().await = Some(user.clone());
        Ok(user)
    }
}

async fn read_api_error(res: Response) -> ApiError {
    let status = res.status();
    match res.json::<ApiError>().await {
        Ok(api_error) => api_error,
        Err(_) => ApiError::new(
            ErrorCode::Internal,
            format!("unexpected response status {status}"),
        ),
    }
}

fn store_error(api_error: ApiError) -> StoreError {
    match api_error.code {
        ErrorCode::Validation | ErrorCode::Conflict | ErrorCode::Unauthorized => {
            StoreError::Rejected(api_error.message)
        }
        ErrorCode::NotFound | ErrorCode::Internal => StoreError::Unavailable(api_error.message),
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl RemoteEntityStore for HttpBackend {
    async fn get(&self, collection: &str, id: &EntityId) -> Result<Option<Entity>, StoreError> {
        let url = self.endpoint(&entity_route(collection, id))?;
        let res = self.http.get(url).send().await.map_err(transport)?;
        if res.status() == StatusCode::NOT_FOUND {
            debug!(collection, %id, "remote record not found");
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(store_error(read_api_error(res).await));
        }
        let entity = res
            .json::<Entity>()
            .await
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(entity))
    }

    async fn create(&self, collection: &str, record: NewEntity) -> Result<EntityId, StoreError> {
        let url = self.endpoint(&collection_route(collection))?;
        let res = self
            .http
            .post(url)
            .json(&record)
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(store_error(read_api_error(res).await));
        }
        let body: CreateEntityResponse = res
            .json()
            .await
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(body.id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &EntityId,
        patch: EntityPatch,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&entity_route(collection, id))?;
        let res = self
            .http
            .patch(url)
            .json(&patch)
            .send()
            .await
            .map_err(transport)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        if !res.status().is_success() {
            return Err(store_error(read_api_error(res).await));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for HttpBackend {
    async fn current_user(&self) -> Option<AuthUser> {
        self.session.read().await.clone()
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        self.start_session(
            &LOGIN_ROUTE,
            LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    async fn register(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        self.start_session(
            &REGISTER_ROUTE,
            RegisterRequest {
                display_name: display_name.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    async fn logout(&self) {
        *self.session.write().await = None;
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
