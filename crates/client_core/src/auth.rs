use async_trait::async_trait;
use shared::{
    domain::AuthUser,
    error::AuthError,
    store::AuthProvider,
};
use storage::Storage;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Signs in against the credential table of a local [`Storage`] and keeps the
/// session in memory.
pub struct LocalAuthProvider {
    storage: Storage,
    session: RwLock<Option<AuthUser>>,
}

impl LocalAuthProvider {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            session: RwLock::new(None),
        }
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn current_user(&self) -> Option<AuthUser> {
        self.session.read().await.clone()
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = match self.storage.verify_credentials(email, password).await {
            Ok(Some(user)) => AuthUser::from(user),
            Ok(None) => {
                warn!("rejected sign-in with invalid credentials");
                return Err(AuthError::invalid_credentials());
            }
            Err(err) => {
                error!(error = %err, "credential lookup failed");
                return Err(AuthError::new("No se pudo iniciar sesión, inténtalo más tarde"));
            }
        };

        info!(user_id = %user.uid, "signed in");
        *self.session.write().await = Some(user.clone());
        Ok(user)
    }

    async fn register(
        &self,
        display_name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        match self.storage.user_by_email(email).await {
            Ok(Some(_)) => return Err(AuthError::new("Ese email ya está registrado")),
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "account lookup failed");
                return Err(AuthError::new("No se pudo crear la cuenta"));
            }
        }

        let user = self
            .storage
            .create_user(email, display_name, password)
            .await
            .map_err(|err| {
                error!(error = %err, "account creation failed");
                AuthError::new("No se pudo crear la cuenta")
            })?;

        let user = AuthUser::from(user);
        info!(user_id = %user.uid, "account created");
        *self.session.write().await = Some(user.clone());
        Ok(user)
    }

    async fn logout(&self) {
        if let Some(user) = self.session.write().await.take() {
            info!(user_id = %user.uid, "signed out");
        }
    }
}
