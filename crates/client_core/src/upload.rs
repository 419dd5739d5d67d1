//! Image upload state for the new-entry form. The uploader itself lives
//! outside the core; it reports [`UploadEvent`]s and the resulting download
//! URL is kept as a plain string.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use shared::error::StoreError;
use tracing::{error, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Started,
    Progress(u8),
    Succeeded { file_name: String },
    Failed(String),
}

#[async_trait]
pub trait DownloadUrlResolver: Send + Sync {
    async fn download_url(&self, folder: &str, file_name: &str) -> Result<String, StoreError>;
}

/// Files served under `<base>/<folder>/<file_name>`.
pub struct StaticUrlResolver {
    base_url: Url,
}

impl StaticUrlResolver {
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url })
    }
}

#[async_trait]
impl DownloadUrlResolver for StaticUrlResolver {
    async fn download_url(&self, folder: &str, file_name: &str) -> Result<String, StoreError> {
        self.base_url
            .join(&format!("{folder}/{file_name}"))
            .map(String::from)
            .map_err(|err| StoreError::Unavailable(format!("invalid download url: {err}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    pub uploading: bool,
    pub progress: u8,
    pub file_name: Option<String>,
    pub image_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ImageUpload {
    folder: String,
    resolver: Arc<dyn DownloadUrlResolver>,
    state: Arc<Mutex<UploadState>>,
}

impl ImageUpload {
    pub fn new(folder: impl Into<String>, resolver: Arc<dyn DownloadUrlResolver>) -> Self {
        Self {
            folder: folder.into(),
            resolver,
            state: Arc::new(Mutex::new(UploadState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UploadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> UploadState {
        self.lock().clone()
    }

    /// Empty until an upload succeeded and its URL was resolved.
    pub fn image_url(&self) -> String {
        self.lock().image_url.clone().unwrap_or_default()
    }

    pub async fn handle(&self, event: UploadEvent) {
        match event {
            UploadEvent::Started => {
                let mut state = self.lock();
                state.uploading = true;
                state.progress = 0;
                state.error = None;
            }
            UploadEvent::Progress(progress) => {
                self.lock().progress = progress.min(100);
            }
            UploadEvent::Failed(reason) => {
                error!(folder = %self.folder, %reason, "image upload failed");
                let mut state = self.lock();
                state.uploading = false;
                state.error = Some(reason);
            }
            UploadEvent::Succeeded { file_name } => {
                {
                    let mut state = self.lock();
                    state.uploading = false;
                    state.progress = 100;
                    state.file_name = Some(file_name.clone());
                }
                match self.resolver.download_url(&self.folder, &file_name).await {
                    Ok(url) => {
                        info!(%file_name, %url, "image uploaded");
                        self.lock().image_url = Some(url);
                    }
                    Err(err) => {
                        error!(%file_name, error = %err, "failed to resolve download url");
                        self.lock().error = Some(err.to_string());
                    }
                }
            }
        }
    }
}
