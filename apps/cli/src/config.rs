use std::{collections::HashMap, fs, io, path::Path};

use client_core::WriteFailurePolicy;
use shared::domain::DEFAULT_COLLECTION;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub collection: String,
    pub write_failure_policy: WriteFailurePolicy,
    pub media_base_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/catalog.db".into(),
            collection: DEFAULT_COLLECTION.into(),
            write_failure_policy: WriteFailurePolicy::default(),
            media_base_url: "http://127.0.0.1:8080/media/".into(),
            log_filter: "info".into(),
        }
    }
}

/// Settings plus the problems found while reading them. Loading happens
/// before logging is set up, so the caller reports `warnings` afterwards.
#[derive(Debug, Default)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub warnings: Vec<String>,
}

impl LoadedSettings {
    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// Defaults, then `path` if it exists, then environment variables.
pub fn load_settings(path: &Path) -> LoadedSettings {
    let mut loaded = LoadedSettings::default();
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut loaded, path, &raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => loaded.warn(format!("cannot read {}: {err}", path.display())),
    }
    apply_env(&mut loaded, |key| std::env::var(key).ok());
    loaded
}

fn apply_file(loaded: &mut LoadedSettings, path: &Path, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            loaded.warn(format!("ignoring {}: {err}", path.display()));
            return;
        }
    };

    let settings = &mut loaded.settings;
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("collection") {
        settings.collection = v.clone();
    }
    if let Some(v) = file_cfg.get("media_base_url") {
        settings.media_base_url = v.clone();
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
    if let Some(v) = file_cfg.get("write_failure_policy") {
        set_policy(loaded, v);
    }
}

fn apply_env(loaded: &mut LoadedSettings, var: impl Fn(&str) -> Option<String>) {
    let settings = &mut loaded.settings;
    if let Some(v) = var("CATALOG_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var("APP__COLLECTION") {
        settings.collection = v;
    }
    if let Some(v) = var("APP__MEDIA_BASE_URL") {
        settings.media_base_url = v;
    }
    if let Some(v) = var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = var("APP__WRITE_FAILURE_POLICY") {
        set_policy(loaded, &v);
    }
}

fn set_policy(loaded: &mut LoadedSettings, raw: &str) {
    match raw.parse::<WriteFailurePolicy>() {
        Ok(policy) => loaded.settings.write_failure_policy = policy,
        Err(err) => loaded.warn(format!(
            "{err}; keeping {:?}",
            loaded.settings.write_failure_policy
        )),
    }
}
