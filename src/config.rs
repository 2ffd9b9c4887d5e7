use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::attachment::DEFAULT_MAX_UPLOAD_BYTES;
use crate::backend::http::DEFAULT_API_URL;
use crate::session::Model;

const CONFIG_FILE_NAME: &str = ".agentic-chat.json";

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub debug: Option<bool>,
    #[serde(default)]
    pub api: ApiConfig,
    pub default_model: Option<Model>,
    #[serde(default)]
    pub uploads: UploadConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ApiConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(60))
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    pub max_bytes: Option<u64>,
}

impl UploadConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl Config {
    pub fn load() -> Self {
        let mut cfg = Self::load_from_files(&Self::config_paths());
        cfg.apply_env(|key| env::var(key).ok());
        log::debug!("Loaded config: {:?}", cfg);
        cfg
    }

    pub fn model(&self) -> Model {
        self.default_model.unwrap_or_default()
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    /// The AGENTIC_CHAT_DEBUG flag alone, readable before any file is loaded.
    pub fn debug_from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<bool> {
        lookup("AGENTIC_CHAT_DEBUG").and_then(|s| s.parse::<bool>().ok())
    }

    // Lowest precedence first.
    fn config_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|p| p.join(CONFIG_FILE_NAME)),
            dirs::config_dir().map(|p| p.join("agentic-chat/config.json")),
            Some(PathBuf::from(".").join(CONFIG_FILE_NAME)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AGENTIC_CHAT_API_URL").filter(|s| !s.is_empty()) {
            self.api.base_url = Some(url);
        }
        if let Some(raw) = lookup("AGENTIC_CHAT_MODEL") {
            match Model::from_str(&raw) {
                Ok(model) => self.default_model = Some(model),
                Err(_) => log::warn!("Ignoring unknown AGENTIC_CHAT_MODEL '{}'", raw),
            }
        }
        if let Some(debug_env) = Self::debug_from_env(&lookup) {
            self.debug = Some(debug_env);
        }
    }

    fn load_from_files(paths: &[PathBuf]) -> Self {
        let mut config = Config::default();
        for path in paths {
            if let Some(loaded) = Self::read_file(path) {
                config.merge(loaded);
                log::info!("Successfully loaded and merged config from: {:?}", path);
            }
        }
        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        log::debug!("Attempting to load config from: {:?}", path);
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read config file at {:?}: {}", path, e);
                return None;
            }
        };
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to parse config file at {:?}: {}", path, e);
                None
            }
        }
    }

    // Only fields `other` actually sets override.
    fn merge(&mut self, other: Config) {
        if other.debug.is_some() {
            self.debug = other.debug;
        }
        if let Some(url) = other.api.base_url.filter(|s| !s.is_empty()) {
            self.api.base_url = Some(url);
        }
        if other.api.timeout_secs.is_some() {
            self.api.timeout_secs = other.api.timeout_secs;
        }
        if other.default_model.is_some() {
            self.default_model = other.default_model;
        }
        if other.uploads.max_bytes.is_some() {
            self.uploads.max_bytes = other.uploads.max_bytes;
        }
    }
}
