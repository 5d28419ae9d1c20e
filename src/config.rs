//! Configuration management for senti
//!
//! Model names, cache and local model directories, hub and inference server
//! endpoints, and session options, persisted as TOML.

use crate::error::{Result, SentiError};
use crate::pipeline::store::DEFAULT_MODEL_FILES;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// senti configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Models used by the two classification actions
    #[serde(default)]
    pub models: ModelsConfig,
    /// Cache and local model directories
    #[serde(default)]
    pub paths: PathsConfig,
    /// Remote model registry
    #[serde(default)]
    pub hub: HubConfig,
    /// Inference server
    #[serde(default)]
    pub server: ServerConfig,
    /// Session behaviour
    #[serde(default)]
    pub session: SessionConfig,
}

/// Model identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Sentiment model, loaded cache-first with remote fallback
    #[serde(default = "default_sentiment_model")]
    pub sentiment: String,
    /// Classification model, loaded from the local model directory only
    #[serde(default = "default_classification_model")]
    pub classification: String,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Persistent model cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Bundled local models
    #[serde(default = "default_local_models")]
    pub local_models: PathBuf,
}

/// Model hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Base URL, files are fetched from `{endpoint}/{model}/resolve/{revision}/{file}`
    #[serde(default = "default_hub_endpoint")]
    pub endpoint: String,
    /// Branch, tag or commit
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Files every model must provide
    #[serde(default = "default_model_files")]
    pub files: Vec<String>,
}

/// Inference server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TEI-compatible endpoint for models without an entry in `models`
    #[serde(default = "default_server_endpoint")]
    pub endpoint: String,
    /// Refuse servers whose `/info` reports a different model
    #[serde(default = "default_verify_model")]
    pub verify_model: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Labels kept per prediction
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Server bound to each model, keyed by model name
    #[serde(default = "default_served_models")]
    pub models: BTreeMap<String, ServedModel>,
}

/// Where one model is served
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServedModel {
    /// TEI-compatible endpoint serving `/predict` and `/info`
    pub endpoint: String,
    /// Model id the server reports, when it differs from the model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl ServedModel {
    /// Whether a server reporting `served` runs `model`
    ///
    /// Without an explicit `model_id`, a served id matches the model name
    /// or its trailing `org/name` part (`local/org/name` is served as
    /// `org/name`).
    pub fn serves(&self, model: &str, served: &str) -> bool {
        match &self.model_id {
            Some(id) => id == served,
            None => model == served || model.ends_with(&format!("/{}", served)),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Identical inputs reuse earlier predictions (0 = disabled)
    #[serde(default)]
    pub result_cache_size: usize,
}

// Default value functions
fn default_sentiment_model() -> String {
    "Xenova/distilbert-base-uncased-finetuned-sst-2-english".to_string()
}

fn default_classification_model() -> String {
    "local/nlptown/bert-base-multilingual-uncased-sentiment".to_string()
}

fn default_cache_dir() -> PathBuf {
    if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(|dir| PathBuf::from(dir).join("senti").join("models"))
            .unwrap_or_else(|_| PathBuf::from("C:\\Temp\\senti\\models"))
    } else {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".cache/senti/models"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/senti/models"))
    }
}

fn default_local_models() -> PathBuf {
    PathBuf::from("./models/")
}

fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_model_files() -> Vec<String> {
    DEFAULT_MODEL_FILES.iter().map(|f| f.to_string()).collect()
}

fn default_server_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_served_models() -> BTreeMap<String, ServedModel> {
    BTreeMap::from([
        (
            default_sentiment_model(),
            ServedModel {
                endpoint: "http://localhost:8080".to_string(),
                model_id: Some(
                    "distilbert/distilbert-base-uncased-finetuned-sst-2-english".to_string(),
                ),
            },
        ),
        (
            default_classification_model(),
            ServedModel {
                endpoint: "http://localhost:8081".to_string(),
                model_id: None,
            },
        ),
    ])
}

fn default_verify_model() -> bool {
    true
}

fn default_timeout() -> u64 {
    60
}

fn default_top_k() -> usize {
    1
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            sentiment: default_sentiment_model(),
            classification: default_classification_model(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            local_models: default_local_models(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_hub_endpoint(),
            revision: default_revision(),
            files: default_model_files(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_server_endpoint(),
            verify_model: default_verify_model(),
            timeout_seconds: default_timeout(),
            top_k: default_top_k(),
            models: default_served_models(),
        }
    }
}

impl ServerConfig {
    /// Serving entry for `model`, falling back to the shared endpoint
    pub fn served(&self, model: &str) -> ServedModel {
        self.models.get(model).cloned().unwrap_or_else(|| ServedModel {
            endpoint: self.endpoint.clone(),
            model_id: None,
        })
    }
}

impl Config {
    /// Get the default configuration directory
    ///
    /// Returns `~/.config/senti` on Unix-like systems,
    /// or `%APPDATA%\senti` on Windows.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(windows) {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        };

        Ok(config_dir.join("senti"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_file = Self::default_path()?.join("config.toml");

        if !config_file.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_file)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| SentiError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::default_path()?;
        std::fs::create_dir_all(&config_dir)?;
        self.save_to(&config_dir.join("config.toml"))
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            SentiError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check values that would only fail later at resolution time
    pub fn validate(&self) -> Result<()> {
        if self.models.sentiment.trim().is_empty() || self.models.classification.trim().is_empty()
        {
            return Err(SentiError::Configuration(
                "model names must not be empty".to_string(),
            ));
        }
        if self.hub.files.is_empty() {
            return Err(SentiError::Configuration(
                "hub.files must list at least one file".to_string(),
            ));
        }
        if !self.hub.files.iter().any(|f| f == "config.json") {
            return Err(SentiError::Configuration(
                "hub.files must include config.json".to_string(),
            ));
        }
        if self.server.top_k == 0 {
            return Err(SentiError::Configuration(
                "server.top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the cache directory
    pub fn with_cache_dir(mut self, path: PathBuf) -> Self {
        self.paths.cache_dir = path;
        self
    }

    /// Set the local model directory
    pub fn with_local_models(mut self, path: PathBuf) -> Self {
        self.paths.local_models = path;
        self
    }

    /// Set the inference server endpoint
    pub fn with_server_endpoint(mut self, endpoint: &str) -> Self {
        self.server.endpoint = endpoint.to_string();
        self
    }

    /// Bind `model` to its own inference server
    pub fn with_served_model(mut self, model: &str, endpoint: &str) -> Self {
        self.server.models.insert(
            model.to_string(),
            ServedModel {
                endpoint: endpoint.to_string(),
                model_id: None,
            },
        );
        self
    }

    /// Set the prediction cache size (0 disables it)
    pub fn with_result_cache_size(mut self, size: usize) -> Self {
        self.session.result_cache_size = size;
        self
    }
}
