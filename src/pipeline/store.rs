//! Model file acquisition
//!
//! Locates the files a pipeline needs, following [`ConstructOptions`]:
//! a local model directory, the persistent cache directory, and finally a
//! HuggingFace-style hub (`{endpoint}/{model}/resolve/{revision}/{file}`)
//! whose downloads land in the cache.

use super::{ConstructOptions, SourceKind};
use crate::config::Config;
use crate::error::{Result, SentiError};
use log::{debug, info};
use std::path::{Component, Path, PathBuf};

/// Files a served model needs locally
///
/// Weights and tokenizer live with the inference server; only the label
/// mapping in `config.json` is read here.
pub const DEFAULT_MODEL_FILES: &[&str] = &["config.json"];

/// A complete set of model files on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    /// Directory holding the files
    pub dir: PathBuf,

    /// How the files were obtained
    pub source: SourceKind,
}

impl ModelFiles {
    /// Path of the model's `config.json`
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }
}

/// Model file store backed by a cache directory and an optional hub
#[derive(Debug, Clone)]
pub struct ModelStore {
    cache_dir: PathBuf,
    files: Vec<String>,
    hub_endpoint: String,
    revision: String,
    #[cfg(feature = "hub")]
    client: reqwest::Client,
}

impl ModelStore {
    /// Create a store caching into `cache_dir`
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::build(
            cache_dir.into(),
            "https://huggingface.co".to_string(),
            "main".to_string(),
            DEFAULT_MODEL_FILES.iter().map(|f| f.to_string()).collect(),
        )
    }

    /// Create a store from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::build(
            config.paths.cache_dir.clone(),
            config.hub.endpoint.clone(),
            config.hub.revision.clone(),
            config.hub.files.clone(),
        )
    }

    fn build(
        cache_dir: PathBuf,
        hub_endpoint: String,
        revision: String,
        files: Vec<String>,
    ) -> Result<Self> {
        if !files.iter().any(|f| f == "config.json") {
            return Err(SentiError::Configuration(
                "model file list must include config.json".to_string(),
            ));
        }

        #[cfg(feature = "hub")]
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| SentiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            cache_dir,
            files,
            hub_endpoint: hub_endpoint.trim_end_matches('/').to_string(),
            revision,
            #[cfg(feature = "hub")]
            client,
        })
    }

    /// Set the hub endpoint (e.g. a mirror)
    pub fn with_hub(mut self, endpoint: &str, revision: &str) -> Self {
        self.hub_endpoint = endpoint.trim_end_matches('/').to_string();
        self.revision = revision.to_string();
        self
    }

    /// Set the files a model must provide
    pub fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Cache directory root
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory a model occupies inside the cache
    pub fn cache_path(&self, model: &str) -> Result<PathBuf> {
        validate_model_name(model)?;
        Ok(self.cache_dir.join(model))
    }

    /// Whether all model files are present in the cache
    pub fn is_cached(&self, model: &str) -> bool {
        self.cache_path(model)
            .map(|dir| self.is_complete(&dir))
            .unwrap_or(false)
    }

    /// Whether all model files are present under a local model root
    pub fn is_local(&self, root: &Path, model: &str) -> bool {
        validate_model_name(model).is_ok() && self.is_complete(&root.join(model))
    }

    fn is_complete(&self, dir: &Path) -> bool {
        self.files.iter().all(|f| dir.join(f).is_file())
    }

    /// Locate (or fetch) the files for `model` as allowed by `options`
    pub async fn acquire(&self, model: &str, options: &ConstructOptions) -> Result<ModelFiles> {
        validate_model_name(model)?;

        if options.allow_local {
            let root = options.local_path.as_ref().ok_or_else(|| {
                SentiError::Configuration("local loading requires a local model path".to_string())
            })?;
            let dir = root.join(model);
            if self.is_complete(&dir) {
                debug!("found {} in local directory {}", model, dir.display());
                return Ok(ModelFiles {
                    dir,
                    source: SourceKind::Local,
                });
            }
            if !options.use_cache && !options.allow_remote {
                return Err(SentiError::ModelNotFound(format!(
                    "{} (looked in {})",
                    model,
                    dir.display()
                )));
            }
        }

        if options.use_cache {
            let dir = self.cache_dir.join(model);
            if self.is_complete(&dir) {
                debug!("found {} in cache {}", model, dir.display());
                return Ok(ModelFiles {
                    dir,
                    source: SourceKind::Cache,
                });
            }
        }

        if options.allow_remote {
            let dir = if options.use_cache {
                self.cache_dir.join(model)
            } else {
                std::env::temp_dir().join("senti").join(model)
            };
            self.download(model, &dir).await?;
            return Ok(ModelFiles {
                dir,
                source: SourceKind::Remote,
            });
        }

        if options.use_cache {
            Err(SentiError::CacheMiss(format!(
                "{} is not in {}",
                model,
                self.cache_dir.display()
            )))
        } else {
            Err(SentiError::ModelNotFound(model.to_string()))
        }
    }

    /// Hub URL of one model file
    pub fn file_url(&self, model: &str, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.hub_endpoint, model, self.revision, file
        )
    }

    #[cfg(feature = "hub")]
    async fn download(&self, model: &str, dir: &Path) -> Result<()> {
        info!(
            "downloading {} ({} files) from {}",
            model,
            self.files.len(),
            self.hub_endpoint
        );

        for file in &self.files {
            let target = dir.join(file);
            if tokio::fs::metadata(&target)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                continue;
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let url = self.file_url(model, file);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| SentiError::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(SentiError::Network(format!(
                    "HTTP {} when downloading {}",
                    response.status(),
                    url
                )));
            }

            // Partial files never count as cached.
            let partial = partial_path(&target);
            let stored = async {
                let written = write_streamed(response, &partial).await?;
                tokio::fs::rename(&partial, &target).await?;
                Ok::<_, SentiError>(written)
            }
            .await;

            match stored {
                Ok(written) => debug!("stored {} ({} bytes)", target.display(), written),
                Err(e) => {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    #[cfg(not(feature = "hub"))]
    async fn download(&self, model: &str, _dir: &Path) -> Result<()> {
        info!("cannot download {}: built without hub support", model);
        Err(SentiError::NotImplemented(
            "Remote model downloads require the 'hub' feature".to_string(),
        ))
    }
}

#[cfg(feature = "hub")]
fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}.part", name))
}

/// Stream a response body into `path`, returning the bytes written
#[cfg(feature = "hub")]
async fn write_streamed(response: reqwest::Response, path: &Path) -> Result<u64> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SentiError::Network(e.to_string()))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Reject names that would escape the model directories
fn validate_model_name(model: &str) -> Result<()> {
    let path = Path::new(model);
    let valid = !model.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(SentiError::Configuration(format!(
            "invalid model name: {:?}",
            model
        )))
    }
}
