//! Hub-backed pipeline factory
//!
//! Acquires model files through a [`ModelStore`] and connects each model to
//! the [`ServerPipeline`] of the server bound to it in `[server.models]`.

use super::{ConstructOptions, ModelStore, Pipeline, PipelineFactory, ServerPipeline, Task};
use crate::config::{Config, ServedModel, ServerConfig};
use crate::error::Result;
use async_trait::async_trait;
use log::info;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// [`PipelineFactory`] over a model store and per-model inference servers
#[derive(Debug, Clone)]
pub struct HubPipelineFactory {
    store: ModelStore,
    server: ServerConfig,
}

impl HubPipelineFactory {
    /// Create a factory serving every model from `server_endpoint`
    pub fn new(store: ModelStore, server_endpoint: &str) -> Self {
        Self {
            store,
            server: ServerConfig {
                endpoint: server_endpoint.to_string(),
                models: BTreeMap::new(),
                ..ServerConfig::default()
            },
        }
    }

    /// Create a factory from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = ModelStore::from_config(config)?;
        Ok(Self {
            store,
            server: config.server.clone(),
        })
    }

    /// Bind `model` to its own server
    pub fn with_served_model(mut self, model: &str, served: ServedModel) -> Self {
        self.server.models.insert(model.to_string(), served);
        self
    }

    /// Enable or disable the `/info` model check
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.server.verify_model = verify;
        self
    }

    /// Set the inference request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.server.timeout_seconds = timeout.as_secs().max(1);
        self
    }

    /// Number of labels kept per prediction
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.server.top_k = k.max(1);
        self
    }

    /// Underlying model store
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Server that will run `model`
    pub fn served(&self, model: &str) -> ServedModel {
        self.server.served(model)
    }
}

#[async_trait]
impl PipelineFactory for HubPipelineFactory {
    fn name(&self) -> &str {
        "hub"
    }

    async fn construct(
        &self,
        task: Task,
        model: &str,
        options: &ConstructOptions,
    ) -> Result<Arc<dyn Pipeline>> {
        let files = self.store.acquire(model, options).await?;
        let served = self.served(model);
        info!(
            "constructing {} pipeline for {} from {} ({}), served by {}",
            task,
            model,
            files.source,
            files.dir.display(),
            served.endpoint
        );

        let pipeline = ServerPipeline::connect(
            &served,
            task,
            model,
            &files,
            Duration::from_secs(self.server.timeout_seconds),
            self.server.verify_model,
        )
        .await?
        .with_top_k(self.server.top_k);
        Ok(Arc::new(pipeline))
    }
}
