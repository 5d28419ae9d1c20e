//! Inference Library Boundary
//!
//! senti never tokenizes text or runs a model itself. Everything model-shaped
//! sits behind two traits:
//!
//! - [`PipelineFactory`]: `construct(task, model, options)`, the single
//!   capability the resolver needs from an inference library
//! - [`Pipeline`]: the constructed callable, `run(text) -> payload`
//!
//! A loaded pipeline is wrapped in a [`ModelHandle`] together with the task,
//! model name and the source it was obtained from.
//!
//! # Feature Flags
//!
//! - `hub`: enables the HTTP side of [`HubPipelineFactory`] (hub downloads)
//!   and [`ServerPipeline`] (a TEI-compatible inference server). Without it
//!   only cached and local model files can be located and pipelines cannot
//!   be served.
//!
//! # Example
//!
//! ```no_run
//! use senti::pipeline::{ConstructOptions, PipelineFactory, Task};
//!
//! # async fn example(factory: &dyn PipelineFactory) -> senti::Result<()> {
//! let pipeline = factory
//!     .construct(
//!         Task::SentimentAnalysis,
//!         "Xenova/distilbert-base-uncased-finetuned-sst-2-english",
//!         &ConstructOptions::cache_only(),
//!     )
//!     .await?;
//!
//! let payload = pipeline.run("I love this.").await?;
//! println!("{}", payload);
//! # Ok(())
//! # }
//! ```

pub mod hub;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod mock;

pub use hub::HubPipelineFactory;
pub use server::{LabelScore, ServerPipeline};
pub use store::{ModelFiles, ModelStore};

use crate::error::{Result, SentiError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Kind of inference to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    /// Binary sentiment (POSITIVE / NEGATIVE)
    SentimentAnalysis,
    /// Generic sequence classification (e.g. 1-5 star ratings)
    TextClassification,
}

impl Task {
    /// Task identifier as understood by inference libraries
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentimentAnalysis => "sentiment-analysis",
            Self::TextClassification => "text-classification",
        }
    }

    /// All known tasks, one session slot each
    pub fn all() -> [Task; 2] {
        [Self::SentimentAnalysis, Self::TextClassification]
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Task {
    type Err = SentiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sentiment-analysis" => Ok(Self::SentimentAnalysis),
            "text-classification" => Ok(Self::TextClassification),
            other => Err(SentiError::Parse(format!("unknown task: {}", other))),
        }
    }
}

/// Where a model handle was obtained from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Persistent model cache, no network
    Cache,
    /// Remote registry (stored into the cache on the way)
    Remote,
    /// Fixed local model directory
    Local,
}

impl SourceKind {
    /// Short label shown next to timings
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Cache | Self::Remote => "browser",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Options passed to [`PipelineFactory::construct`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConstructOptions {
    /// Allow fetching model files from the remote registry
    pub allow_remote: bool,

    /// Allow loading model files from `local_path`
    pub allow_local: bool,

    /// Root of the local model directory
    pub local_path: Option<PathBuf>,

    /// Read from (and write to) the persistent model cache
    pub use_cache: bool,
}

impl ConstructOptions {
    /// Cache only: no network, no local directory
    pub fn cache_only() -> Self {
        Self {
            allow_remote: false,
            allow_local: false,
            local_path: None,
            use_cache: true,
        }
    }

    /// Remote registry with the cache kept in the loop
    pub fn remote() -> Self {
        Self {
            allow_remote: true,
            allow_local: false,
            local_path: None,
            use_cache: true,
        }
    }

    /// Local directory only: no network, no cache
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            allow_remote: false,
            allow_local: true,
            local_path: Some(path.into()),
            use_cache: false,
        }
    }
}

/// A constructed, callable model
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Run the model on one input and return its structured output
    async fn run(&self, text: &str) -> Result<serde_json::Value>;
}

/// The capability an inference library exposes to build pipelines
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    /// Factory name (for logs)
    fn name(&self) -> &str;

    /// Build a pipeline for `task` backed by `model`, honouring `options`
    async fn construct(
        &self,
        task: Task,
        model: &str,
        options: &ConstructOptions,
    ) -> Result<Arc<dyn Pipeline>>;
}

/// Opaque reference to a loaded model
#[derive(Clone)]
pub struct ModelHandle {
    task: Task,
    model_name: String,
    source: SourceKind,
    pipeline: Arc<dyn Pipeline>,
}

impl ModelHandle {
    /// Wrap a constructed pipeline
    pub fn new(
        task: Task,
        model_name: impl Into<String>,
        source: SourceKind,
        pipeline: Arc<dyn Pipeline>,
    ) -> Self {
        Self {
            task,
            model_name: model_name.into(),
            source,
            pipeline,
        }
    }

    /// Task this model was loaded for
    pub fn task(&self) -> Task {
        self.task
    }

    /// Model identifier
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Where the model came from
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Run the underlying pipeline
    pub async fn run(&self, text: &str) -> Result<serde_json::Value> {
        self.pipeline.run(text).await
    }

    /// Whether both handles refer to the same loaded model
    pub fn same_model(&self, other: &ModelHandle) -> bool {
        Arc::ptr_eq(&self.pipeline, &other.pipeline)
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("task", &self.task)
            .field("model_name", &self.model_name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
