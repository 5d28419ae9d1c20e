//! Model Source Resolver
//!
//! Decides how a runnable [`ModelHandle`] is obtained for a task:
//!
//! - **BrowserCacheThenRemote**: try the persistent cache with remote fetches
//!   disabled, then retry once with remote fetches allowed
//! - **LocalOnly**: load from the fixed local model directory; failures are
//!   propagated, never retried
//!
//! The decision logic lives in [`ResolutionPlan`], a pure state machine that
//! yields status events and construction attempts. [`Resolver`] drives a
//! plan against a [`PipelineFactory`] and returns the handle together with
//! the ordered status events, leaving presentation to the caller.
//!
//! # Example
//!
//! ```no_run
//! use senti::resolver::{ResolutionRequest, Resolver, SourcePreference};
//! use senti::pipeline::{PipelineFactory, Task};
//! use std::sync::Arc;
//!
//! # async fn example(factory: Arc<dyn PipelineFactory>) {
//! let resolver = Resolver::new(factory, "./models/");
//! let request = ResolutionRequest::new(
//!     Task::SentimentAnalysis,
//!     "Xenova/distilbert-base-uncased-finetuned-sst-2-english",
//!     SourcePreference::BrowserCacheThenRemote,
//! );
//!
//! let resolution = resolver.resolve(None, &request).await;
//! for event in &resolution.events {
//!     println!("{}", event);
//! }
//! # }
//! ```

use crate::error::{Result, SentiError};
use crate::pipeline::{ConstructOptions, ModelHandle, Pipeline, PipelineFactory, SourceKind, Task};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

/// Strategy governing where a model is loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourcePreference {
    /// Persistent cache first, remote registry on a miss
    BrowserCacheThenRemote,
    /// Fixed local model directory only
    LocalOnly,
}

impl std::fmt::Display for SourcePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BrowserCacheThenRemote => write!(f, "cache-then-remote"),
            Self::LocalOnly => write!(f, "local-only"),
        }
    }
}

/// What to resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub task: Task,
    pub model_name: String,
    pub source_preference: SourcePreference,
}

impl ResolutionRequest {
    pub fn new(task: Task, model_name: &str, source_preference: SourcePreference) -> Self {
        Self {
            task,
            model_name: model_name.to_string(),
            source_preference,
        }
    }
}

/// Progress notification
///
/// The resolver emits the loading events; [`Processing`](Self::Processing)
/// is added by the session right before inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEvent {
    LoadingFromCache,
    CacheUnavailable,
    LoadingFromLocal,
    Loaded,
    Processing,
}

impl std::fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadingFromCache => write!(f, "Loading model from cache..."),
            Self::CacheUnavailable => write!(f, "Cache not available. Loading remote model..."),
            Self::LoadingFromLocal => write!(f, "Loading model from local..."),
            Self::Loaded => write!(f, "Model is loaded."),
            Self::Processing => write!(f, "Processing ..."),
        }
    }
}

/// One step of a resolution plan
#[derive(Debug)]
pub enum Step {
    /// Report progress
    Status(StatusEvent),
    /// Construct the pipeline with `options`, then call [`ResolutionPlan::report`]
    Construct {
        source: SourceKind,
        options: ConstructOptions,
    },
    /// Resolution finished; `Ok` names the source of the successful attempt
    Done(Result<SourceKind>),
}

/// Pure resolution state machine
///
/// Call [`next`](Self::next) until it yields [`Step::Done`]. After every
/// [`Step::Construct`] the plan stays paused (`next` returns `None`) until
/// the attempt's outcome is passed to [`report`](Self::report).
#[derive(Debug)]
pub struct ResolutionPlan {
    local_path: PathBuf,
    pending: VecDeque<Step>,
    awaiting: Option<SourceKind>,
    cache_error: Option<String>,
}

impl ResolutionPlan {
    /// Start a plan for `preference`
    pub fn new(preference: SourcePreference, local_path: impl Into<PathBuf>) -> Self {
        let local_path = local_path.into();
        let pending = match preference {
            SourcePreference::BrowserCacheThenRemote => VecDeque::from([
                Step::Status(StatusEvent::LoadingFromCache),
                Step::Construct {
                    source: SourceKind::Cache,
                    options: ConstructOptions::cache_only(),
                },
            ]),
            SourcePreference::LocalOnly => VecDeque::from([
                Step::Status(StatusEvent::LoadingFromLocal),
                Step::Construct {
                    source: SourceKind::Local,
                    options: ConstructOptions::local(local_path.clone()),
                },
            ]),
        };

        Self {
            local_path,
            pending,
            awaiting: None,
            cache_error: None,
        }
    }

    /// Next step, or `None` while an attempt is unreported or once done
    pub fn next(&mut self) -> Option<Step> {
        if self.awaiting.is_some() {
            return None;
        }
        let step = self.pending.pop_front()?;
        if let Step::Construct { source, .. } = &step {
            self.awaiting = Some(*source);
        }
        Some(step)
    }

    /// Feed back the outcome of the last construction attempt
    pub fn report(&mut self, outcome: Result<()>) {
        let Some(source) = self.awaiting.take() else {
            warn!("resolution outcome reported with no attempt in flight");
            return;
        };

        match (source, outcome) {
            (source, Ok(())) => {
                self.pending.push_back(Step::Status(StatusEvent::Loaded));
                self.pending.push_back(Step::Done(Ok(source)));
            }
            (SourceKind::Cache, Err(e)) => {
                self.cache_error = Some(e.to_string());
                self.pending
                    .push_back(Step::Status(StatusEvent::CacheUnavailable));
                self.pending.push_back(Step::Construct {
                    source: SourceKind::Remote,
                    options: ConstructOptions::remote(),
                });
            }
            (SourceKind::Remote, Err(e)) => {
                self.pending
                    .push_back(Step::Done(Err(SentiError::ResolutionFailure {
                        cache: self.cache_error.take().unwrap_or_default(),
                        remote: e.to_string(),
                    })));
            }
            (SourceKind::Local, Err(e)) => {
                self.pending.push_back(Step::Done(Err(e)));
            }
        }
    }

    /// Local model directory used by `LocalOnly` plans
    pub fn local_path(&self) -> &PathBuf {
        &self.local_path
    }
}

/// Outcome of [`Resolver::resolve`]
#[derive(Debug)]
pub struct Resolution {
    /// The resolved handle, or why none could be obtained
    pub handle: Result<ModelHandle>,
    /// Status events in emission order
    pub events: Vec<StatusEvent>,
}

impl Resolution {
    /// Whether a handle was obtained
    pub fn is_loaded(&self) -> bool {
        self.handle.is_ok()
    }
}

/// Drives resolution plans against an inference library
#[derive(Clone)]
pub struct Resolver {
    factory: Arc<dyn PipelineFactory>,
    local_path: PathBuf,
}

impl Resolver {
    /// Create a resolver loading local models from `local_path`
    pub fn new(factory: Arc<dyn PipelineFactory>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            local_path: local_path.into(),
        }
    }

    /// Resolve a model handle
    ///
    /// An `existing` handle is returned unchanged without any I/O or events.
    pub async fn resolve(
        &self,
        existing: Option<&ModelHandle>,
        request: &ResolutionRequest,
    ) -> Resolution {
        if let Some(handle) = existing {
            return Resolution {
                handle: Ok(handle.clone()),
                events: Vec::new(),
            };
        }

        let mut plan = ResolutionPlan::new(request.source_preference, self.local_path.clone());
        let mut events = Vec::new();
        let mut constructed: Option<Arc<dyn Pipeline>> = None;

        while let Some(step) = plan.next() {
            match step {
                Step::Status(event) => {
                    info!("{}: {}", request.task, event);
                    events.push(event);
                }
                Step::Construct { source, options } => {
                    debug!(
                        "constructing {} ({}) via {} from {}",
                        request.model_name,
                        request.task,
                        self.factory.name(),
                        source
                    );
                    match self
                        .factory
                        .construct(request.task, &request.model_name, &options)
                        .await
                    {
                        Ok(pipeline) => {
                            constructed = Some(pipeline);
                            plan.report(Ok(()));
                        }
                        Err(e) => {
                            warn!("{} attempt for {} failed: {}", source, request.model_name, e);
                            plan.report(Err(e));
                        }
                    }
                }
                Step::Done(result) => {
                    let handle = result.and_then(|source| {
                        constructed
                            .take()
                            .map(|pipeline| {
                                ModelHandle::new(
                                    request.task,
                                    request.model_name.clone(),
                                    source,
                                    pipeline,
                                )
                            })
                            .ok_or(SentiError::ModelUnavailable)
                    });
                    return Resolution { handle, events };
                }
            }
        }

        Resolution {
            handle: Err(SentiError::ModelUnavailable),
            events,
        }
    }
}
