//! Classification session
//!
//! Holds one model slot per [`Task`]. A slot is filled by the first
//! successful resolution and reused for every later prediction; failed
//! resolutions leave it empty so the next request tries again.
//!
//! Each slot also carries an in-progress flag. A request arriving while
//! another one for the same task is still running is rejected with
//! [`SentiError::Busy`].

use crate::config::{Config, ModelsConfig};
use crate::error::{Result, SentiError};
use crate::invoker::{invoke, Prediction};
use crate::pipeline::{ModelHandle, PipelineFactory, Task};
use crate::resolver::{ResolutionRequest, Resolver, SourcePreference, StatusEvent};
use log::{debug, warn};
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// The two preset classification actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Sentiment model from the cache, downloading on a miss
    CachedSentiment,
    /// Classification model from the local model directory
    LocalClassification,
}

impl Action {
    pub fn task(&self) -> Task {
        match self {
            Self::CachedSentiment => Task::SentimentAnalysis,
            Self::LocalClassification => Task::TextClassification,
        }
    }

    pub fn source_preference(&self) -> SourcePreference {
        match self {
            Self::CachedSentiment => SourcePreference::BrowserCacheThenRemote,
            Self::LocalClassification => SourcePreference::LocalOnly,
        }
    }

    /// Resolution request for this action's configured model
    pub fn request(&self, models: &ModelsConfig) -> ResolutionRequest {
        let model = match self {
            Self::CachedSentiment => &models.sentiment,
            Self::LocalClassification => &models.classification,
        };
        ResolutionRequest::new(self.task(), model, self.source_preference())
    }
}

/// Result of one classification request
#[derive(Debug)]
pub struct Outcome {
    /// Status events in emission order
    pub events: Vec<StatusEvent>,
    /// The prediction, or the error to show
    pub result: Result<Prediction>,
}

type ResultKey = (Task, String, String);

/// Session-level model slots and single-flight guards
pub struct Session {
    resolver: Resolver,
    models: ModelsConfig,
    slots: Mutex<HashMap<Task, ModelHandle>>,
    in_flight: Mutex<HashSet<Task>>,
    results: Option<Mutex<LruCache<ResultKey, Prediction>>>,
}

/// Marks a task slot busy until dropped
struct SlotGuard<'a> {
    in_flight: &'a Mutex<HashSet<Task>>,
    task: Task,
}

impl<'a> SlotGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<Task>>, task: Task) -> Result<Self> {
        if !lock(in_flight).insert(task) {
            return Err(SentiError::Busy(task));
        }
        Ok(Self { in_flight, task })
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.task);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    /// Create a session over `factory` using `config`
    pub fn new(factory: Arc<dyn PipelineFactory>, config: &Config) -> Self {
        let results = NonZeroUsize::new(config.session.result_cache_size)
            .map(|size| Mutex::new(LruCache::new(size)));

        Self {
            resolver: Resolver::new(factory, config.paths.local_models.clone()),
            models: config.models.clone(),
            slots: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            results,
        }
    }

    /// Loaded handle for `task`, if any
    pub fn handle(&self, task: Task) -> Option<ModelHandle> {
        lock(&self.slots).get(&task).cloned()
    }

    /// Whether a model is loaded for `task`
    pub fn is_loaded(&self, task: Task) -> bool {
        lock(&self.slots).contains_key(&task)
    }

    /// Whether a request for `task` is running
    pub fn is_busy(&self, task: Task) -> bool {
        lock(&self.in_flight).contains(&task)
    }

    /// Run one of the preset actions
    pub async fn run(&self, action: Action, input: &str) -> Outcome {
        let request = action.request(&self.models);
        self.classify(&request, input).await
    }

    /// Resolve the model for `request` (memoized) and classify `input`
    pub async fn classify(&self, request: &ResolutionRequest, input: &str) -> Outcome {
        let mut events = Vec::new();
        let result = self.classify_inner(request, input, &mut events).await;
        Outcome { events, result }
    }

    async fn classify_inner(
        &self,
        request: &ResolutionRequest,
        input: &str,
        events: &mut Vec<StatusEvent>,
    ) -> Result<Prediction> {
        if input.trim().is_empty() {
            return Err(SentiError::MissingInput);
        }

        let _guard = SlotGuard::acquire(&self.in_flight, request.task).map_err(|e| {
            warn!("rejecting overlapping {} request", request.task);
            e
        })?;

        let key = (
            request.task,
            request.model_name.clone(),
            input.to_string(),
        );
        if let Some(cached) = self.cached_result(&key) {
            debug!("serving {} prediction from result cache", request.task);
            return Ok(cached);
        }

        let existing = self.handle(request.task);
        let resolution = self.resolver.resolve(existing.as_ref(), request).await;
        events.extend(resolution.events);
        let handle = resolution.handle?;

        if existing.is_none() {
            lock(&self.slots).insert(request.task, handle.clone());
        }

        events.push(StatusEvent::Processing);
        let prediction = invoke(Some(&handle), input).await?;

        if let Some(results) = &self.results {
            lock(results).put(key, prediction.clone());
        }
        Ok(prediction)
    }

    fn cached_result(&self, key: &ResultKey) -> Option<Prediction> {
        let results = self.results.as_ref()?;
        let mut prediction = lock(results).get(key).cloned()?;
        prediction.from_cache = true;
        Some(prediction)
    }

    /// Drop all cached predictions
    pub fn clear_results(&self) {
        if let Some(results) = &self.results {
            lock(results).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::{MockFactory, MockPipeline};
    use crate::pipeline::SourceKind;
    use crate::render::render_outcome;
    use std::time::Duration;

    fn positive() -> serde_json::Value {
        serde_json::json!([{"label": "POSITIVE", "score": 0.99}])
    }

    fn session(factory: Arc<MockFactory>) -> Session {
        Session::new(factory, &Config::default())
    }

    /// The text between "Time taken: " and " seconds"
    fn time_taken(text: &str) -> &str {
        let start = text.find("Time taken: ").unwrap() + "Time taken: ".len();
        let end = text[start..].find(" seconds").unwrap() + start;
        &text[start..end]
    }

    #[tokio::test]
    async fn test_end_to_end_positive() {
        let factory = Arc::new(MockFactory::new().then_ok(MockPipeline::returning(positive())));
        let session = session(factory);

        let outcome = session.run(Action::CachedSentiment, "I love this.").await;
        assert_eq!(
            outcome.events,
            vec![
                StatusEvent::LoadingFromCache,
                StatusEvent::Loaded,
                StatusEvent::Processing
            ]
        );

        let text = render_outcome(&outcome);
        assert!(text.contains(r#"[{"label":"POSITIVE","score":0.99}]"#));
        let secs = time_taken(&text);
        let (_, decimals) = secs.split_once('.').unwrap();
        assert_eq!(decimals.len(), 2);
        assert!(secs.parse::<f64>().is_ok());
        assert!(text.ends_with("(browser)."));
    }

    #[tokio::test]
    async fn test_end_to_end_empty_input() {
        let pipeline = MockPipeline::returning(positive());
        let factory = Arc::new(MockFactory::new().then_ok(pipeline.clone()));
        let session = session(factory.clone());

        let outcome = session.run(Action::CachedSentiment, "").await;
        assert!(matches!(outcome.result, Err(SentiError::MissingInput)));
        assert!(outcome.events.is_empty());
        assert!(factory.calls().is_empty());
        assert_eq!(pipeline.calls(), 0);
        assert_eq!(render_outcome(&outcome), "Input some query");
    }

    #[tokio::test]
    async fn test_handle_is_memoized_per_slot() {
        let pipeline = MockPipeline::returning(positive());
        let factory = Arc::new(MockFactory::new().then_ok(pipeline.clone()));
        let session = session(factory.clone());

        session.run(Action::CachedSentiment, "first").await.result.unwrap();
        let second = session.run(Action::CachedSentiment, "second").await;

        assert_eq!(second.events, vec![StatusEvent::Processing]);
        assert!(second.result.is_ok());
        assert_eq!(factory.calls().len(), 1);
        assert_eq!(pipeline.calls(), 2);
        assert!(session.is_loaded(Task::SentimentAnalysis));
        assert!(!session.is_loaded(Task::TextClassification));
    }

    #[tokio::test]
    async fn test_failed_resolution_leaves_slot_empty() {
        let factory = Arc::new(
            MockFactory::new()
                .then_err("no model directory")
                .then_ok(MockPipeline::returning(positive())),
        );
        let session = session(factory.clone());

        let first = session.run(Action::LocalClassification, "great").await;
        assert!(matches!(first.result, Err(SentiError::Construction(_))));
        assert!(!session.is_loaded(Task::TextClassification));

        let second = session.run(Action::LocalClassification, "great").await;
        let prediction = second.result.unwrap();
        assert_eq!(prediction.source, SourceKind::Local);
        assert!(session.is_loaded(Task::TextClassification));
        assert_eq!(factory.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_requests_are_rejected() {
        let pipeline = MockPipeline::slow(positive(), Duration::from_millis(50));
        let factory = Arc::new(MockFactory::new().then_ok(pipeline.clone()));
        let session = session(factory);

        let (first, second) = tokio::join!(
            session.run(Action::CachedSentiment, "one"),
            session.run(Action::CachedSentiment, "two"),
        );
        assert!(first.result.is_ok());
        assert!(matches!(
            second.result,
            Err(SentiError::Busy(Task::SentimentAnalysis))
        ));
        assert_eq!(pipeline.calls(), 1);
        assert!(!session.is_busy(Task::SentimentAnalysis));
    }

    #[tokio::test]
    async fn test_result_cache() {
        let pipeline = MockPipeline::returning(positive());
        let factory = Arc::new(MockFactory::new().then_ok(pipeline.clone()));
        let config = Config::default().with_result_cache_size(4);
        let session = Session::new(factory, &config);

        let first = session.run(Action::CachedSentiment, "I love this.").await;
        assert!(!first.result.unwrap().from_cache);
        let second = session.run(Action::CachedSentiment, "I love this.").await;
        assert!(second.result.unwrap().from_cache);
        assert_eq!(pipeline.calls(), 1);

        session.clear_results();
        session.run(Action::CachedSentiment, "I love this.").await;
        assert_eq!(pipeline.calls(), 2);
    }

    #[test]
    fn test_action_requests() {
        let models = ModelsConfig::default();
        let local = Action::LocalClassification.request(&models);
        assert_eq!(local.task, Task::TextClassification);
        assert_eq!(local.source_preference, SourcePreference::LocalOnly);
        assert_eq!(
            local.model_name,
            "local/nlptown/bert-base-multilingual-uncased-sentiment"
        );
    }
}
