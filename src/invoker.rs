//! Prediction Invoker
//!
//! Runs one input through a resolved model and times it.

use crate::error::{Result, SentiError};
use crate::pipeline::{ModelHandle, SourceKind, Task};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A successful prediction with timing information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Task the model ran
    pub task: Task,

    /// Structured model output
    pub payload: serde_json::Value,

    /// Wall-clock inference time (monotonic clock), serialized in seconds
    #[serde(rename = "elapsed_seconds", with = "seconds")]
    pub elapsed: Duration,

    /// Where the model was loaded from
    pub source: SourceKind,

    /// Whether the prediction was served from the session's result cache
    pub from_cache: bool,
}

impl Prediction {
    /// Elapsed inference time in seconds
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// `browser` or `local`, depending on the model source
    pub fn label(&self) -> &'static str {
        self.source.display_label()
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(elapsed.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Run `input` through `handle`
///
/// Empty (or whitespace-only) input fails with [`SentiError::MissingInput`]
/// and a missing handle with [`SentiError::ModelUnavailable`], both before
/// any inference. Errors raised by the model come back as
/// [`SentiError::InferenceException`] carrying the error's text.
pub async fn invoke(handle: Option<&ModelHandle>, input: &str) -> Result<Prediction> {
    if input.trim().is_empty() {
        return Err(SentiError::MissingInput);
    }
    let handle = handle.ok_or(SentiError::ModelUnavailable)?;

    let start = Instant::now();
    let outcome = handle.run(input).await;
    let elapsed = start.elapsed();

    let payload = match outcome {
        Ok(serde_json::Value::Null) => {
            return Err(SentiError::InferenceException(
                "model returned no result".to_string(),
            ))
        }
        Ok(payload) => payload,
        Err(SentiError::InferenceException(msg)) => {
            return Err(SentiError::InferenceException(msg))
        }
        Err(e) => return Err(SentiError::InferenceException(e.to_string())),
    };

    debug!(
        "{} answered in {:.3}s",
        handle.model_name(),
        elapsed.as_secs_f64()
    );

    Ok(Prediction {
        task: handle.task(),
        payload,
        elapsed,
        source: handle.source(),
        from_cache: false,
    })
}
