//! Inference Server Pipeline - TEI-compatible HTTP serving
//!
//! Model execution is delegated to a text-embeddings-inference style server,
//! one server per model. Before a pipeline is handed out, the server's
//! `GET /info` must report the model being resolved. Predictions go to
//! `POST /predict` with `{"inputs": "<text>"}` and come back as a list of
//! `{"label", "score"}` objects.
//!
//! Raw `LABEL_n` labels are mapped through the model's `config.json`
//! (`id2label`), and only the `top_k` highest scores are kept.

use super::{ModelFiles, Pipeline, Task};
use crate::config::ServedModel;
use crate::error::{Result, SentiError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One classification label with its probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// The subset of a transformers `config.json` used for label mapping
#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct ModelConfigFile {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// The subset of the server's `/info` used to identify the model
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ServerInfo {
    model_id: String,
}

#[derive(Debug, Serialize)]
#[allow(dead_code)]
struct PredictRequest<'a> {
    inputs: &'a str,
}

/// Pipeline served by an inference server
#[derive(Debug, Clone)]
pub struct ServerPipeline {
    #[allow(dead_code)]
    endpoint: String,
    task: Task,
    #[allow(dead_code)]
    model: String,
    id2label: HashMap<String, String>,
    top_k: usize,
    #[cfg(feature = "hub")]
    client: reqwest::Client,
}

impl ServerPipeline {
    /// Connect `model`, whose files are already on disk, to its server
    ///
    /// With `verify` set, a server reporting another model is rejected with
    /// [`SentiError::Construction`]. Without it the server cannot be trusted
    /// to run `model`, so its labels are passed through unmapped.
    #[allow(unused_variables)]
    pub async fn connect(
        served: &ServedModel,
        task: Task,
        model: &str,
        files: &ModelFiles,
        timeout: std::time::Duration,
        verify: bool,
    ) -> Result<Self> {
        #[cfg(feature = "hub")]
        {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| SentiError::Network(e.to_string()))?;
            let endpoint = served.endpoint.trim_end_matches('/').to_string();

            let id2label = if verify {
                let info = fetch_info(&client, &endpoint).await?;
                if !served.serves(model, &info.model_id) {
                    return Err(SentiError::Construction(format!(
                        "{} serves {}, not {}",
                        endpoint, info.model_id, model
                    )));
                }
                read_id2label(&files.config_path()).await?
            } else {
                log::warn!(
                    "model check disabled for {}, labels from {} are left unmapped",
                    model,
                    endpoint
                );
                HashMap::new()
            };

            Ok(Self {
                endpoint,
                task,
                model: model.to_string(),
                id2label,
                top_k: 1,
                client,
            })
        }

        #[cfg(not(feature = "hub"))]
        Err(SentiError::NotImplemented(
            "Inference server pipeline requires 'hub' feature".to_string(),
        ))
    }

    /// Keep the `k` best labels instead of only the top one
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k.max(1);
        self
    }

    /// Task this pipeline serves
    pub fn task(&self) -> Task {
        self.task
    }

    /// Map raw server labels and keep the best `top_k`
    #[allow(dead_code)]
    fn postprocess(&self, raw: Vec<LabelScore>) -> Vec<LabelScore> {
        postprocess(raw, &self.id2label, self.top_k)
    }
}

#[async_trait]
impl Pipeline for ServerPipeline {
    #[allow(unused_variables)]
    async fn run(&self, text: &str) -> Result<serde_json::Value> {
        #[cfg(feature = "hub")]
        {
            let url = format!("{}/predict", self.endpoint);
            let response = self
                .client
                .post(&url)
                .json(&PredictRequest { inputs: text })
                .send()
                .await
                .map_err(|e| SentiError::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(SentiError::InferenceException(format!(
                    "inference server error for {}: {}",
                    self.model,
                    response.status()
                )));
            }

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| SentiError::Parse(format!("Failed to parse response: {}", e)))?;

            let scores = parse_scores(body)?;
            Ok(serde_json::to_value(self.postprocess(scores))?)
        }

        #[cfg(not(feature = "hub"))]
        Err(SentiError::NotImplemented(
            "Inference server pipeline requires 'hub' feature".to_string(),
        ))
    }
}

#[cfg(feature = "hub")]
async fn fetch_info(client: &reqwest::Client, endpoint: &str) -> Result<ServerInfo> {
    let url = format!("{}/info", endpoint);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SentiError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SentiError::Construction(format!(
            "{} did not describe its model: {}",
            endpoint,
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| SentiError::Parse(format!("Failed to parse {}: {}", url, e)))
}

#[cfg(feature = "hub")]
async fn read_id2label(path: &std::path::Path) -> Result<HashMap<String, String>> {
    let contents = tokio::fs::read_to_string(path).await?;
    let config: ModelConfigFile = serde_json::from_str(&contents)
        .map_err(|e| SentiError::Parse(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(config.id2label)
}

/// Accept both `[{..}]` and the batched `[[{..}]]` response shapes
#[allow(dead_code)]
fn parse_scores(body: serde_json::Value) -> Result<Vec<LabelScore>> {
    let body = match body {
        serde_json::Value::Array(mut items)
            if items.len() == 1 && items[0].is_array() =>
        {
            items.remove(0)
        }
        other => other,
    };
    serde_json::from_value(body)
        .map_err(|e| SentiError::Parse(format!("unexpected prediction format: {}", e)))
}

#[allow(dead_code)]
fn postprocess(
    mut scores: Vec<LabelScore>,
    id2label: &HashMap<String, String>,
    top_k: usize,
) -> Vec<LabelScore> {
    for entry in &mut scores {
        if let Some(mapped) = entry
            .label
            .strip_prefix("LABEL_")
            .and_then(|id| id2label.get(id))
        {
            entry.label = mapped.clone();
        }
    }
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores.truncate(top_k);
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sst2_labels() -> HashMap<String, String> {
        HashMap::from([
            ("0".to_string(), "NEGATIVE".to_string()),
            ("1".to_string(), "POSITIVE".to_string()),
        ])
    }

    #[test]
    fn test_postprocess_maps_and_keeps_top() {
        let raw = vec![
            LabelScore {
                label: "LABEL_0".to_string(),
                score: 0.01,
            },
            LabelScore {
                label: "LABEL_1".to_string(),
                score: 0.99,
            },
        ];
        let out = postprocess(raw, &sst2_labels(), 1);
        assert_eq!(
            out,
            vec![LabelScore {
                label: "POSITIVE".to_string(),
                score: 0.99
            }]
        );
    }

    #[test]
    fn test_postprocess_leaves_named_labels() {
        let raw = vec![
            LabelScore {
                label: "5 stars".to_string(),
                score: 0.7,
            },
            LabelScore {
                label: "4 stars".to_string(),
                score: 0.2,
            },
        ];
        let out = postprocess(raw, &HashMap::new(), 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, "5 stars");
    }

    #[test]
    fn test_parse_nested_scores() {
        let body = serde_json::json!([[{"label": "LABEL_1", "score": 0.9}]]);
        let scores = parse_scores(body).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].label, "LABEL_1");

        assert!(parse_scores(serde_json::json!({"error": "overloaded"})).is_err());
    }

    #[cfg(feature = "hub")]
    #[tokio::test]
    async fn test_read_id2label() {
        let dir = std::env::temp_dir().join(format!("senti-server-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"id2label": {"0": "NEGATIVE", "1": "POSITIVE"}}"#).unwrap();

        assert_eq!(read_id2label(&path).await.unwrap(), sst2_labels());
    }
}
