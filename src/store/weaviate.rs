//! Weaviate-backed [`VectorSearchProvider`].
//!
//! Issues a GraphQL `nearVector` query against the class written by
//! the corpus loader. Weaviate reports a cosine *distance* for
//! nearVector queries; it is converted to a similarity score as
//! `1 - distance`, floored at zero.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::RetrievalError;
use crate::models::{DocumentChunk, RetrievedChunk};

use super::VectorSearchProvider;

pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    class: String,
}

impl WeaviateStore {
    pub fn new(config: &StoreConfig) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            class: config.class.clone(),
        })
    }

    fn build_query(
        &self,
        embedding: &[f32],
        k: usize,
        collections: Option<&[String]>,
    ) -> String {
        let vector_json = serde_json::to_string(embedding).unwrap_or_else(|_| "[]".to_string());

        let where_clause = match collections {
            Some(wanted) if !wanted.is_empty() => {
                let values = wanted
                    .iter()
                    .map(|c| format!("\"{}\"", c.replace('"', "")))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    ", where: {{ path: [\"collection\"], operator: ContainsAny, valueText: [{values}] }}"
                )
            }
            _ => String::new(),
        };

        format!(
            "{{ Get {{ {class}(limit: {k}, nearVector: {{ vector: {vector_json} }}{where_clause}) \
             {{ chunk_id content work speaker collection sequence_no \
             _additional {{ distance vector }} }} }} }}",
            class = self.class
        )
    }

    fn parse_hit(obj: &Value) -> Option<RetrievedChunk> {
        let id = obj["chunk_id"].as_str()?.to_string();
        let additional = &obj["_additional"];

        let distance = additional["distance"].as_f64();
        let score = match distance {
            Some(d) if d < 1.0 => 1.0 - d,
            Some(_) => 0.0,
            None => 0.0,
        };

        let embedding = additional["vector"]
            .as_array()
            .map(|vs| {
                vs.iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect()
            })
            .unwrap_or_default();

        Some(RetrievedChunk {
            chunk: DocumentChunk {
                id,
                text: obj["content"].as_str().unwrap_or_default().to_string(),
                source_work: obj["work"].as_str().unwrap_or_default().to_string(),
                speaker: obj["speaker"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                collection: obj["collection"].as_str().unwrap_or_default().to_string(),
                sequence: obj["sequence_no"].as_i64(),
                embedding,
            },
            score,
        })
    }
}

#[async_trait]
impl VectorSearchProvider for WeaviateStore {
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        collections: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let query = self.build_query(embedding, k, collections);

        let response = self
            .client
            .post(format!("{}/v1/graphql", self.base_url))
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Store(format!(
                "Weaviate error {status}: {body_text}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RetrievalError::BadResponse(e.to_string()))?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(RetrievalError::Store(format!(
                    "GraphQL errors: {}",
                    serde_json::to_string(errors).unwrap_or_default()
                )));
            }
        }

        let hits = payload["data"]["Get"][&self.class]
            .as_array()
            .ok_or_else(|| {
                RetrievalError::BadResponse(format!("missing data.Get.{} array", self.class))
            })?;

        let results: Vec<RetrievedChunk> = hits.iter().filter_map(Self::parse_hit).collect();
        debug!(hits = results.len(), k, "vector search completed");
        Ok(results)
    }
}
