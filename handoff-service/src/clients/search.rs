use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{ensure_success, join_url};
use crate::config::VectorIndexConfig;

/// One candidate returned by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SearchHit {
    /// String value of a metadata field, used to locate the reference file
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Keep hits scoring at or above `threshold`, best first
pub fn filter_hits(mut hits: Vec<SearchHit>, threshold: f32) -> Vec<SearchHit> {
    hits.retain(|hit| hit.score >= threshold);
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

/// Embedding + similarity search against a hosted index
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Upstage embeddings followed by a Pinecone `/query` call
pub struct HostedSimilaritySearch {
    http: reqwest::Client,
    embedding_base: String,
    embedding_key: String,
    embedding_model: String,
    index: VectorIndexConfig,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<SearchHit>,
}

impl HostedSimilaritySearch {
    pub fn new(
        http: reqwest::Client,
        embedding_base: impl Into<String>,
        embedding_key: impl Into<String>,
        embedding_model: impl Into<String>,
        index: VectorIndexConfig,
    ) -> Self {
        Self {
            http,
            embedding_base: embedding_base.into(),
            embedding_key: embedding_key.into(),
            embedding_model: embedding_model.into(),
            index,
        }
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let response = self
            .http
            .post(join_url(&self.embedding_base, "embeddings"))
            .bearer_auth(&self.embedding_key)
            .json(&json!({ "model": self.embedding_model, "input": text }))
            .send()
            .await?;

        let parsed: EmbeddingResponse = ensure_success("embedding", response).await?.json().await?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("embedding response contained no vectors"))?;

        debug!(dimensions = embedding.len(), "query embedded");
        Ok(embedding)
    }
}

#[async_trait]
impl SimilaritySearch for HostedSimilaritySearch {
    async fn search(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>> {
        let vector = self.embed(query).await?;

        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true
        });
        if let Some(namespace) = &self.index.namespace {
            body["namespace"] = json!(namespace);
        }

        let response = self
            .http
            .post(join_url(&self.index.index_host, "query"))
            .header("Api-Key", &self.index.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: QueryResponse = ensure_success("vector query", response).await?.json().await?;
        info!(hits = parsed.matches.len(), top_k, "similarity search returned");
        Ok(parsed.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> SearchHit {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!(format!("{id}_protocol")));
        SearchHit {
            id: id.to_string(),
            score,
            metadata,
        }
    }

    #[test]
    fn hits_below_threshold_are_dropped() {
        let hits = vec![hit("a", 0.15), hit("b", 0.2), hit("c", 0.81), hit("d", 0.05)];
        let kept = filter_hits(hits, 0.2);

        let ids: Vec<&str> = kept.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn query_matches_deserialize_from_index_response() {
        let raw = r#"{
            "matches": [
                {"id": "doc-1", "score": 0.42, "metadata": {"source": "흉통_프로토콜"}},
                {"id": "doc-2", "score": 0.11}
            ],
            "namespace": ""
        }"#;
        let parsed: QueryResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(parsed.matches.len(), 2);
        assert_eq!(parsed.matches[0].metadata_str("source"), Some("흉통_프로토콜"));
        assert_eq!(parsed.matches[1].metadata_str("source"), None);
    }
}
