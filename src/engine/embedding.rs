// ── Embedding client ───────────────────────────────────────────────────────
//
// HTTP implementation of the embedding collaborator. Primary endpoint is an
// Ollama server (`/api/embed`); when that returns an error the client falls
// back to the OpenAI-compatible `/v1/embeddings` shape on the same base URL,
// which covers most hosted providers.
//
// Documents and queries carry different instruction prefixes because
// asymmetric retrieval models embed the two sides differently.

use crate::atoms::constants::EMBEDDING_DIM;
use crate::atoms::error::{GraphError, GraphResult};
use crate::atoms::traits::EmbeddingProvider;
use crate::atoms::types::EmbeddingInput;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub document_prefix: String,
    pub query_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mxbai-embed-large".to_string(),
            api_key: None,
            document_prefix: String::new(),
            query_prefix: "Represent this sentence for searching relevant passages: "
                .to_string(),
        }
    }
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }

    fn tagged_input(&self, text: &str, input: EmbeddingInput) -> String {
        let prefix = match input {
            EmbeddingInput::Document => &self.config.document_prefix,
            EmbeddingInput::Query => &self.config.query_prefix,
        };
        format!("{prefix}{text}")
    }

    async fn embed_ollama(&self, input: &str) -> GraphResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.config.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&json!({ "model": self.config.model, "input": input }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GraphError::provider(
                "embedding",
                format!("embed endpoint returned {}", response.status()),
            ));
        }
        let body: OllamaEmbedResponse = response.json().await?;
        body.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::provider("embedding", "empty embeddings array"))
    }

    async fn embed_openai(&self, input: &str) -> GraphResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.config.base_url.trim_end_matches('/'));
        let mut request = self
            .http
            .post(&url)
            .json(&json!({ "model": self.config.model, "input": input }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GraphError::provider(
                "embedding",
                format!("embeddings endpoint returned {}", response.status()),
            ));
        }
        let body: OpenAiEmbedResponse = response.json().await?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GraphError::provider("embedding", "empty data array"))
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed(&self, text: &str, input: EmbeddingInput) -> GraphResult<Vec<f32>> {
        let tagged = self.tagged_input(text, input);

        let vector = match self.embed_ollama(&tagged).await {
            Ok(v) => v,
            Err(primary_err) => {
                debug!("[embed] Primary endpoint failed ({primary_err}), trying OpenAI shape");
                self.embed_openai(&tagged).await.map_err(|fallback_err| {
                    warn!("[embed] Both endpoints failed: {primary_err}; {fallback_err}");
                    fallback_err
                })?
            }
        };

        if vector.len() != EMBEDDING_DIM {
            return Err(GraphError::provider(
                "embedding",
                format!("expected {EMBEDDING_DIM}-d vector, got {}-d", vector.len()),
            ));
        }
        Ok(vector)
    }

    fn model_version(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_and_document_prefixes_differ() {
        let client = EmbeddingClient::new(EmbeddingConfig::default());
        let doc = client.tagged_input("coffee with Sam", EmbeddingInput::Document);
        let query = client.tagged_input("coffee with Sam", EmbeddingInput::Query);
        assert_eq!(doc, "coffee with Sam");
        assert!(query.starts_with("Represent this sentence"));
        assert!(query.ends_with("coffee with Sam"));
    }

    #[test]
    fn ollama_response_parses_first_vector() {
        let body = r#"{"model":"m","embeddings":[[0.1,0.2],[0.9,0.9]]}"#;
        let parsed: OllamaEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embeddings[0], vec![0.1, 0.2]);
    }

    #[test]
    fn openai_response_parses_first_vector() {
        let body = r#"{"data":[{"embedding":[0.5,0.5],"index":0}],"model":"m"}"#;
        let parsed: OpenAiEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.5, 0.5]);
    }
}
