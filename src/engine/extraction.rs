// ── Thought extraction client ──────────────────────────────────────────────
//
// LLM-backed implementation of the extraction collaborator: one
// chat-completions call per document asking for strict JSON, tolerant of the
// model wrapping its answer in a markdown code fence. Failures surface as
// provider errors that the sync engine treats as "no derived nodes for this
// record".

use crate::atoms::error::{GraphError, GraphResult};
use crate::atoms::traits::ThoughtExtractor;
use crate::atoms::types::Extraction;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::json;

const EXTRACTION_PROMPT: &str = "You extract structured memory from a personal document. \
Return ONLY a JSON object with this exact shape, no prose: \
{\"thoughts\":[{\"content\":string,\"thought_type\":string,\"confidence\":number,\
\"sentiment\":number,\"importance\":number}],\
\"people\":[{\"name\":string,\"relationship\":string|null,\"sentiment\":number|null}],\
\"topics\":[{\"name\":string,\"category\":string|null,\"relevance\":number}]}. \
Thoughts are atomic, self-contained statements. Confidence, importance and \
relevance are in [0,1]; sentiment is in [-1,1]. Omit nothing you are sure of, \
invent nothing you are not.";

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

pub struct ExtractionClient {
    http: reqwest::Client,
    config: ExtractionConfig,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ExtractionClient {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }
}

/// Strip a surrounding markdown code fence, with or without a language tag.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_extraction(raw: &str) -> GraphResult<Extraction> {
    serde_json::from_str(strip_fence(raw))
        .map_err(|e| GraphError::provider("extraction", format!("malformed response: {e}")))
}

#[async_trait]
impl ThoughtExtractor for ExtractionClient {
    async fn extract(&self, content: &str, context: &str) -> GraphResult<Extraction> {
        let url =
            format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let user_message = if context.is_empty() {
            content.to_string()
        } else {
            format!("[{context}]\n{content}")
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [
                    { "role": "system", "content": EXTRACTION_PROMPT },
                    { "role": "user", "content": user_message },
                ],
                "temperature": 0.0,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GraphError::provider(
                "extraction",
                format!("chat endpoint returned {}", response.status()),
            ));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GraphError::provider("extraction", "empty choices array"))?;

        let extraction = parse_extraction(&content)?;
        debug!(
            "[extract] Parsed {} thoughts, {} people, {} topics",
            extraction.thoughts.len(),
            extraction.people.len(),
            extraction.topics.len()
        );
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "thoughts": [{"content": "Coffee with Sam lifts my mood", "thought_type": "observation",
                      "confidence": 0.9, "sentiment": 0.7, "importance": 0.4}],
        "people": [{"name": "Sam", "relationship": "friend", "sentiment": 0.8}],
        "topics": [{"name": "coffee", "category": null, "relevance": 0.6}]
    }"#;

    #[test]
    fn parses_bare_json() {
        let x = parse_extraction(SAMPLE).unwrap();
        assert_eq!(x.thoughts.len(), 1);
        assert_eq!(x.people[0].name, "Sam");
        assert_eq!(x.topics[0].name, "coffee");
    }

    #[test]
    fn parses_fenced_json_with_language_tag() {
        let fenced = format!("```json\n{SAMPLE}\n```");
        let x = parse_extraction(&fenced).unwrap();
        assert_eq!(x.people[0].relationship.as_deref(), Some("friend"));
    }

    #[test]
    fn parses_fenced_json_without_language_tag() {
        let fenced = format!("```\n{SAMPLE}\n```");
        assert!(parse_extraction(&fenced).is_ok());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let x = parse_extraction(r#"{"thoughts": []}"#).unwrap();
        assert!(x.people.is_empty());
        assert!(x.topics.is_empty());
    }

    #[test]
    fn prose_answer_is_a_provider_error() {
        let err = parse_extraction("Sure! Here are the thoughts I found...").unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }
}
