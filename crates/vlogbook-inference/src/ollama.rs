//! Ollama inference backend.
//!
//! Generation goes through `/api/chat` (which separates thinking/reasoning
//! from the final content on thinking models), embeddings through
//! `/api/embed`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vlogbook_core::defaults;
use vlogbook_core::{EmbeddingBackend, Error, GenerationBackend, Result};

use crate::config::InferenceConfig;

/// Ollama-backed generation and embedding.
pub struct OllamaBackend {
    base_url: String,
    gen_model: String,
    embed_model: String,
    dimension: usize,
    client: reqwest::Client,
    gen_timeout_secs: u64,
    embed_timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            base_url: config.ollama_base_url.clone(),
            gen_model: config.gen_model.clone(),
            embed_model: config.embed_model.clone(),
            dimension: config.embed_dimension,
            client: reqwest::Client::new(),
            gen_timeout_secs: defaults::GEN_TIMEOUT_SECS,
            embed_timeout_secs: defaults::EMBED_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables (with defaults).
    pub fn from_env() -> Self {
        Self::new(&InferenceConfig::from_env())
    }

    /// Check if the Ollama server responds.
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }

    /// Internal generation method shared by all stages.
    async fn generate_internal(
        &self,
        system: &str,
        prompt: &str,
        format: Option<serde_json::Value>,
    ) -> Result<String> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let think = if format.is_some() { Some(false) } else { None };
        let request = ChatRequest {
            model: self.gen_model.clone(),
            messages,
            stream: false,
            format,
            think,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            model = %self.gen_model,
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Ollama format enforcement. Set to `"json"` for guaranteed valid JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    /// Disable thinking for models that support it; suppresses
    /// chain-of-thought in the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Shape requested from the tag-suggestion prompt.
#[derive(Deserialize)]
struct TagSuggestions {
    #[serde(default)]
    tags: Vec<String>,
}

fn clean_single_line(text: &str) -> Option<String> {
    let line = text.trim().trim_matches('"').trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn summarize(&self, transcript: &str) -> Result<Option<String>> {
        let system = "You summarize personal video diary entries. Write a short, \
            first-person-neutral description (2-3 sentences) of what the speaker \
            talks about. Respond with the description only.";
        let content = self.generate_internal(system, transcript, None).await?;
        Ok(clean_single_line(&content))
    }

    async fn generate_title(&self, summary: &str) -> Result<Option<String>> {
        let system = "You title personal video diary entries. Given a description, \
            respond with a short title of at most eight words. Respond with the \
            title only, no quotes.";
        let content = self.generate_internal(system, summary, None).await?;
        Ok(clean_single_line(&content))
    }

    async fn suggest_tags(
        &self,
        description: &str,
        favorites: &[String],
        existing: &[String],
    ) -> Result<Vec<String>> {
        let system = "You label personal video diary entries. Choose matching tags \
            for the description, strictly from the allowed list. Respond with JSON: \
            {\"tags\": [\"...\"]}";
        let prompt = format!(
            "Description:\n{}\n\nAllowed tags: {}\nAlready applied: {}",
            description,
            favorites.join(", "),
            existing.join(", ")
        );

        let content = self
            .generate_internal(system, &prompt, Some(serde_json::json!("json")))
            .await?;

        match serde_json::from_str::<TagSuggestions>(&content) {
            Ok(parsed) => Ok(parsed.tags),
            Err(e) => {
                // Models occasionally return a bare array or plain list even
                // with format enforcement.
                if let Ok(tags) = serde_json::from_str::<Vec<String>>(&content) {
                    return Ok(tags);
                }
                warn!(error = %e, "Unparseable tag suggestions; falling back to comma split");
                Ok(content
                    .split(',')
                    .map(|t| t.trim().trim_matches('"').to_string())
                    .filter(|t| !t.is_empty())
                    .collect())
            }
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: self.embed_model.clone(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(Duration::from_secs(self.embed_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        let elapsed = start.elapsed().as_millis() as u64;
        if elapsed > 5000 {
            warn!(duration_ms = elapsed, slow = true, "Slow embedding operation");
        }

        Ok(result.embeddings.into_iter().next().filter(|v| !v.is_empty()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
