//! Ollama structured-generation backend.
//!
//! Speaks the `/api/chat` endpoint, which properly separates
//! thinking/reasoning from the final response content. Structured output is
//! enforced by passing the JSON Schema in the request's `format` field;
//! `think` is disabled whenever a format is set so thinking models
//! (gpt-oss, qwen3) do not leak reasoning into the reply.
//!
//! The vision variant downloads the image and sends it base64-encoded in
//! the user message's `images` field.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use curio_core::{defaults, Error, InferenceBackend, Result};

/// Configuration for the Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub gen_model: String,
    pub vision_model: String,
    pub gen_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            vision_model: defaults::VISION_MODEL.to_string(),
            gen_timeout_secs: defaults::GEN_TIMEOUT_SECS,
        }
    }
}

impl OllamaConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OLLAMA_URL` / `OLLAMA_BASE` | `http://127.0.0.1:11434` |
    /// | `GEN_MODEL` | `gpt-oss:20b` |
    /// | `VISION_MODEL` | `qwen3-vl:8b` |
    /// | `GEN_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_URL")
            .or_else(|_| std::env::var("OLLAMA_BASE"))
            .unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let gen_model =
            std::env::var("GEN_MODEL").unwrap_or_else(|_| defaults::GEN_MODEL.to_string());
        let vision_model =
            std::env::var("VISION_MODEL").unwrap_or_else(|_| defaults::VISION_MODEL.to_string());
        let gen_timeout_secs = std::env::var("GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::GEN_TIMEOUT_SECS);

        Self {
            base_url,
            gen_model,
            vision_model,
            gen_timeout_secs,
        }
    }

    pub fn with_gen_model(mut self, model: impl Into<String>) -> Self {
        self.gen_model = model.into();
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = model.into();
        self
    }
}

/// Ollama-backed [`InferenceBackend`].
pub struct OllamaBackend {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(OllamaConfig::from_env())
    }

    /// Internal chat call shared by the text and vision paths.
    async fn chat(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        images: Vec<String>,
        schema: JsonValue,
    ) -> Result<JsonValue> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
                images: None,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
            images: if images.is_empty() {
                None
            } else {
                Some(images)
            },
        });

        let request = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            format: Some(schema),
            think: Some(false),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .timeout(Duration::from_secs(self.config.gen_timeout_secs))
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
            response_len = content.len(),
            duration_ms = elapsed,
            "Structured generation complete"
        );
        if elapsed > 30_000 {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }

        serde_json::from_str(&content)
            .map_err(|e| Error::Inference(format!("Model returned invalid JSON: {}", e)))
    }

    /// Download the image and base64-encode it for the `images` field.
    async fn fetch_image(&self, image_url: &str) -> Result<String> {
        use base64::Engine;

        let response = self
            .client
            .get(image_url)
            .timeout(Duration::from_secs(self.config.gen_timeout_secs))
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("Image download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "Image download returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(format!("Image read failed: {}", e)))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: JsonValue,
    ) -> Result<JsonValue> {
        self.chat(&self.config.gen_model, system, prompt, Vec::new(), schema)
            .await
    }

    async fn generate_structured_vision(
        &self,
        system: &str,
        prompt: &str,
        image_url: &str,
        schema: JsonValue,
    ) -> Result<JsonValue> {
        let image_b64 = self.fetch_image(image_url).await?;
        self.chat(
            &self.config.vision_model,
            system,
            prompt,
            vec![image_b64],
            schema,
        )
        .await
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.config.gen_model
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
    /// Base64-encoded images for vision models.
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Ollama format enforcement: a JSON Schema the reply must satisfy.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<JsonValue>,
    /// Disable thinking/reasoning for models that support it.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}
