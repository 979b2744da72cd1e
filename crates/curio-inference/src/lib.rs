//! # curio-inference
//!
//! Structured-generation LLM backends for the curio pipeline.
//!
//! This crate provides:
//! - [`OllamaBackend`] — the default backend, speaking Ollama's `/api/chat`
//!   with JSON-Schema format enforcement and a vision variant
//! - [`mock::MockInferenceBackend`] — scripted deterministic backend for tests
//! - [`generate_typed`] — a typed wrapper that derives the result schema
//!   with `schemars` and deserializes the structured reply

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use curio_core::{Error, InferenceBackend, Result};

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaBackend, OllamaConfig};

#[cfg(feature = "mock")]
pub use mock::MockInferenceBackend;

/// Run a structured generation and parse the reply into `T`.
///
/// The JSON Schema handed to the backend is derived from `T` with
/// `schemars`, so the prompt, the enforcement format, and the parse target
/// can never drift apart.
pub async fn generate_typed<T>(
    backend: &dyn InferenceBackend,
    system: &str,
    prompt: &str,
) -> Result<T>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))?;
    let value = backend.generate_structured(system, prompt, schema).await?;
    serde_json::from_value(value)
        .map_err(|e| Error::Inference(format!("Structured reply did not match schema: {}", e)))
}

/// Vision variant of [`generate_typed`].
pub async fn generate_typed_vision<T>(
    backend: &dyn InferenceBackend,
    system: &str,
    prompt: &str,
    image_url: &str,
) -> Result<T>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))?;
    let value = backend
        .generate_structured_vision(system, prompt, image_url, schema)
        .await?;
    serde_json::from_value(value)
        .map_err(|e| Error::Inference(format!("Structured reply did not match schema: {}", e)))
}
