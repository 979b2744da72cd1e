//! Mock inference backend for deterministic testing.
//!
//! Replies are served from a scripted queue (each entry either a JSON
//! value or an error message); when the queue runs dry the configured
//! default response is returned. Every call is recorded in a log that
//! tests can inspect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use curio_core::{Error, InferenceBackend, Result};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(JsonValue),
    Err(String),
}

/// A recorded inference call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub system: String,
    pub prompt: String,
    pub image_url: Option<String>,
}

#[derive(Debug)]
struct MockState {
    queue: VecDeque<MockReply>,
    default_response: JsonValue,
    failure_rate: f64,
    calls: Vec<MockCall>,
}

/// Scriptable mock [`InferenceBackend`].
#[derive(Clone)]
pub struct MockInferenceBackend {
    state: Arc<Mutex<MockState>>,
    model: String,
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                queue: VecDeque::new(),
                default_response: json!({}),
                failure_rate: 0.0,
                calls: Vec::new(),
            })),
            model: "mock-model".to_string(),
        }
    }

    /// Set the response returned when the scripted queue is empty.
    pub fn with_default_response(self, response: JsonValue) -> Self {
        self.state.lock().unwrap().default_response = response;
        self
    }

    /// Queue a successful scripted reply.
    pub fn push_ok(&self, response: JsonValue) {
        self.state
            .lock()
            .unwrap()
            .queue
            .push_back(MockReply::Ok(response));
    }

    /// Queue a scripted failure.
    pub fn push_err(&self, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .queue
            .push_back(MockReply::Err(message.into()));
    }

    /// Builder form of [`push_ok`](Self::push_ok).
    pub fn with_response(self, response: JsonValue) -> Self {
        self.push_ok(response);
        self
    }

    /// Builder form of [`push_err`](Self::push_err).
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push_err(message);
        self
    }

    /// Set a random failure rate (0.0 - 1.0) applied before the queue.
    pub fn with_failure_rate(self, rate: f64) -> Self {
        self.state.lock().unwrap().failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    fn record_and_reply(
        &self,
        operation: &str,
        system: &str,
        prompt: &str,
        image_url: Option<&str>,
    ) -> Result<JsonValue> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall {
            operation: operation.to_string(),
            system: system.to_string(),
            prompt: prompt.to_string(),
            image_url: image_url.map(String::from),
        });

        if state.failure_rate > 0.0 {
            use rand::Rng;
            if rand::thread_rng().gen::<f64>() < state.failure_rate {
                return Err(Error::Inference("Injected random failure".to_string()));
            }
        }

        match state.queue.pop_front() {
            Some(MockReply::Ok(value)) => Ok(value),
            Some(MockReply::Err(message)) => Err(Error::Inference(message)),
            None => Ok(state.default_response.clone()),
        }
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn generate_structured(
        &self,
        system: &str,
        prompt: &str,
        _schema: JsonValue,
    ) -> Result<JsonValue> {
        self.record_and_reply("generate_structured", system, prompt, None)
    }

    async fn generate_structured_vision(
        &self,
        system: &str,
        prompt: &str,
        image_url: &str,
        _schema: JsonValue,
    ) -> Result<JsonValue> {
        self.record_and_reply("generate_structured_vision", system, prompt, Some(image_url))
    }

    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
