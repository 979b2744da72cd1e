//! Collaborator traits consumed by the enrichment pipeline.
//!
//! These traits define the seams to every external system the pipeline
//! talks to: the card store, the LLM, the scheduler, blob storage, web
//! fetch, transcription, and thumbnails. Concrete implementations are
//! pluggable; tests substitute deterministic ones.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Card, CardPatch, NewCard};
use crate::stage::StageStatus;

// =============================================================================
// CARD STORE
// =============================================================================

/// Document store for cards, keyed by id.
///
/// `patch` and `reset_enrichment` must be atomic single-document mutations;
/// the pipeline never performs multi-step client-side transactions.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Insert a new card with its initial stage seeding.
    async fn insert(&self, card: NewCard) -> Result<Uuid>;

    /// Fetch a card by id. `Ok(None)` when absent.
    async fn get(&self, id: Uuid) -> Result<Option<Card>>;

    /// Apply an atomic patch. Errors with `CardNotFound` when absent.
    async fn patch(&self, id: Uuid, patch: CardPatch) -> Result<()>;

    /// Reset a card's enrichment state in one mutation: clear the AI
    /// fields, replace the whole StageStatus, and stamp the new run id.
    async fn reset_enrichment(&self, id: Uuid, status: StageStatus, run_id: Uuid) -> Result<()>;

    /// Indexed scan: ids of cards created before `cutoff` with no AI
    /// model-provenance stamp and not soft-deleted, capped at `limit`.
    async fn find_unenriched(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Black-box structured-generation backend.
///
/// `schema` is a JSON Schema the reply must conform to; backends enforce it
/// where the provider supports it and the typed wrapper in curio-inference
/// validates by deserializing.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: JsonValue,
    ) -> Result<JsonValue>;

    /// Vision variant: the prompt is grounded on the image at `image_url`.
    async fn generate_structured_vision(
        &self,
        system: &str,
        prompt: &str,
        image_url: &str,
        schema: JsonValue,
    ) -> Result<JsonValue>;

    /// Provider identifier for provenance stamps ("ollama", "mock").
    fn provider(&self) -> &str;

    /// Model name for provenance stamps.
    fn model(&self) -> &str;
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Delay collaborator used for retry backoff and step deferral.
///
/// At-least-once, best-effort ordering. The production implementation
/// sleeps; the test implementation records the requested delays and
/// returns immediately so backoff totals stay assertable.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn delay(&self, duration: Duration);
}

// =============================================================================
// FILES AND MEDIA
// =============================================================================

/// Blob storage resolving opaque file refs to URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_url(&self, file_ref: &str) -> Result<Option<String>>;

    async fn delete(&self, file_ref: &str) -> Result<()>;
}

/// Bounded HTML fetch: URL → raw bytes, capped read size.
#[async_trait]
pub trait HtmlFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait TranscriptService: Send + Sync {
    async fn transcribe(&self, audio_url: &str, mime_type: Option<&str>) -> Result<String>;
}

/// Thumbnail generator; writes the resulting file ref back onto the card.
#[async_trait]
pub trait ThumbnailService: Send + Sync {
    async fn generate(&self, card_id: Uuid) -> Result<()>;
}

/// Fire-and-forget trigger for asynchronous link-preview extraction.
#[async_trait]
pub trait LinkPreviewService: Send + Sync {
    async fn request_preview(&self, card_id: Uuid) -> Result<()>;
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Caller identity injected at call time by the auth layer.
///
/// The pipeline never authenticates; it only checks ownership and the
/// admin claim carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub admin: bool,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: true,
        }
    }

    /// Whether this caller may operate on a card owned by `owner_id`.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.admin || self.user_id == owner_id
    }
}
