//! In-memory reference implementations of the store and scheduler seams.
//!
//! `InMemoryCardStore` backs local development and the integration tests;
//! it honors the same atomicity contract as a real document store (each
//! patch applies under one write lock). `InstantScheduler` records the
//! delays the pipeline requests without sleeping, which is how tests
//! assert backoff totals.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Card, CardPatch, NewCard};
use crate::stage::StageStatus;
use crate::traits::{CardStore, Scheduler};

/// HashMap-backed card store.
#[derive(Default)]
pub struct InMemoryCardStore {
    cards: RwLock<HashMap<Uuid, Card>>,
    patch_log: Mutex<Vec<(Uuid, CardPatch)>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every patch applied so far, in order. Lets tests assert which
    /// fields a mutation actually carried.
    pub fn patch_log(&self) -> Vec<(Uuid, CardPatch)> {
        self.patch_log.lock().expect("patch log poisoned").clone()
    }

    /// Number of stored cards.
    pub async fn len(&self) -> usize {
        self.cards.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cards.read().await.is_empty()
    }

    /// Overwrite a card wholesale. Test setup hook.
    pub async fn put(&self, card: Card) {
        self.cards.write().await.insert(card.id, card);
    }

    /// Soft-delete a card.
    pub async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut cards = self.cards.write().await;
        let card = cards.get_mut(&id).ok_or(Error::CardNotFound(id))?;
        card.deleted_at = Some(Utc::now());
        Ok(())
    }

    fn apply_patch(card: &mut Card, patch: CardPatch) {
        if let Some(ty) = patch.card_type {
            card.card_type = ty;
        }
        if let Some(colors) = patch.colors {
            card.colors = Some(colors);
        }
        if let Some(preview) = patch.link_preview {
            card.link_preview = Some(preview);
        }
        if let Some(category) = patch.link_category {
            card.link_category = Some(category);
        }
        if let Some(tags) = patch.ai_tags {
            card.ai_tags = Some(tags);
        }
        if let Some(summary) = patch.ai_summary {
            card.ai_summary = Some(summary);
        }
        if let Some(transcript) = patch.ai_transcript {
            card.ai_transcript = Some(transcript);
        }
        if let Some(meta) = patch.ai_model_meta {
            card.ai_model_meta = Some(meta);
        }
        if let Some((stage, record)) = patch.stage {
            card.processing_status.set(stage, record);
        }
        card.updated_at = Utc::now();
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn insert(&self, card: NewCard) -> Result<Uuid> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let full = Card {
            id,
            owner_id: card.owner_id,
            card_type: card.card_type,
            content_text: card.content_text,
            url: card.url,
            file: card.file,
            tags: card.tags,
            colors: None,
            link_preview: None,
            link_category: None,
            ai_tags: None,
            ai_summary: None,
            ai_transcript: None,
            ai_model_meta: None,
            processing_status: StageStatus::initial(card.card_type, now),
            workflow_run_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.cards.write().await.insert(id, full);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Card>> {
        Ok(self.cards.read().await.get(&id).cloned())
    }

    async fn patch(&self, id: Uuid, patch: CardPatch) -> Result<()> {
        let mut cards = self.cards.write().await;
        let card = cards.get_mut(&id).ok_or(Error::CardNotFound(id))?;
        self.patch_log
            .lock()
            .expect("patch log poisoned")
            .push((id, patch.clone()));
        Self::apply_patch(card, patch);
        Ok(())
    }

    async fn reset_enrichment(&self, id: Uuid, status: StageStatus, run_id: Uuid) -> Result<()> {
        let mut cards = self.cards.write().await;
        let card = cards.get_mut(&id).ok_or(Error::CardNotFound(id))?;
        card.ai_tags = None;
        card.ai_summary = None;
        card.ai_transcript = None;
        card.ai_model_meta = None;
        card.processing_status = status;
        card.workflow_run_id = Some(run_id);
        card.updated_at = Utc::now();
        debug!(subsystem = "store", card_id = %id, run_id = %run_id, "Enrichment state reset");
        Ok(())
    }

    async fn find_unenriched(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>> {
        let cards = self.cards.read().await;
        let mut found: Vec<&Card> = cards
            .values()
            .filter(|c| {
                c.deleted_at.is_none() && c.ai_model_meta.is_none() && c.created_at < cutoff
            })
            .collect();
        found.sort_by_key(|c| c.created_at);
        Ok(found.into_iter().take(limit).map(|c| c.id).collect())
    }
}

/// Production scheduler: delays are real sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test scheduler: records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct InstantScheduler {
    delays: Mutex<Vec<Duration>>,
}

impl InstantScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.lock().expect("scheduler lock poisoned").clone()
    }

    /// Sum of all requested delays.
    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

#[async_trait]
impl Scheduler for InstantScheduler {
    async fn delay(&self, duration: Duration) {
        self.delays
            .lock()
            .expect("scheduler lock poisoned")
            .push(duration);
    }
}
