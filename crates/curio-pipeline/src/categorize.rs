//! Categorization step for link cards.
//!
//! Two phases: an AI classification against a closed taxonomy, then
//! non-AI enrichment (provider-specific facts from raw selector results,
//! plus JSON-LD structured data from the page itself). Only the AI phase
//! can fail the step; enrichment degrades to fewer facts.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use curio_core::{
    defaults, Card, CardPatch, CardStore, CardType, Error, HtmlFetch, InferenceBackend,
    LinkCategory, LinkCategoryMetadata, LinkPreview, Result, Stage, StageRecord,
};
use curio_inference::generate_typed;

use crate::{providers, structured_data};

/// Output of the categorization step.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub category: LinkCategory,
    pub confidence: f32,
    pub image_url: Option<String>,
    pub fact_count: usize,
}

/// Structured result schema for the AI classification phase.
#[derive(Debug, Deserialize, JsonSchema)]
struct LinkClassification {
    /// One of the taxonomy labels.
    category: String,
    confidence: Option<f32>,
    /// Optional provider slug the model recognized from the URL.
    provider_hint: Option<String>,
    tags: Option<Vec<String>>,
}

pub struct CategorizeStep {
    store: Arc<dyn CardStore>,
    inference: Arc<dyn InferenceBackend>,
    fetcher: Arc<dyn HtmlFetch>,
}

impl CategorizeStep {
    pub fn new(
        store: Arc<dyn CardStore>,
        inference: Arc<dyn InferenceBackend>,
        fetcher: Arc<dyn HtmlFetch>,
    ) -> Self {
        Self {
            store,
            inference,
            fetcher,
        }
    }

    /// Categorize a link card and merge the resulting metadata onto it.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "categorize", card_id = %card_id))]
    pub async fn run(&self, card_id: Uuid) -> Result<Categorization> {
        let card = self
            .store
            .get(card_id)
            .await?
            .ok_or(Error::CardNotFound(card_id))?;

        if card.card_type != CardType::Link {
            return Err(Error::InvalidInput(format!(
                "categorization requires a link card, got {}",
                card.card_type
            )));
        }
        let url = card
            .url
            .clone()
            .ok_or_else(|| Error::InvalidInput("link card has no URL".to_string()))?;

        self.store
            .patch(
                card_id,
                CardPatch::stage_only(
                    Stage::Categorize,
                    StageRecord::in_progress(
                        Utc::now(),
                        Some(card.processing_status.get(Stage::Categorize)),
                    ),
                ),
            )
            .await?;

        // Phase 1: AI classification against the closed taxonomy.
        let classification = self.classify_link(&card, &url).await?;
        let category = LinkCategory::from_label(&classification.category).ok_or_else(|| {
            Error::Inference(format!(
                "model returned unrecognized category '{}'",
                classification.category
            ))
        })?;
        let confidence = classification
            .confidence
            .unwrap_or(defaults::CONFIDENCE_HEURISTIC)
            .clamp(0.0, 1.0);
        info!(category = %category, confidence, "Link classified");

        // Phase 2: enrichment, never fatal.
        let provider = providers::detect_provider(&url, classification.provider_hint.as_deref());
        let mut facts = Vec::new();
        if let (Some(provider), Some(preview)) = (provider.as_deref(), card.link_preview.as_ref())
        {
            facts = providers::provider_facts(provider, category, &preview.raw);
        }

        let mut preview_patch: Option<LinkPreview> = None;
        let snapshot = match card.link_preview.as_ref().and_then(|p| p.structured.clone()) {
            Some(existing) => serde_json::from_value(existing).unwrap_or_default(),
            None => {
                let entities = self.fetch_structured_data(&url).await;
                if !entities.is_empty() {
                    let mut preview = card
                        .link_preview
                        .clone()
                        .unwrap_or_else(LinkPreview::pending);
                    preview.structured = Some(serde_json::to_value(&entities)?);
                    preview_patch = Some(preview);
                }
                entities
            }
        };

        let mut image_url = None;
        for entity in snapshot
            .iter()
            .filter(|e| structured_data::entity_matches(e, category))
        {
            let (entity_facts, entity_image) = structured_data::extract_facts(entity, category);
            facts = structured_data::merge_facts(facts, entity_facts);
            if image_url.is_none() {
                image_url = entity_image;
            }
        }

        let mut extra = BTreeMap::new();
        if let Some(tags) = classification.tags {
            let tags: Vec<String> = tags
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if !tags.is_empty() {
                debug!(count = tags.len(), "Model suggested tags");
                extra.insert("suggested_tags".to_string(), serde_json::to_value(tags)?);
            }
        }

        let metadata = LinkCategoryMetadata {
            category,
            confidence,
            detected_provider: provider,
            image_url: image_url.clone(),
            facts,
            extra,
        };
        let fact_count = metadata.facts.len();

        let patch = CardPatch {
            link_category: Some(metadata),
            link_preview: preview_patch,
            stage: Some((
                Stage::Categorize,
                StageRecord::completed(Utc::now(), confidence),
            )),
            ..Default::default()
        };
        self.store.patch(card_id, patch).await?;

        Ok(Categorization {
            category,
            confidence,
            image_url,
            fact_count,
        })
    }

    async fn classify_link(&self, card: &Card, url: &str) -> Result<LinkClassification> {
        let domain = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let mut prompt = format!("URL: {url}\nDomain: {domain}\n");
        if let Some(preview) = &card.link_preview {
            if let Some(title) = &preview.title {
                prompt.push_str(&format!("Title: {title}\n"));
            }
            if let Some(description) = &preview.description {
                prompt.push_str(&format!("Description: {description}\n"));
            }
            if let Some(site) = &preview.site_name {
                prompt.push_str(&format!("Site: {site}\n"));
            }
            if let Some(author) = &preview.author {
                prompt.push_str(&format!("Author: {author}\n"));
            }
            if let Some(published) = &preview.published {
                prompt.push_str(&format!("Published: {published}\n"));
            }
            if let Some(image) = &preview.image_url {
                prompt.push_str(&format!("Image: {image}\n"));
            }
        }
        if !card.tags.is_empty() {
            prompt.push_str(&format!("Existing tags: {}\n", card.tags.join(", ")));
        }
        let excerpt: String = card
            .content_text
            .chars()
            .take(defaults::CATEGORIZE_EXCERPT_CHARS)
            .collect();
        if !excerpt.trim().is_empty() {
            prompt.push_str(&format!("\nContent excerpt:\n{}\n", excerpt.trim()));
        }

        let taxonomy: Vec<&str> = LinkCategory::ALL.iter().map(|c| c.as_str()).collect();
        let system = format!(
            "You classify saved web links into exactly one category from this \
            list: {}. Reply with the category, an optional confidence between \
            0 and 1, an optional provider hint (a short lowercase slug for a \
            well-known content platform), and optional topic tags.",
            taxonomy.join(", ")
        );

        generate_typed(self.inference.as_ref(), &system, &prompt).await
    }

    /// Fetch and parse JSON-LD for the URL. Network or parse trouble is
    /// logged and yields no entities.
    async fn fetch_structured_data(&self, url: &str) -> Vec<serde_json::Value> {
        match self.fetcher.fetch(url).await {
            Ok(bytes) => {
                let html = String::from_utf8_lossy(&bytes);
                structured_data::parse_json_ld(&html)
            }
            Err(e) => {
                warn!(url, error = %e, "Structured-data fetch failed, continuing without");
                Vec::new()
            }
        }
    }
}
