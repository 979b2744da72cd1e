//! Metadata generation: tags, summary, and (for audio) a transcript.
//!
//! Each card type assembles its own source text, then a single generic
//! "tags + short summary" model call runs over it. Link cards with a
//! preview still entirely pending defer rather than summarizing nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use curio_core::{
    defaults, BlobStore, Card, CardPatch, CardStore, CardType, Error, InferenceBackend, ModelMeta,
    Result, Stage, StageRecord, TranscriptService,
};
use curio_inference::{generate_typed, generate_typed_vision};

use crate::executor::StepOutcome;

/// Output of the metadata step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataOutput {
    pub ai_tags: Vec<String>,
    pub ai_summary: Option<String>,
    pub ai_transcript: Option<String>,
}

/// Structured result schema for the generic tags-and-summary call.
#[derive(Debug, Deserialize, JsonSchema)]
struct GeneratedMetadata {
    /// Short topic tags, one or two words each.
    tags: Vec<String>,
    /// One to two sentence summary.
    summary: String,
}

pub struct MetadataStep {
    store: Arc<dyn CardStore>,
    inference: Arc<dyn InferenceBackend>,
    blobs: Arc<dyn BlobStore>,
    transcripts: Arc<dyn TranscriptService>,
}

impl MetadataStep {
    pub fn new(
        store: Arc<dyn CardStore>,
        inference: Arc<dyn InferenceBackend>,
        blobs: Arc<dyn BlobStore>,
        transcripts: Arc<dyn TranscriptService>,
    ) -> Self {
        Self {
            store,
            inference,
            blobs,
            transcripts,
        }
    }

    /// Generate AI metadata for the card, or defer when the inputs are not
    /// ready yet.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "metadata", card_id = %card_id))]
    pub async fn run(&self, card_id: Uuid) -> Result<StepOutcome<MetadataOutput>> {
        let card = self
            .store
            .get(card_id)
            .await?
            .ok_or(Error::CardNotFound(card_id))?;

        self.store
            .patch(
                card_id,
                CardPatch::stage_only(
                    Stage::Metadata,
                    StageRecord::in_progress(
                        Utc::now(),
                        Some(card.processing_status.get(Stage::Metadata)),
                    ),
                ),
            )
            .await?;

        let mut transcript: Option<String> = None;
        let source = match card.card_type {
            CardType::Text | CardType::Quote | CardType::Video => {
                SourceText::Plain(card.content_text.clone())
            }
            CardType::Palette => SourceText::Plain(palette_source(&card)),
            CardType::Document => SourceText::Plain(document_source(&card)),
            CardType::Image => match self.resolve_file_url(&card).await? {
                Some(url) => SourceText::ImageUrl(url),
                None => {
                    debug!("Image card has no resolvable file, completing empty");
                    return self.complete_empty(card_id).await;
                }
            },
            CardType::Audio => match self.transcribe(&card).await {
                Ok(Some(text)) => {
                    transcript = Some(text.clone());
                    SourceText::Plain(text)
                }
                Ok(None) => {
                    debug!("Audio card has no resolvable file, completing empty");
                    return self.complete_empty(card_id).await;
                }
                Err(e) => {
                    // Transcription trouble leaves the card without AI
                    // metadata rather than blocking the pipeline.
                    warn!(error = %e, "Transcription failed, completing without metadata");
                    return self.complete_empty(card_id).await;
                }
            },
            CardType::Link => match link_source(&card) {
                LinkSource::Rich(text) => SourceText::Plain(text),
                LinkSource::UrlOnly(text) => SourceText::Plain(text),
                LinkSource::PreviewPending => {
                    return Ok(StepOutcome::Deferred {
                        delay: Duration::from_millis(defaults::METADATA_DEFER_MS),
                    });
                }
            },
        };

        let generated = self.generate(source).await?;
        let tags: Vec<String> = generated
            .tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let summary = generated.summary.trim().to_string();

        let patch = CardPatch {
            ai_tags: Some(tags.clone()),
            ai_summary: Some(summary.clone()),
            ai_transcript: transcript.clone(),
            ai_model_meta: Some(self.provenance()),
            stage: Some((
                Stage::Metadata,
                StageRecord::completed(Utc::now(), defaults::CONFIDENCE_METADATA),
            )),
            ..Default::default()
        };
        self.store.patch(card_id, patch).await?;
        info!(tag_count = tags.len(), "Metadata generated");

        Ok(StepOutcome::Done(MetadataOutput {
            ai_tags: tags,
            ai_summary: Some(summary),
            ai_transcript: transcript,
        }))
    }

    async fn generate(&self, source: SourceText) -> Result<GeneratedMetadata> {
        let system = format!(
            "You label saved content. Produce {} topic tags of one or two \
            words each, plus a one to two sentence summary.",
            defaults::METADATA_TAG_COUNT
        );
        match source {
            SourceText::Plain(text) => {
                generate_typed(self.inference.as_ref(), &system, text.trim()).await
            }
            SourceText::ImageUrl(url) => {
                generate_typed_vision(
                    self.inference.as_ref(),
                    &system,
                    "Describe and tag this image.",
                    &url,
                )
                .await
            }
        }
    }

    async fn resolve_file_url(&self, card: &Card) -> Result<Option<String>> {
        let Some(file) = &card.file else {
            return Ok(None);
        };
        self.blobs.get_url(&file.file_ref).await
    }

    async fn transcribe(&self, card: &Card) -> Result<Option<String>> {
        let Some(url) = self.resolve_file_url(card).await? else {
            return Ok(None);
        };
        let mime = card.file.as_ref().and_then(|f| f.mime_type.as_deref());
        let text = self.transcripts.transcribe(&url, mime).await?;
        Ok(Some(text))
    }

    /// Complete the stage with no AI fields, stamping provenance so the
    /// reconciler does not re-pick the card forever.
    async fn complete_empty(&self, card_id: Uuid) -> Result<StepOutcome<MetadataOutput>> {
        let patch = CardPatch {
            ai_model_meta: Some(self.provenance()),
            stage: Some((
                Stage::Metadata,
                StageRecord::completed(Utc::now(), defaults::CONFIDENCE_METADATA_EMPTY),
            )),
            ..Default::default()
        };
        self.store.patch(card_id, patch).await?;
        Ok(StepOutcome::Done(MetadataOutput::default()))
    }

    fn provenance(&self) -> ModelMeta {
        ModelMeta {
            provider: self.inference.provider().to_string(),
            model: self.inference.model().to_string(),
            generated_at: Utc::now(),
        }
    }
}

enum SourceText {
    Plain(String),
    ImageUrl(String),
}

enum LinkSource {
    /// Preview fields assembled into a structured text block.
    Rich(String),
    /// No usable preview; raw URL plus whatever content the user wrote.
    UrlOnly(String),
    /// Preview requested but nothing has arrived yet.
    PreviewPending,
}

/// Palette cards summarize from their flattened color list plus content.
fn palette_source(card: &Card) -> String {
    let colors = card
        .colors
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(|c| match &c.name {
            Some(name) => format!("{} {}", c.hex, name),
            None => c.hex.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    if colors.is_empty() {
        card.content_text.clone()
    } else {
        format!("Color palette: {}\n\n{}", colors, card.content_text)
    }
}

/// Document cards lead with the filename so it informs the tags.
fn document_source(card: &Card) -> String {
    match card.file.as_ref().and_then(|f| f.filename.as_deref()) {
        Some(name) => format!("Document: {}\n\n{}", name, card.content_text),
        None => card.content_text.clone(),
    }
}

fn link_source(card: &Card) -> LinkSource {
    match &card.link_preview {
        Some(preview) if preview.has_rich_fields() => {
            let mut block = String::new();
            if let Some(title) = &preview.title {
                block.push_str(&format!("Title: {title}\n"));
            }
            if let Some(description) = &preview.description {
                block.push_str(&format!("Description: {description}\n"));
            }
            if let Some(author) = &preview.author {
                block.push_str(&format!("Author: {author}\n"));
            }
            if let Some(site) = &preview.site_name {
                block.push_str(&format!("Publisher: {site}\n"));
            }
            if let Some(published) = &preview.published {
                block.push_str(&format!("Published: {published}\n"));
            }
            if let Some(url) = &card.url {
                block.push_str(&format!("URL: {url}\n"));
            }
            LinkSource::Rich(block)
        }
        Some(preview) if preview.status == curio_core::PreviewStatus::Pending => {
            LinkSource::PreviewPending
        }
        // Preview finished (or failed) with nothing rich, or was never
        // requested at all: fall back to the raw URL text.
        _ => {
            if card.link_preview.is_none() {
                return LinkSource::PreviewPending;
            }
            let url = card.url.as_deref().unwrap_or("");
            let text = if card.is_url_only() {
                url.to_string()
            } else {
                format!("{}\n\n{}", url, card.content_text)
            };
            LinkSource::UrlOnly(text)
        }
    }
}
