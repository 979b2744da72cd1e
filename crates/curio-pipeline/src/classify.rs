//! Classification step: determine a card's true content type.
//!
//! The ladder is deterministic (declared MIME, URL extension, quote
//! markup, palette tokens) with a single AI-assisted branch: LLM color
//! extraction when palette regexes find nothing. Reclassifications below
//! the confidence threshold are discarded to keep noisy input from
//! flapping a card between types.

use std::sync::Arc;

use chrono::Utc;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use curio_core::{
    defaults, Card, CardPatch, CardStore, CardType, Error, InferenceBackend, LinkPreviewService,
    PaletteColor, Result, Stage, StageRecord,
};
use curio_inference::generate_typed;

use crate::palette;

/// Output of the classification step, consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub card_type: CardType,
    pub confidence: f32,
    /// A link-preview fetch was triggered for this card.
    pub needs_link_preview: bool,
    pub should_categorize: bool,
    pub should_generate_metadata: bool,
    pub should_generate_renderables: bool,
}

impl Classification {
    fn for_type(card_type: CardType, confidence: f32) -> Self {
        Self {
            card_type,
            confidence,
            needs_link_preview: false,
            should_categorize: card_type == CardType::Link,
            should_generate_metadata: true,
            should_generate_renderables: card_type.has_renderables(),
        }
    }
}

/// The classification step.
pub struct ClassifyStep {
    store: Arc<dyn CardStore>,
    inference: Arc<dyn InferenceBackend>,
    previews: Arc<dyn LinkPreviewService>,
}

impl ClassifyStep {
    pub fn new(
        store: Arc<dyn CardStore>,
        inference: Arc<dyn InferenceBackend>,
        previews: Arc<dyn LinkPreviewService>,
    ) -> Self {
        Self {
            store,
            inference,
            previews,
        }
    }

    /// Classify the card and persist the result.
    ///
    /// Patches the card's type (when the update gate passes), its palette
    /// colors (for palette cards), and the `classify` stage record, all in
    /// one mutation per write.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "classify", card_id = %card_id))]
    pub async fn run(&self, card_id: Uuid) -> Result<Classification> {
        let card = self
            .store
            .get(card_id)
            .await?
            .ok_or(Error::CardNotFound(card_id))?;

        let now = Utc::now();
        self.store
            .patch(
                card_id,
                CardPatch::stage_only(
                    Stage::Classify,
                    StageRecord::in_progress(now, Some(card.processing_status.get(Stage::Classify))),
                ),
            )
            .await?;

        // Sticky quote: once a card is confirmed a quote, heuristics never
        // re-derive it away. Echo the existing confidence back.
        if card.card_type == CardType::Quote && card.url.is_none() && card.file.is_none() {
            let confidence = card
                .processing_status
                .classify
                .confidence
                .unwrap_or(defaults::CONFIDENCE_QUOTE);
            debug!(confidence, "Sticky quote, skipping classification");
            self.store
                .patch(
                    card_id,
                    CardPatch::stage_only(
                        Stage::Classify,
                        StageRecord::completed(Utc::now(), confidence),
                    ),
                )
                .await?;
            return Ok(Classification::for_type(CardType::Quote, confidence));
        }

        let (mut new_type, mut confidence, detected_colors) = self.derive_type(&card).await;

        // URL-only normalization: content empty or equal to the URL always
        // means the card is a link, whatever the ladder said.
        let url_only_force = card.is_url_only() && new_type != CardType::Link;
        if url_only_force {
            new_type = CardType::Link;
            confidence = defaults::CONFIDENCE_HEURISTIC;
        }

        let commit_type = should_commit_type(card.card_type, new_type, confidence, url_only_force);

        if new_type != card.card_type && !commit_type {
            debug!(
                proposed = %new_type,
                current = %card.card_type,
                confidence,
                "Reclassification below threshold, discarding"
            );
        }

        let mut patch = CardPatch::default();
        let mut needs_link_preview = false;
        let effective_type = if commit_type {
            patch.card_type = Some(new_type);
            new_type
        } else {
            card.card_type
        };

        if commit_type {
            info!(card_type = %new_type, confidence, "Card type updated");

            if new_type == CardType::Palette {
                let colors = match detected_colors {
                    Some(colors) => colors,
                    None => self.extract_palette_colors(&card).await,
                };
                let existing = card.colors.as_deref().unwrap_or(&[]);
                if palette::colors_identical(&colors, existing) {
                    debug!("Palette colors unchanged, skipping write");
                } else {
                    patch.colors = Some(colors);
                }
            }

            if new_type == CardType::Link && card.link_preview.is_none() {
                self.previews.request_preview(card_id).await?;
                needs_link_preview = true;
            }
        }

        patch.stage = Some((
            Stage::Classify,
            StageRecord::completed(Utc::now(), confidence),
        ));
        self.store.patch(card_id, patch).await?;

        let mut classification = Classification::for_type(effective_type, confidence);
        classification.needs_link_preview = needs_link_preview;
        Ok(classification)
    }

    /// The priority ladder: first match wins. Returns the colors found
    /// during palette detection so a subsequent persist can reuse them.
    async fn derive_type(&self, card: &Card) -> (CardType, f32, Option<Vec<PaletteColor>>) {
        // Quote markup beats everything when the card has no URL or file.
        if card.url.is_none() && card.file.is_none() && dequote(&card.content_text).is_some() {
            return (CardType::Quote, defaults::CONFIDENCE_QUOTE, None);
        }

        if let Some(file) = &card.file {
            if let Some(mime) = file.mime_type.as_deref() {
                if let Some((ty, confidence)) = classify_mime(mime) {
                    return (ty, confidence, None);
                }
            }
        }

        if let Some(url) = &card.url {
            if let Some(ty) = classify_url_extension(url) {
                return (ty, defaults::CONFIDENCE_HEURISTIC, None);
            }
        }

        // A file that matched nothing above is still a document.
        if card.file.is_some() {
            return (CardType::Document, defaults::CONFIDENCE_HEURISTIC, None);
        }

        // A URL with no recognizable extension is a plain link.
        if card.url.is_some() {
            return (CardType::Link, defaults::CONFIDENCE_HEURISTIC, None);
        }

        // Palette detection: regex extraction, with an LLM fallback as the
        // one AI-assisted branch.
        let colors = palette::extract_colors(&card.content_text);
        let hinted = palette::has_palette_hint(&card.content_text, &card.tags);
        let threshold = if hinted {
            defaults::PALETTE_MIN_COLORS_HINTED
        } else {
            defaults::PALETTE_MIN_COLORS
        };
        if colors.len() >= threshold {
            return (CardType::Palette, defaults::CONFIDENCE_PALETTE, Some(colors));
        }
        if colors.is_empty() {
            let ai_colors = self.llm_extract_colors(&card.content_text).await;
            if ai_colors.len() >= threshold {
                return (
                    CardType::Palette,
                    defaults::CONFIDENCE_PALETTE,
                    Some(ai_colors),
                );
            }
        }

        (CardType::Text, defaults::CONFIDENCE_TEXT_FALLBACK, None)
    }

    /// Colors for a card committed as a palette: regex primary, AI fallback
    /// only when regex found nothing.
    async fn extract_palette_colors(&self, card: &Card) -> Vec<PaletteColor> {
        let colors = palette::extract_colors(&card.content_text);
        if !colors.is_empty() {
            return colors;
        }
        self.llm_extract_colors(&card.content_text).await
    }

    /// LLM palette-color extraction. Errors degrade to an empty list; the
    /// classification step itself never fails over this branch.
    async fn llm_extract_colors(&self, content: &str) -> Vec<PaletteColor> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let prompt = format!(
            "Extract the colors described in this text as hex values. \
            Only report colors the text actually names or describes.\n\n{}",
            content
        );
        let result: Result<ExtractedColors> = generate_typed(
            self.inference.as_ref(),
            "You extract color palettes from text. Reply with hex colors only.",
            &prompt,
        )
        .await;

        match result {
            Ok(extracted) => {
                let mut colors = Vec::new();
                for c in extracted.colors {
                    let Some(color) = normalize_llm_color(&c) else {
                        continue;
                    };
                    if !colors.iter().any(|x: &PaletteColor| x.hex == color.hex) {
                        colors.push(color);
                    }
                }
                colors
            }
            Err(e) => {
                warn!(error = %e, "LLM palette extraction failed, treating as no colors");
                Vec::new()
            }
        }
    }
}

/// Structured result schema for LLM palette extraction.
#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedColors {
    colors: Vec<ExtractedColor>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractedColor {
    /// Hex value, with or without a leading `#`.
    hex: String,
    name: Option<String>,
}

fn normalize_llm_color(c: &ExtractedColor) -> Option<PaletteColor> {
    let raw = c.hex.trim().trim_start_matches('#');
    if raw.len() != 6 || !raw.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let hex = format!("#{}", raw.to_uppercase());
    Some(match &c.name {
        Some(name) if !name.trim().is_empty() => PaletteColor::named(hex, name.trim()),
        _ => PaletteColor::new(hex),
    })
}

/// Update gate: commit a new type only for the URL-only force, or for a
/// changed type at or above the reclassification threshold. Sub-threshold
/// reclassifications are discarded so noisy input cannot flap the type.
fn should_commit_type(
    current: CardType,
    new_type: CardType,
    confidence: f32,
    url_only_force: bool,
) -> bool {
    (url_only_force && current != CardType::Link)
        || (new_type != current && confidence >= defaults::RECLASSIFY_THRESHOLD)
}

/// Strip quote markup from content. Returns the de-quoted text only when at
/// least one quote marker was actually removed.
pub fn dequote(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Markdown blockquote: every non-empty line starts with '>'.
    if trimmed.starts_with('>') {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines
            .iter()
            .all(|l| l.trim().is_empty() || l.trim_start().starts_with('>'))
        {
            let stripped: Vec<String> = lines
                .iter()
                .map(|l| {
                    l.trim_start()
                        .strip_prefix('>')
                        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                        .unwrap_or(l)
                        .to_string()
                })
                .collect();
            return Some(stripped.join("\n"));
        }
    }

    // Surrounding quotation marks.
    const PAIRS: [(char, char); 3] = [('"', '"'), ('\u{201C}', '\u{201D}'), ('\u{2018}', '\u{2019}')];
    for (open, close) in PAIRS {
        if trimmed.len() > open.len_utf8() + close.len_utf8()
            && trimmed.starts_with(open)
            && trimmed.ends_with(close)
        {
            let inner = &trimmed[open.len_utf8()..trimmed.len() - close.len_utf8()];
            return Some(inner.trim().to_string());
        }
    }

    None
}

/// Known document MIME types beyond image/video/audio.
const DOCUMENT_MIMES: [&str; 8] = [
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/epub+zip",
];

/// Classify a declared MIME type. `None` means the MIME told us nothing and
/// the caller falls through the ladder.
fn classify_mime(mime: &str) -> Option<(CardType, f32)> {
    let mime = mime.trim().to_lowercase();
    if mime.starts_with("image/") {
        return Some((CardType::Image, defaults::CONFIDENCE_MIME_MATCH));
    }
    if mime.starts_with("video/") {
        return Some((CardType::Video, defaults::CONFIDENCE_MIME_MATCH));
    }
    if mime.starts_with("audio/") {
        return Some((CardType::Audio, defaults::CONFIDENCE_MIME_MATCH));
    }
    if DOCUMENT_MIMES.contains(&mime.as_str()) {
        return Some((CardType::Document, defaults::CONFIDENCE_MIME_MATCH));
    }
    if mime.starts_with("text/") {
        return Some((CardType::Text, defaults::CONFIDENCE_HEURISTIC));
    }
    None
}

const IMAGE_EXTS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp"];
const VIDEO_EXTS: [&str; 6] = ["mp4", "mov", "webm", "mkv", "avi", "m4v"];
const AUDIO_EXTS: [&str; 6] = ["mp3", "wav", "ogg", "flac", "m4a", "aac"];
const DOCUMENT_EXTS: [&str; 9] = [
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "csv", "epub",
];

/// File-extension heuristic on the URL path.
fn classify_url_extension(url: &str) -> Option<CardType> {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Not an absolute URL; fall back to the raw string minus any query.
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };
    let ext = path.rsplit('.').next()?.to_lowercase();
    if path.rsplit('.').count() < 2 {
        return None;
    }
    if IMAGE_EXTS.contains(&ext.as_str()) {
        Some(CardType::Image)
    } else if VIDEO_EXTS.contains(&ext.as_str()) {
        Some(CardType::Video)
    } else if AUDIO_EXTS.contains(&ext.as_str()) {
        Some(CardType::Audio)
    } else if DOCUMENT_EXTS.contains(&ext.as_str()) {
        Some(CardType::Document)
    } else {
        None
    }
}
