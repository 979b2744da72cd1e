//! Domain models for cards and their enrichment metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::stage::{Stage, StageRecord, StageStatus};

// =============================================================================
// CARD TYPE
// =============================================================================

/// The enumerated content types a card can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Text,
    Link,
    Image,
    Video,
    Audio,
    Document,
    Palette,
    Quote,
}

impl CardType {
    /// Returns string representation of the card type.
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Text => "text",
            CardType::Link => "link",
            CardType::Image => "image",
            CardType::Video => "video",
            CardType::Audio => "audio",
            CardType::Document => "document",
            CardType::Palette => "palette",
            CardType::Quote => "quote",
        }
    }

    /// Whether this type carries a renderable thumbnail.
    pub fn has_renderables(&self) -> bool {
        matches!(self, CardType::Image | CardType::Video | CardType::Document)
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ATTACHMENTS AND PALETTE COLORS
// =============================================================================

/// A file attached to a card, stored in blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// Opaque blob storage reference.
    pub file_ref: String,
    /// Declared MIME type, if the uploader provided one.
    pub mime_type: Option<String>,
    /// Original filename.
    pub filename: Option<String>,
}

/// A single color in a palette card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteColor {
    /// Normalized hex value, uppercase with leading `#` (e.g. `#FF8800`).
    pub hex: String,
    /// Optional human name ("coral", "slate blue").
    pub name: Option<String>,
}

impl PaletteColor {
    pub fn new(hex: impl Into<String>) -> Self {
        Self {
            hex: hex.into().to_uppercase(),
            name: None,
        }
    }

    pub fn named(hex: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hex: hex.into().to_uppercase(),
            name: Some(name.into()),
        }
    }
}

// =============================================================================
// LINK PREVIEW
// =============================================================================

/// Lifecycle of the asynchronous link-preview fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewStatus {
    Pending,
    Ready,
    Failed,
}

/// Preview metadata fetched for a link card by the link-metadata collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub status: PreviewStatus,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub author: Option<String>,
    pub published: Option<String>,
    pub image_url: Option<String>,
    /// Raw selector results captured at scrape time, keyed by selector name.
    /// Consumed by provider-specific enrichment without another network call.
    #[serde(default)]
    pub raw: BTreeMap<String, JsonValue>,
    /// Snapshot of embedded structured data (JSON-LD), if a pass already ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<JsonValue>,
}

impl LinkPreview {
    /// An empty preview in the pending state.
    pub fn pending() -> Self {
        Self {
            status: PreviewStatus::Pending,
            title: None,
            description: None,
            site_name: None,
            author: None,
            published: None,
            image_url: None,
            raw: BTreeMap::new(),
            structured: None,
        }
    }

    /// Whether any rich field is populated.
    pub fn has_rich_fields(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.author.is_some()
            || self.site_name.is_some()
            || self.published.is_some()
    }
}

// =============================================================================
// LINK CATEGORY
// =============================================================================

/// Closed taxonomy of link content categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCategory {
    Book,
    Movie,
    Tv,
    Article,
    News,
    Podcast,
    Music,
    Product,
    Recipe,
    Course,
    Research,
    Event,
    Software,
    DesignPortfolio,
}

impl LinkCategory {
    /// All categories, for prompt assembly.
    pub const ALL: [LinkCategory; 14] = [
        LinkCategory::Book,
        LinkCategory::Movie,
        LinkCategory::Tv,
        LinkCategory::Article,
        LinkCategory::News,
        LinkCategory::Podcast,
        LinkCategory::Music,
        LinkCategory::Product,
        LinkCategory::Recipe,
        LinkCategory::Course,
        LinkCategory::Research,
        LinkCategory::Event,
        LinkCategory::Software,
        LinkCategory::DesignPortfolio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCategory::Book => "book",
            LinkCategory::Movie => "movie",
            LinkCategory::Tv => "tv",
            LinkCategory::Article => "article",
            LinkCategory::News => "news",
            LinkCategory::Podcast => "podcast",
            LinkCategory::Music => "music",
            LinkCategory::Product => "product",
            LinkCategory::Recipe => "recipe",
            LinkCategory::Course => "course",
            LinkCategory::Research => "research",
            LinkCategory::Event => "event",
            LinkCategory::Software => "software",
            LinkCategory::DesignPortfolio => "design_portfolio",
        }
    }

    /// Normalize a free-text label from the LLM back to the closed enum.
    ///
    /// Handles case, surrounding whitespace, space/hyphen variants, and a
    /// few common synonyms. Unrecognized labels return `None` and are
    /// rejected by the caller.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "book" | "books" | "ebook" => Some(LinkCategory::Book),
            "movie" | "film" => Some(LinkCategory::Movie),
            "tv" | "tv_show" | "tv_series" | "series" => Some(LinkCategory::Tv),
            "article" | "blog" | "blog_post" | "essay" => Some(LinkCategory::Article),
            "news" | "news_article" => Some(LinkCategory::News),
            "podcast" | "podcast_episode" => Some(LinkCategory::Podcast),
            "music" | "song" | "album" => Some(LinkCategory::Music),
            "product" | "shopping" => Some(LinkCategory::Product),
            "recipe" | "cooking" => Some(LinkCategory::Recipe),
            "course" | "tutorial" => Some(LinkCategory::Course),
            "research" | "paper" | "research_paper" => Some(LinkCategory::Research),
            "event" => Some(LinkCategory::Event),
            "software" | "app" | "tool" | "code" => Some(LinkCategory::Software),
            "design_portfolio" | "portfolio" | "design" => Some(LinkCategory::DesignPortfolio),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an enrichment fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    /// Extracted by a provider-specific routine from raw selector results.
    Provider,
    /// Extracted from embedded JSON-LD structured data.
    StructuredData,
}

/// A single labelled fact attached to a categorized link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFact {
    pub label: String,
    pub value: String,
    pub source: FactSource,
}

impl CardFact {
    pub fn new(label: impl Into<String>, value: impl Into<String>, source: FactSource) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            source,
        }
    }
}

/// Category metadata merged onto a link card after categorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCategoryMetadata {
    pub category: LinkCategory,
    /// Confidence of the AI classification, clamped to [0, 1].
    pub confidence: f32,
    /// Detected content provider ("github", "goodreads", or a bare hostname).
    pub detected_provider: Option<String>,
    /// Representative image selected during enrichment.
    pub image_url: Option<String>,
    /// Merged facts, deduplicated by (label, value).
    pub facts: Vec<CardFact>,
    /// Escape hatch for structured data we recognize but do not model.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, JsonValue>,
}

// =============================================================================
// MODEL PROVENANCE
// =============================================================================

/// Provenance stamp recording which model produced the AI fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub provider: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

// =============================================================================
// CARD
// =============================================================================

/// The unit of work enriched by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub card_type: CardType,
    pub content_text: String,
    pub url: Option<String>,
    pub file: Option<FileAttachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub colors: Option<Vec<PaletteColor>>,
    pub link_preview: Option<LinkPreview>,
    pub link_category: Option<LinkCategoryMetadata>,
    pub ai_tags: Option<Vec<String>>,
    pub ai_summary: Option<String>,
    pub ai_transcript: Option<String>,
    pub ai_model_meta: Option<ModelMeta>,
    pub processing_status: StageStatus,
    pub workflow_run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Whether the card is "URL-only": trimmed content empty or equal to
    /// its URL verbatim.
    pub fn is_url_only(&self) -> bool {
        match &self.url {
            Some(url) => {
                let trimmed = self.content_text.trim();
                trimmed.is_empty() || trimmed == url.trim()
            }
            None => false,
        }
    }
}

/// Request for creating a new card.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub owner_id: Uuid,
    pub card_type: CardType,
    pub content_text: String,
    pub url: Option<String>,
    pub file: Option<FileAttachment>,
    pub tags: Vec<String>,
}

impl NewCard {
    /// A plain text card; the initial type is a guess the pipeline refines.
    pub fn text(owner_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            owner_id,
            card_type: CardType::Text,
            content_text: content.into(),
            url: None,
            file: None,
            tags: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_type(mut self, card_type: CardType) -> Self {
        self.card_type = card_type;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

// =============================================================================
// CARD PATCH
// =============================================================================

/// A single-document atomic patch against a card.
///
/// Steps combine their business-logic fields and their stage transition in
/// one patch so status and content never disagree about a stage's
/// completion. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub card_type: Option<CardType>,
    pub colors: Option<Vec<PaletteColor>>,
    pub link_preview: Option<LinkPreview>,
    pub link_category: Option<LinkCategoryMetadata>,
    pub ai_tags: Option<Vec<String>>,
    pub ai_summary: Option<String>,
    pub ai_transcript: Option<String>,
    pub ai_model_meta: Option<ModelMeta>,
    /// Merge one stage record into the card's StageStatus.
    pub stage: Option<(Stage, StageRecord)>,
}

impl CardPatch {
    /// A patch that only transitions one stage.
    pub fn stage_only(stage: Stage, record: StageRecord) -> Self {
        Self {
            stage: Some((stage, record)),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: Stage, record: StageRecord) -> Self {
        self.stage = Some((stage, record));
        self
    }

    /// Whether the patch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.card_type.is_none()
            && self.colors.is_none()
            && self.link_preview.is_none()
            && self.link_category.is_none()
            && self.ai_tags.is_none()
            && self.ai_summary.is_none()
            && self.ai_transcript.is_none()
            && self.ai_model_meta.is_none()
            && self.stage.is_none()
    }
}

// =============================================================================
// WORKFLOW RUN
// =============================================================================

/// Opaque handle for one execution of the full pipeline over a card.
///
/// Used for observability and correlation only, never for business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Time-ordered (UUIDv7) run identifier.
    pub id: Uuid,
    pub card_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn begin(card_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            card_id,
            started_at: Utc::now(),
        }
    }
}
