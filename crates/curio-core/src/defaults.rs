//! Centralized default constants for the curio pipeline.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. When adding new constants, place them in the appropriate
//! section and document the rationale for the chosen value.

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Confidence assigned when a declared MIME type maps directly to a card type.
pub const CONFIDENCE_MIME_MATCH: f32 = 0.97;

/// Confidence for heuristic matches (URL extension, unmatched text/*,
/// document fallback, plain link).
pub const CONFIDENCE_HEURISTIC: f32 = 0.9;

/// Confidence for quote markup detection.
pub const CONFIDENCE_QUOTE: f32 = 0.95;

/// Confidence for regex-based palette detection.
pub const CONFIDENCE_PALETTE: f32 = 0.88;

/// Confidence for the plain-text fallback when nothing else matched.
pub const CONFIDENCE_TEXT_FALLBACK: f32 = 0.7;

/// Minimum confidence required to commit a type reclassification.
/// Sub-threshold reclassifications are discarded to prevent flapping.
pub const RECLASSIFY_THRESHOLD: f32 = 0.6;

/// Minimum color tokens for palette detection without a keyword hint.
pub const PALETTE_MIN_COLORS: usize = 3;

/// Minimum color tokens for palette detection with a keyword hint.
pub const PALETTE_MIN_COLORS_HINTED: usize = 2;

// =============================================================================
// CATEGORIZATION
// =============================================================================

/// Maximum characters of card content included in the categorization prompt.
pub const CATEGORIZE_EXCERPT_CHARS: usize = 4000;

/// Maximum bytes read from a linked page when fetching HTML for JSON-LD.
pub const HTML_FETCH_MAX_BYTES: usize = 250 * 1024;

/// Maximum JSON-LD entities parsed from a single page.
pub const STRUCTURED_DATA_MAX_ENTITIES: usize = 8;

// =============================================================================
// METADATA GENERATION
// =============================================================================

/// Delay before re-running metadata generation for a link card whose
/// preview fetch is still pending.
pub const METADATA_DEFER_MS: u64 = 30_000;

/// Confidence recorded when metadata generation completes with AI output.
pub const CONFIDENCE_METADATA: f32 = 0.95;

/// Confidence recorded when metadata completes without output
/// (e.g., transcription failed).
pub const CONFIDENCE_METADATA_EMPTY: f32 = 0.9;

// =============================================================================
// RENDERABLES
// =============================================================================

/// Confidence recorded for the renderables stage. Always applied, whether
/// or not a thumbnail was actually produced.
pub const CONFIDENCE_RENDERABLES: f32 = 0.95;

// =============================================================================
// RETRY POLICIES
// =============================================================================

/// Total attempts for the lenient policy (classification, metadata).
pub const RETRY_LENIENT_MAX_ATTEMPTS: u32 = 4;

/// Initial backoff for the lenient policy. With base 6.0 the delays run
/// 5 s, 30 s, 180 s.
pub const RETRY_LENIENT_INITIAL_MS: u64 = 5_000;

/// Backoff multiplier for the lenient policy.
pub const RETRY_LENIENT_BASE: f64 = 6.0;

/// Total attempts for the strict policy (categorization, renderables).
pub const RETRY_STRICT_MAX_ATTEMPTS: u32 = 2;

/// Initial backoff for the strict policy.
pub const RETRY_STRICT_INITIAL_MS: u64 = 10_000;

/// Backoff multiplier for the strict policy.
pub const RETRY_STRICT_BASE: f64 = 3.0;

/// Maximum deferrals per step invocation. Deferrals do not consume retry
/// attempts, so they need their own bound to guarantee termination.
pub const STEP_MAX_DEFERS: u32 = 10;

// =============================================================================
// RECONCILER
// =============================================================================

/// Grace window before a card with no AI provenance is considered stalled.
/// Avoids racing pipelines that are still running on fresh creations.
pub const RECONCILE_GRACE_SECS: i64 = 300;

/// Maximum cards resubmitted per backfill invocation.
pub const RECONCILE_BATCH_LIMIT: usize = 50;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Default vision-capable model name (Ollama).
pub const VISION_MODEL: &str = "qwen3-vl:8b";

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Target tag count for generated metadata.
pub const METADATA_TAG_COUNT: &str = "5-6";
