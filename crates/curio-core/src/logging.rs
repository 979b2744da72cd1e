//! Structured logging schema and field name constants for curio.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "pipeline", "inference", "store", "reconciler"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "classify", "categorize", "metadata", "renderables", "ollama"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "start", "run_step", "backfill", "generate_structured"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Card UUID being enriched.
pub const CARD_ID: &str = "card_id";

/// Workflow run UUID (v7, time-ordered).
pub const RUN_ID: &str = "run_id";

/// Pipeline stage name.
pub const STAGE: &str = "stage";

/// Card type as classified.
pub const CARD_TYPE: &str = "card_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Retry attempt number (0-based).
pub const ATTEMPT: &str = "attempt";

/// Scheduled delay before the next attempt, in milliseconds.
pub const DELAY_MS: &str = "delay_ms";

/// Classification/categorization confidence in [0, 1].
pub const CONFIDENCE: &str = "confidence";

/// Byte length of a prompt or response.
pub const PROMPT_LEN: &str = "prompt_len";

/// Number of facts extracted during enrichment.
pub const FACT_COUNT: &str = "fact_count";

/// Initialize the global tracing subscriber from `RUST_LOG`.
///
/// Defaults to `info` when the variable is unset. Idempotent: a second
/// call (another test, an embedding host that already installed a
/// subscriber) is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
