//! Staged enrichment pipeline for cards.
//!
//! Four stages run in a fixed order per card: classify, categorize (link
//! cards only), metadata, renderables. The [`Orchestrator`] owns the
//! sequencing; each step owns its own persistence; the [`StepRunner`]
//! owns retries and deferral. The [`Reconciler`] restarts pipelines for
//! cards the first pass never enriched.

pub mod categorize;
pub mod classify;
pub mod executor;
pub mod fetch;
pub mod metadata;
pub mod orchestrator;
pub mod palette;
pub mod providers;
pub mod reconciler;
pub mod renderables;
pub mod structured_data;
pub mod testing;

pub use categorize::{Categorization, CategorizeStep};
pub use classify::{Classification, ClassifyStep};
pub use executor::{StepOutcome, StepRunner};
pub use fetch::HttpFetcher;
pub use metadata::{MetadataOutput, MetadataStep};
pub use orchestrator::{Orchestrator, PipelineDeps};
pub use reconciler::{ReconcileReport, Reconciler};
pub use renderables::{Renderables, RenderablesStep};
