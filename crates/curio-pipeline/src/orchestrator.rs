//! Workflow orchestrator: one linear pass over the four pipeline stages.
//!
//! `start` resets the card's enrichment state first, so every run begins
//! from the same baseline regardless of what a previous run left behind.
//! Stage failures are independent; a failed categorize never blocks
//! metadata or renderables.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use curio_core::{
    BlobStore, Card, CardPatch, CardStore, CardType, Error, HtmlFetch, InferenceBackend,
    LinkPreviewService, Result, RetryPolicy, Scheduler, Stage, StageRecord, StageStatus,
    ThumbnailService, TranscriptService, WorkflowRun,
};

use crate::categorize::CategorizeStep;
use crate::classify::{Classification, ClassifyStep};
use crate::executor::{StepOutcome, StepRunner};
use crate::metadata::MetadataStep;
use crate::renderables::RenderablesStep;

/// Everything the pipeline needs, injected once at construction.
pub struct PipelineDeps {
    pub store: Arc<dyn CardStore>,
    pub inference: Arc<dyn InferenceBackend>,
    pub scheduler: Arc<dyn Scheduler>,
    pub blobs: Arc<dyn BlobStore>,
    pub transcripts: Arc<dyn TranscriptService>,
    pub thumbnails: Arc<dyn ThumbnailService>,
    pub previews: Arc<dyn LinkPreviewService>,
    pub fetcher: Arc<dyn HtmlFetch>,
}

pub struct Orchestrator {
    store: Arc<dyn CardStore>,
    scheduler: Arc<dyn Scheduler>,
    classify: ClassifyStep,
    categorize: CategorizeStep,
    metadata: MetadataStep,
    renderables: RenderablesStep,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps) -> Self {
        let classify = ClassifyStep::new(
            deps.store.clone(),
            deps.inference.clone(),
            deps.previews.clone(),
        );
        let categorize = CategorizeStep::new(
            deps.store.clone(),
            deps.inference.clone(),
            deps.fetcher.clone(),
        );
        let metadata = MetadataStep::new(
            deps.store.clone(),
            deps.inference.clone(),
            deps.blobs.clone(),
            deps.transcripts.clone(),
        );
        let renderables = RenderablesStep::new(deps.store.clone(), deps.thumbnails.clone());
        Self {
            store: deps.store,
            scheduler: deps.scheduler,
            classify,
            categorize,
            metadata,
            renderables,
        }
    }

    /// Reset the card's enrichment state and run the pipeline end to end.
    ///
    /// Returns the run handle attached to the card. Overall completion is
    /// derivable from the per-stage statuses; no separate success flag is
    /// persisted.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "orchestrator", card_id = %card_id))]
    pub async fn start(&self, card_id: Uuid) -> Result<WorkflowRun> {
        let card = self
            .store
            .get(card_id)
            .await?
            .ok_or(Error::CardNotFound(card_id))?;

        let run = WorkflowRun::begin(card_id);
        let baseline = StageStatus::initial(card.card_type, Utc::now());
        self.store
            .reset_enrichment(card_id, baseline, run.id)
            .await?;
        info!(run_id = %run.id, card_type = %card.card_type, "Workflow run started");

        // 1. Classify. Only a vanished card aborts the run.
        let classification = match self
            .runner(RetryPolicy::lenient())
            .run("classify", move |_| self.classify_once(card_id))
            .await
        {
            Ok(c) => c,
            Err(e @ Error::CardNotFound(_)) => return Err(e),
            Err(e) => {
                self.fail_stage(card_id, Stage::Classify, &e).await?;
                // Derive the downstream flags from whatever type is
                // persisted, so the rest of the pipeline still runs.
                let card = self
                    .store
                    .get(card_id)
                    .await?
                    .ok_or(Error::CardNotFound(card_id))?;
                flags_for(&card)
            }
        };

        // 2. Categorize, link cards only.
        if classification.should_categorize {
            let outcome = self
                .runner(RetryPolicy::strict())
                .run("categorize", move |_| self.categorize_once(card_id))
                .await;
            if let Err(e) = outcome {
                self.fail_stage(card_id, Stage::Categorize, &e).await?;
            }
        }

        // 3. Metadata, always.
        if classification.should_generate_metadata {
            let outcome = self
                .runner(RetryPolicy::lenient())
                .run("metadata", move |_| self.metadata.run(card_id))
                .await;
            if let Err(e) = outcome {
                self.fail_stage(card_id, Stage::Metadata, &e).await?;
            }
        }

        // 4. Renderables, image/video/document only.
        if classification.should_generate_renderables {
            let outcome = self
                .runner(RetryPolicy::strict())
                .run("renderables", move |_| self.renderables_once(card_id))
                .await;
            if let Err(e) = outcome {
                self.fail_stage(card_id, Stage::Renderables, &e).await?;
            }
        }

        match self.store.get(card_id).await? {
            Some(card) => {
                let failed = card.processing_status.failed_stages();
                if failed.is_empty() {
                    info!(run_id = %run.id, "Workflow run finished");
                } else {
                    warn!(run_id = %run.id, ?failed, "Workflow run finished with failed stages");
                }
            }
            None => warn!(run_id = %run.id, "Card deleted mid-run"),
        }

        Ok(run)
    }

    fn runner(&self, policy: RetryPolicy) -> StepRunner {
        StepRunner::new(self.scheduler.clone(), policy)
    }

    async fn classify_once(&self, card_id: Uuid) -> Result<StepOutcome<Classification>> {
        self.classify.run(card_id).await.map(StepOutcome::Done)
    }

    async fn categorize_once(
        &self,
        card_id: Uuid,
    ) -> Result<StepOutcome<crate::categorize::Categorization>> {
        self.categorize.run(card_id).await.map(StepOutcome::Done)
    }

    async fn renderables_once(
        &self,
        card_id: Uuid,
    ) -> Result<StepOutcome<crate::renderables::Renderables>> {
        self.renderables.run(card_id).await.map(StepOutcome::Done)
    }

    /// Record exhausted retries as a failed stage and move on.
    async fn fail_stage(&self, card_id: Uuid, stage: Stage, err: &Error) -> Result<()> {
        error!(stage = stage.as_str(), error = %err, "Stage failed after retries");
        let previous = self
            .store
            .get(card_id)
            .await?
            .map(|c| c.processing_status.get(stage).clone());
        self.store
            .patch(
                card_id,
                CardPatch::stage_only(
                    stage,
                    StageRecord::failed(Utc::now(), err.to_string(), previous.as_ref()),
                ),
            )
            .await
    }
}

/// Downstream flags derived from the persisted card type, used when
/// classification itself failed.
fn flags_for(card: &Card) -> Classification {
    Classification {
        card_type: card.card_type,
        confidence: 0.0,
        needs_link_preview: false,
        should_categorize: card.card_type == CardType::Link,
        should_generate_metadata: true,
        should_generate_renderables: card.card_type.has_renderables(),
    }
}
