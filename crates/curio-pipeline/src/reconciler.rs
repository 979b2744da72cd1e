//! Backfill reconciler: re-runs the pipeline for cards that never got
//! their AI enrichment.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use curio_core::{defaults, Caller, CardStore, Error, Result, WorkflowRun};

use crate::orchestrator::Orchestrator;

/// What one reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Cards matched by the scan.
    pub scanned: usize,
    /// Cards whose pipeline was restarted.
    pub restarted: usize,
}

pub struct Reconciler {
    store: Arc<dyn CardStore>,
    orchestrator: Arc<Orchestrator>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CardStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// Scan for cards older than the grace window with no model-provenance
    /// stamp and restart their pipelines, bounded to one batch.
    ///
    /// Safe to call repeatedly; `start` resets each card before re-running.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "reconciler"))]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let cutoff = Utc::now() - ChronoDuration::seconds(defaults::RECONCILE_GRACE_SECS);
        let ids = self
            .store
            .find_unenriched(cutoff, defaults::RECONCILE_BATCH_LIMIT)
            .await?;

        let mut report = ReconcileReport {
            scanned: ids.len(),
            restarted: 0,
        };
        for id in ids {
            match self.orchestrator.start(id).await {
                Ok(run) => {
                    report.restarted += 1;
                    info!(card_id = %id, run_id = %run.id, "Reconciled card");
                }
                // One stuck card must not starve the rest of the batch.
                Err(e) => warn!(card_id = %id, error = %e, "Reconcile restart failed"),
            }
        }
        info!(
            scanned = report.scanned,
            restarted = report.restarted,
            "Reconcile pass finished"
        );
        Ok(report)
    }

    /// Restart the pipeline for a single card on behalf of a caller who
    /// must own or administer it.
    #[instrument(skip(self, caller), fields(subsystem = "pipeline", component = "reconciler", card_id = %card_id))]
    pub async fn retry_card(&self, caller: &Caller, card_id: Uuid) -> Result<WorkflowRun> {
        let card = self
            .store
            .get(card_id)
            .await?
            .filter(|c| c.deleted_at.is_none())
            .ok_or(Error::CardNotFound(card_id))?;

        if !caller.can_access(card.owner_id) {
            return Err(Error::Forbidden(
                "caller does not own or administer this card".to_string(),
            ));
        }

        self.orchestrator.start(card_id).await
    }
}
