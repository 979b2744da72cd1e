//! Renderables step: derived display artifacts.
//!
//! Only image cards with an attached file get a thumbnail today. The stage
//! completes for every type regardless; a card with nothing to render is
//! not a failure.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use curio_core::{
    defaults, CardPatch, CardStore, CardType, Error, Result, Stage, StageRecord, ThumbnailService,
};

/// Output of the renderables step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderables {
    pub thumbnail_generated: bool,
}

pub struct RenderablesStep {
    store: Arc<dyn CardStore>,
    thumbnails: Arc<dyn ThumbnailService>,
}

impl RenderablesStep {
    pub fn new(store: Arc<dyn CardStore>, thumbnails: Arc<dyn ThumbnailService>) -> Self {
        Self { store, thumbnails }
    }

    #[instrument(skip(self), fields(subsystem = "pipeline", component = "renderables", card_id = %card_id))]
    pub async fn run(&self, card_id: Uuid) -> Result<Renderables> {
        let card = self
            .store
            .get(card_id)
            .await?
            .ok_or(Error::CardNotFound(card_id))?;

        self.store
            .patch(
                card_id,
                CardPatch::stage_only(
                    Stage::Renderables,
                    StageRecord::in_progress(
                        Utc::now(),
                        Some(card.processing_status.get(Stage::Renderables)),
                    ),
                ),
            )
            .await?;

        let mut thumbnail_generated = false;
        if card.card_type == CardType::Image && card.file.is_some() {
            self.thumbnails.generate(card_id).await?;
            thumbnail_generated = true;
            info!("Thumbnail generated");
        } else {
            debug!(card_type = %card.card_type, "No renderable work for this card");
        }

        self.store
            .patch(
                card_id,
                CardPatch::stage_only(
                    Stage::Renderables,
                    StageRecord::completed(Utc::now(), defaults::CONFIDENCE_RENDERABLES),
                ),
            )
            .await?;

        Ok(Renderables {
            thumbnail_generated,
        })
    }
}
