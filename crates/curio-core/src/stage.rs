//! Per-card stage status model.
//!
//! Every card carries a [`StageStatus`]: one [`StageRecord`] per pipeline
//! stage. Records transition `pending → in_progress → {completed | failed}`
//! and a completed record is never silently downgraded; only an explicit
//! pipeline re-run resets the whole object back to its initial seeding.
//!
//! The JSON shape round-trips exactly through the card store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CardType;

/// The four named pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Categorize,
    Metadata,
    Renderables,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 4] = [
        Stage::Classify,
        Stage::Categorize,
        Stage::Metadata,
        Stage::Renderables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Categorize => "categorize",
            Stage::Metadata => "metadata",
            Stage::Renderables => "renderables",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Durable record of one stage's progress on one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Decision confidence in [0, 1], where the stage produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// A fresh, untouched record.
    pub fn pending() -> Self {
        Self {
            status: StageState::Pending,
            started_at: None,
            completed_at: None,
            confidence: None,
            error: None,
        }
    }

    /// Mark a stage as running. Preserves prior confidence and start time
    /// when re-entering an already-started stage.
    pub fn in_progress(now: DateTime<Utc>, previous: Option<&StageRecord>) -> Self {
        Self {
            status: StageState::InProgress,
            started_at: previous.and_then(|p| p.started_at).or(Some(now)),
            completed_at: None,
            confidence: previous.and_then(|p| p.confidence),
            error: None,
        }
    }

    /// Mark a stage as completed with the given confidence.
    pub fn completed(now: DateTime<Utc>, confidence: f32) -> Self {
        Self {
            status: StageState::Completed,
            started_at: None,
            completed_at: Some(now),
            confidence: Some(confidence.clamp(0.0, 1.0)),
            error: None,
        }
    }

    /// Mark a stage as failed, carrying the error message. Preserves the
    /// prior start time so elapsed time stays observable.
    pub fn failed(now: DateTime<Utc>, error: impl Into<String>, previous: Option<&StageRecord>) -> Self {
        Self {
            status: StageState::Failed,
            started_at: previous.and_then(|p| p.started_at),
            completed_at: Some(now),
            confidence: previous.and_then(|p| p.confidence),
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StageState::Completed
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StageState::Completed | StageState::Failed)
    }
}

/// The full per-card stage map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub classify: StageRecord,
    pub categorize: StageRecord,
    pub metadata: StageRecord,
    pub renderables: StageRecord,
}

impl StageStatus {
    /// Initial status for a newly created (or reset) card, seeded from its
    /// guessed type.
    ///
    /// Stages that cannot apply to the type are pre-seeded `completed` at
    /// confidence 1.0: `categorize` unless the card is a link,
    /// `renderables` unless the type carries renderables. `classify` and
    /// `metadata` always start pending.
    pub fn initial(card_type: CardType, now: DateTime<Utc>) -> Self {
        let pre_completed = StageRecord::completed(now, 1.0);
        Self {
            classify: StageRecord::pending(),
            categorize: if card_type == CardType::Link {
                StageRecord::pending()
            } else {
                pre_completed.clone()
            },
            metadata: StageRecord::pending(),
            renderables: if card_type.has_renderables() {
                StageRecord::pending()
            } else {
                pre_completed
            },
        }
    }

    pub fn get(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::Classify => &self.classify,
            Stage::Categorize => &self.categorize,
            Stage::Metadata => &self.metadata,
            Stage::Renderables => &self.renderables,
        }
    }

    pub fn set(&mut self, stage: Stage, record: StageRecord) {
        match stage {
            Stage::Classify => self.classify = record,
            Stage::Categorize => self.categorize = record,
            Stage::Metadata => self.metadata = record,
            Stage::Renderables => self.renderables = record,
        }
    }

    /// Overall completion: every stage completed. No separate success flag
    /// is persisted anywhere.
    pub fn all_completed(&self) -> bool {
        Stage::ALL.iter().all(|s| self.get(*s).is_completed())
    }

    /// Stages that ended in failure.
    pub fn failed_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .filter(|s| self.get(*s).status == StageState::Failed)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_record_is_empty() {
        let r = StageRecord::pending();
        assert_eq!(r.status, StageState::Pending);
        assert!(r.started_at.is_none());
        assert!(r.confidence.is_none());
        assert!(r.error.is_none());
    }

    #[test]
    fn in_progress_preserves_prior_confidence_and_start() {
        let t0 = Utc::now();
        let first = StageRecord::in_progress(t0, None);
        assert_eq!(first.started_at, Some(t0));

        let completed = StageRecord::completed(t0, 0.9);
        let t1 = t0 + chrono::Duration::seconds(10);
        let rerun = StageRecord::in_progress(t1, Some(&completed));
        assert_eq!(rerun.confidence, Some(0.9));
        // completed() drops started_at, so the rerun stamps a new one
        assert_eq!(rerun.started_at, Some(t1));
    }

    #[test]
    fn completed_clamps_confidence() {
        let now = Utc::now();
        assert_eq!(StageRecord::completed(now, 1.5).confidence, Some(1.0));
        assert_eq!(StageRecord::completed(now, -0.2).confidence, Some(0.0));
    }

    #[test]
    fn failed_carries_error_and_prior_start() {
        let t0 = Utc::now();
        let running = StageRecord::in_progress(t0, None);
        let t1 = t0 + chrono::Duration::seconds(5);
        let failed = StageRecord::failed(t1, "llm timeout", Some(&running));
        assert_eq!(failed.status, StageState::Failed);
        assert_eq!(failed.error.as_deref(), Some("llm timeout"));
        assert_eq!(failed.started_at, Some(t0));
        assert_eq!(failed.completed_at, Some(t1));
    }

    #[test]
    fn initial_seeding_for_text() {
        let s = StageStatus::initial(CardType::Text, Utc::now());
        assert_eq!(s.classify.status, StageState::Pending);
        assert_eq!(s.metadata.status, StageState::Pending);
        assert!(s.categorize.is_completed());
        assert_eq!(s.categorize.confidence, Some(1.0));
        assert!(s.renderables.is_completed());
        assert_eq!(s.renderables.confidence, Some(1.0));
    }

    #[test]
    fn initial_seeding_for_link() {
        let s = StageStatus::initial(CardType::Link, Utc::now());
        assert_eq!(s.categorize.status, StageState::Pending);
        assert!(s.renderables.is_completed());
    }

    #[test]
    fn initial_seeding_for_image() {
        let s = StageStatus::initial(CardType::Image, Utc::now());
        assert!(s.categorize.is_completed());
        assert_eq!(s.renderables.status, StageState::Pending);
    }

    #[test]
    fn initial_seeding_for_quote() {
        let s = StageStatus::initial(CardType::Quote, Utc::now());
        assert!(s.categorize.is_completed());
        assert!(s.renderables.is_completed());
        assert_eq!(s.metadata.status, StageState::Pending);
    }

    #[test]
    fn all_completed_requires_every_stage() {
        let now = Utc::now();
        let mut s = StageStatus::initial(CardType::Text, now);
        assert!(!s.all_completed());
        s.set(Stage::Classify, StageRecord::completed(now, 0.9));
        assert!(!s.all_completed());
        s.set(Stage::Metadata, StageRecord::completed(now, 0.95));
        assert!(s.all_completed());
    }

    #[test]
    fn failed_stages_listing() {
        let now = Utc::now();
        let mut s = StageStatus::initial(CardType::Link, now);
        s.set(Stage::Categorize, StageRecord::failed(now, "boom", None));
        assert_eq!(s.failed_stages(), vec![Stage::Categorize]);
    }

    #[test]
    fn stage_status_round_trips_through_json() {
        let now = Utc::now();
        let mut s = StageStatus::initial(CardType::Link, now);
        s.set(Stage::Classify, StageRecord::completed(now, 0.9));
        s.set(Stage::Categorize, StageRecord::failed(now, "timeout", None));

        let json = serde_json::to_string(&s).unwrap();
        let back: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Classify).unwrap(), "\"classify\"");
        assert_eq!(
            serde_json::to_string(&StageState::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
