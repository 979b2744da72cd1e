//! End-to-end pipeline tests against the in-memory store and the mock
//! inference backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use curio_core::{
    Caller, CardStore, CardType, Error, FileAttachment, InMemoryCardStore, InstantScheduler,
    LinkCategory, LinkPreview, NewCard, PaletteColor, PreviewStatus, RetryPolicy, Stage,
    StageState,
};
use curio_inference::MockInferenceBackend;
use curio_pipeline::testing::{
    FlakyPreviews, RecordingPreviews, RecordingThumbnails, StaticBlobStore, StaticFetcher,
    StaticTranscripts,
};
use curio_pipeline::{
    CategorizeStep, MetadataStep, Orchestrator, PipelineDeps, Reconciler, StepOutcome, StepRunner,
};
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryCardStore>,
    inference: Arc<MockInferenceBackend>,
    scheduler: Arc<InstantScheduler>,
    previews: Arc<RecordingPreviews>,
    thumbnails: Arc<RecordingThumbnails>,
    orchestrator: Arc<Orchestrator>,
}

fn metadata_reply() -> serde_json::Value {
    json!({"tags": ["alpha", "beta"], "summary": "A short summary."})
}

fn harness() -> Harness {
    harness_with(StaticFetcher::new(), StaticTranscripts::ok("a transcript"))
}

fn harness_with(fetcher: StaticFetcher, transcripts: StaticTranscripts) -> Harness {
    curio_core::logging::init_tracing();
    let store = Arc::new(InMemoryCardStore::new());
    let inference =
        Arc::new(MockInferenceBackend::new().with_default_response(metadata_reply()));
    let scheduler = Arc::new(InstantScheduler::new());
    let previews = Arc::new(RecordingPreviews::new());
    let thumbnails = Arc::new(RecordingThumbnails::new());

    let orchestrator = Arc::new(Orchestrator::new(PipelineDeps {
        store: store.clone(),
        inference: inference.clone(),
        scheduler: scheduler.clone(),
        blobs: Arc::new(StaticBlobStore::new().with_url("blob-1", "https://blobs.test/blob-1")),
        transcripts: Arc::new(transcripts),
        thumbnails: thumbnails.clone(),
        previews: previews.clone(),
        fetcher: Arc::new(fetcher),
    }));

    Harness {
        store,
        inference,
        scheduler,
        previews,
        thumbnails,
        orchestrator,
    }
}

#[tokio::test]
async fn text_card_runs_all_stages_to_completion() {
    let h = harness();
    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), "notes about gardening and soil"))
        .await
        .unwrap();

    // Palette regex finds nothing, so classification falls back to the LLM
    // color extraction once before settling on text.
    h.inference.push_ok(json!({"colors": []}));

    let run = h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Text);
    assert_eq!(card.workflow_run_id, Some(run.id));
    assert!(card.processing_status.all_completed());
    assert_eq!(card.ai_tags.as_deref(), Some(&["alpha".to_string(), "beta".to_string()][..]));
    assert_eq!(card.ai_summary.as_deref(), Some("A short summary."));
    assert!(card.ai_model_meta.is_some());
    // No thumbnails, no previews for a plain text card.
    assert!(h.thumbnails.requests().is_empty());
    assert!(h.previews.requests().is_empty());
}

#[tokio::test]
async fn quote_card_classifies_without_heuristic_model_calls() {
    let h = harness();
    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), "> A wise quote"))
        .await
        .unwrap();

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Quote);
    let classify = card.processing_status.get(Stage::Classify);
    assert_eq!(classify.status, StageState::Completed);
    assert_eq!(classify.confidence, Some(0.95));
    // Non-link, non-renderable: those stages were pre-seeded completed.
    assert!(card.processing_status.get(Stage::Categorize).is_completed());
    assert!(card.processing_status.get(Stage::Renderables).is_completed());
    // The only model call is metadata generation; the quote branch never
    // reaches the palette fallback.
    assert_eq!(h.inference.call_count(), 1);

    // Sticky quote: a second full run still reports quote.
    h.orchestrator.start(id).await.unwrap();
    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Quote);
    assert_eq!(
        card.processing_status.get(Stage::Classify).confidence,
        Some(0.95)
    );
}

#[tokio::test]
async fn url_only_card_becomes_link_and_requests_preview() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "https://example.com")
                .with_url("https://example.com"),
        )
        .await
        .unwrap();

    // Categorization: hostname fallback, no provider hint from the model.
    h.inference
        .push_ok(json!({"category": "article", "confidence": 0.8}));

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Link);
    assert_eq!(
        card.processing_status.get(Stage::Classify).confidence,
        Some(0.9)
    );
    assert_eq!(h.previews.requests(), vec![id]);

    let category = card.link_category.as_ref().expect("categorized");
    assert_eq!(category.category, LinkCategory::Article);
    assert_eq!(category.detected_provider.as_deref(), Some("example.com"));

    // No preview ever arrived, so metadata deferred until the cap and the
    // stage ended failed; deferral delays are the fixed 30 s.
    assert_eq!(
        card.processing_status.get(Stage::Metadata).status,
        StageState::Failed
    );
    assert!(h
        .scheduler
        .recorded()
        .iter()
        .all(|d| *d == Duration::from_secs(30)));
}

#[tokio::test]
async fn link_with_ready_preview_generates_metadata_from_it() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "https://example.com/story")
                .with_url("https://example.com/story"),
        )
        .await
        .unwrap();

    let mut card = h.store.get(id).await.unwrap().unwrap();
    let mut preview = LinkPreview::pending();
    preview.status = PreviewStatus::Ready;
    preview.title = Some("A Big Story".to_string());
    preview.description = Some("What happened and why.".to_string());
    card.link_preview = Some(preview);
    h.store.put(card).await;

    h.inference
        .push_ok(json!({"category": "news", "confidence": 0.9}));

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert!(card.processing_status.get(Stage::Metadata).is_completed());
    assert_eq!(card.ai_summary.as_deref(), Some("A short summary."));

    // The metadata prompt was assembled from the preview fields.
    let calls = h.inference.calls();
    let metadata_call = calls.last().unwrap();
    assert!(metadata_call.prompt.contains("Title: A Big Story"));
    assert!(metadata_call.prompt.contains("Description: What happened and why."));
}

#[tokio::test]
async fn image_card_gets_vision_metadata_and_thumbnail() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "sunset photo")
                .with_type(CardType::Image)
                .with_file(FileAttachment {
                    file_ref: "blob-1".to_string(),
                    mime_type: Some("image/jpeg".to_string()),
                    filename: Some("sunset.jpg".to_string()),
                }),
        )
        .await
        .unwrap();

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Image);
    assert!(card.processing_status.all_completed());
    assert_eq!(h.thumbnails.requests(), vec![id]);

    let calls = h.inference.calls();
    let vision_call = calls
        .iter()
        .find(|c| c.image_url.is_some())
        .expect("vision call");
    assert_eq!(
        vision_call.image_url.as_deref(),
        Some("https://blobs.test/blob-1")
    );
}

#[tokio::test]
async fn video_card_metadata_completes_from_content() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "screen recording of the demo walkthrough")
                .with_type(CardType::Video)
                .with_file(FileAttachment {
                    file_ref: "blob-1".to_string(),
                    mime_type: Some("video/mp4".to_string()),
                    filename: Some("demo.mp4".to_string()),
                }),
        )
        .await
        .unwrap();

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Video);
    assert!(card.processing_status.all_completed());
    assert_eq!(card.ai_summary.as_deref(), Some("A short summary."));
    assert!(card.ai_transcript.is_none());

    // The video's own text is what feeds the generic metadata path.
    let calls = h.inference.calls();
    let metadata_call = calls.last().unwrap();
    assert!(metadata_call.prompt.contains("demo walkthrough"));
    assert!(metadata_call.image_url.is_none());
}

#[tokio::test]
async fn audio_card_transcript_feeds_metadata() {
    let h = harness_with(StaticFetcher::new(), StaticTranscripts::ok("spoken words"));
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "")
                .with_type(CardType::Audio)
                .with_file(FileAttachment {
                    file_ref: "blob-1".to_string(),
                    mime_type: Some("audio/mpeg".to_string()),
                    filename: None,
                }),
        )
        .await
        .unwrap();

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.ai_transcript.as_deref(), Some("spoken words"));
    assert!(card.ai_summary.is_some());
    let calls = h.inference.calls();
    assert!(calls.iter().any(|c| c.prompt.contains("spoken words")));
}

#[tokio::test]
async fn audio_transcription_failure_is_non_fatal() {
    let h = harness_with(StaticFetcher::new(), StaticTranscripts::failing("asr down"));
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "")
                .with_type(CardType::Audio)
                .with_file(FileAttachment {
                    file_ref: "blob-1".to_string(),
                    mime_type: Some("audio/mpeg".to_string()),
                    filename: None,
                }),
        )
        .await
        .unwrap();

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    // The stage completes without AI fields rather than failing the run.
    assert!(card.processing_status.get(Stage::Metadata).is_completed());
    assert!(card.ai_tags.is_none());
    assert!(card.ai_summary.is_none());
    assert!(card.ai_transcript.is_none());
}

#[tokio::test]
async fn categorize_on_non_link_card_fails_fast() {
    let h = harness();
    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), "plain text"))
        .await
        .unwrap();

    let step = CategorizeStep::new(
        h.store.clone(),
        h.inference.clone(),
        Arc::new(StaticFetcher::new()),
    );
    let err = step.run(id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let card = h.store.get(id).await.unwrap().unwrap();
    assert!(card.link_category.is_none());
    assert_eq!(h.inference.call_count(), 0);
}

#[tokio::test]
async fn categorization_enriches_from_json_ld() {
    let url = "https://books.example.com/dune";
    let page = r#"<html><head><script type="application/ld+json">
        {"@type":"Book","name":"Dune","author":{"name":"Frank Herbert"},
         "aggregateRating":{"ratingValue":4.27},
         "image":"https://covers.example.com/dune.jpg"}
        </script></head></html>"#;
    let h = harness_with(
        StaticFetcher::new().with_page(url, page.as_bytes().to_vec()),
        StaticTranscripts::ok(""),
    );

    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), url).with_url(url))
        .await
        .unwrap();
    // Force the card to link up front so we can call the step directly.
    let mut card = h.store.get(id).await.unwrap().unwrap();
    card.card_type = CardType::Link;
    h.store.put(card).await;

    h.inference
        .push_ok(json!({"category": "book", "confidence": 0.92}));

    let step = CategorizeStep::new(
        h.store.clone(),
        h.inference.clone(),
        Arc::new(StaticFetcher::new().with_page(url, page.as_bytes().to_vec())),
    );
    let result = step.run(id).await.unwrap();

    assert_eq!(result.category, LinkCategory::Book);
    assert_eq!(
        result.image_url.as_deref(),
        Some("https://covers.example.com/dune.jpg")
    );
    assert!(result.fact_count >= 2);

    let card = h.store.get(id).await.unwrap().unwrap();
    let meta = card.link_category.unwrap();
    assert!(meta
        .facts
        .iter()
        .any(|f| f.label == "author" && f.value == "Frank Herbert"));
    // The JSON-LD snapshot was persisted back onto the preview.
    assert!(card.link_preview.unwrap().structured.is_some());
}

#[tokio::test]
async fn categorization_survives_fetch_failure() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "https://example.com/x")
                .with_url("https://example.com/x")
                .with_type(CardType::Link),
        )
        .await
        .unwrap();

    h.inference
        .push_ok(json!({"category": "article", "confidence": 0.7}));

    // The harness fetcher has no canned pages, so the structured-data fetch
    // errors; the step must still complete.
    let step = CategorizeStep::new(
        h.store.clone(),
        h.inference.clone(),
        Arc::new(StaticFetcher::new()),
    );
    let result = step.run(id).await.unwrap();
    assert_eq!(result.category, LinkCategory::Article);
    assert_eq!(result.fact_count, 0);

    let card = h.store.get(id).await.unwrap().unwrap();
    assert!(card.processing_status.get(Stage::Categorize).is_completed());
}

#[tokio::test]
async fn palette_card_skips_redundant_color_write() {
    let h = harness();
    let content = "sunset palette: #FF5733 #C70039 #900C3F";
    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), content))
        .await
        .unwrap();

    // First pass: classification commits palette and writes the colors.
    h.orchestrator.start(id).await.unwrap();
    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Palette);
    let colors = card.colors.clone().unwrap();
    assert_eq!(
        colors,
        vec![
            PaletteColor::new("#FF5733"),
            PaletteColor::new("#C70039"),
            PaletteColor::new("#900C3F"),
        ]
    );
    let writes_before = h
        .store
        .patch_log()
        .iter()
        .filter(|(_, p)| p.colors.is_some())
        .count();
    assert_eq!(writes_before, 1);

    // Second pass: the card is already a palette, so the type does not
    // change and no color write happens.
    h.orchestrator.start(id).await.unwrap();
    let writes_after = h
        .store
        .patch_log()
        .iter()
        .filter(|(_, p)| p.colors.is_some())
        .count();
    assert_eq!(writes_after, 1);

    // A pre-seeded identical color list also skips the write when the type
    // does change.
    let id2 = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), content))
        .await
        .unwrap();
    let mut card2 = h.store.get(id2).await.unwrap().unwrap();
    card2.colors = Some(vec![
        PaletteColor::new("#FF5733"),
        PaletteColor::new("#C70039"),
        PaletteColor::new("#900C3F"),
    ]);
    h.store.put(card2).await;

    h.orchestrator.start(id2).await.unwrap();
    let card2 = h.store.get(id2).await.unwrap().unwrap();
    assert_eq!(card2.card_type, CardType::Palette);
    let id2_color_writes = h
        .store
        .patch_log()
        .iter()
        .filter(|(pid, p)| *pid == id2 && p.colors.is_some())
        .count();
    assert_eq!(id2_color_writes, 0);
}

#[tokio::test]
async fn metadata_retry_backoff_totals_policy_delays() {
    let h = harness();
    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), "retry me").with_type(CardType::Quote))
        .await
        .unwrap();

    h.inference.push_err("model timeout");
    h.inference.push_err("model timeout");
    h.inference.push_ok(metadata_reply());

    let step = MetadataStep::new(
        h.store.clone(),
        h.inference.clone(),
        Arc::new(StaticBlobStore::new()),
        Arc::new(StaticTranscripts::ok("")),
    );
    let step = &step;
    let runner = StepRunner::new(h.scheduler.clone(), RetryPolicy::lenient());
    let output = runner
        .run("metadata", move |_| step.run(id))
        .await
        .unwrap();

    assert_eq!(output.ai_tags, vec!["alpha".to_string(), "beta".to_string()]);
    let card = h.store.get(id).await.unwrap().unwrap();
    assert!(card.ai_tags.is_some());
    assert!(card.ai_summary.is_some());
    assert_eq!(h.scheduler.total(), Duration::from_secs(35));
}

#[tokio::test]
async fn classification_retries_transient_failures_with_lenient_backoff() {
    curio_core::logging::init_tracing();
    let store = Arc::new(InMemoryCardStore::new());
    let inference =
        Arc::new(MockInferenceBackend::new().with_default_response(metadata_reply()));
    let scheduler = Arc::new(InstantScheduler::new());
    // The preview service drops the first two requests, so classification
    // only lands on its third attempt.
    let previews = Arc::new(FlakyPreviews::failing_times(2));
    let orchestrator = Orchestrator::new(PipelineDeps {
        store: store.clone(),
        inference: inference.clone(),
        scheduler: scheduler.clone(),
        blobs: Arc::new(StaticBlobStore::new()),
        transcripts: Arc::new(StaticTranscripts::ok("")),
        thumbnails: Arc::new(RecordingThumbnails::new()),
        previews: previews.clone(),
        fetcher: Arc::new(StaticFetcher::new()),
    });

    let id = store
        .insert(
            NewCard::text(Uuid::new_v4(), "https://example.com")
                .with_url("https://example.com"),
        )
        .await
        .unwrap();
    inference.push_ok(json!({"category": "article", "confidence": 0.8}));

    orchestrator.start(id).await.unwrap();

    let card = store.get(id).await.unwrap().unwrap();
    assert_eq!(card.card_type, CardType::Link);
    assert!(card.processing_status.get(Stage::Classify).is_completed());
    assert_eq!(previews.requests(), vec![id]);
    // Two attempts failed, so classification used the generous escalating
    // backoff rather than the short two-attempt policy.
    assert_eq!(
        &scheduler.recorded()[..2],
        &[Duration::from_secs(5), Duration::from_secs(30)]
    );
}

#[tokio::test]
async fn failed_categorize_does_not_block_metadata() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "https://example.com")
                .with_url("https://example.com"),
        )
        .await
        .unwrap();

    let mut card = h.store.get(id).await.unwrap().unwrap();
    let mut preview = LinkPreview::pending();
    preview.status = PreviewStatus::Ready;
    preview.title = Some("A Page".to_string());
    card.link_preview = Some(preview);
    h.store.put(card).await;

    // Both categorize attempts under the strict policy fail.
    h.inference.push_err("model down");
    h.inference.push_err("model down");

    h.orchestrator.start(id).await.unwrap();

    let card = h.store.get(id).await.unwrap().unwrap();
    let categorize = card.processing_status.get(Stage::Categorize);
    assert_eq!(categorize.status, StageState::Failed);
    assert!(categorize.error.as_deref().unwrap().contains("model down"));
    // Metadata still ran and completed from the preview.
    assert!(card.processing_status.get(Stage::Metadata).is_completed());
    assert!(card.ai_summary.is_some());
}

#[tokio::test]
async fn start_resets_previous_enrichment() {
    let h = harness();
    let id = h
        .store
        .insert(NewCard::text(Uuid::new_v4(), "> quoted"))
        .await
        .unwrap();

    let first = h.orchestrator.start(id).await.unwrap();
    let card = h.store.get(id).await.unwrap().unwrap();
    assert!(card.ai_summary.is_some());

    let second = h.orchestrator.start(id).await.unwrap();
    assert_ne!(first.id, second.id);
    let card = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(card.workflow_run_id, Some(second.id));
    // The second run regenerated everything from a clean baseline.
    assert!(card.processing_status.all_completed());
    assert!(card.ai_summary.is_some());
}

#[tokio::test]
async fn start_on_missing_card_errors() {
    let h = harness();
    let err = h.orchestrator.start(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::CardNotFound(_)));
}

#[tokio::test]
async fn reconciler_restarts_only_stale_unenriched_cards() {
    let h = harness();
    let owner = Uuid::new_v4();

    // Stale card, never enriched.
    let stale = h
        .store
        .insert(NewCard::text(owner, "> old quote"))
        .await
        .unwrap();
    let mut card = h.store.get(stale).await.unwrap().unwrap();
    card.created_at = Utc::now() - ChronoDuration::minutes(10);
    h.store.put(card).await;

    // Fresh card inside the grace window.
    let fresh = h
        .store
        .insert(NewCard::text(owner, "> new quote"))
        .await
        .unwrap();

    let reconciler = Reconciler::new(h.store.clone(), h.orchestrator.clone());
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.restarted, 1);

    let stale_card = h.store.get(stale).await.unwrap().unwrap();
    assert!(stale_card.ai_model_meta.is_some());
    let fresh_card = h.store.get(fresh).await.unwrap().unwrap();
    assert!(fresh_card.ai_model_meta.is_none());

    // A second pass finds nothing left to do.
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.scanned, 0);
}

#[tokio::test]
async fn single_card_retry_checks_ownership() {
    let h = harness();
    let owner = Uuid::new_v4();
    let id = h
        .store
        .insert(NewCard::text(owner, "> a quote"))
        .await
        .unwrap();

    let reconciler = Reconciler::new(h.store.clone(), h.orchestrator.clone());

    let stranger = Caller::user(Uuid::new_v4());
    let err = reconciler.retry_card(&stranger, id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let run = reconciler
        .retry_card(&Caller::user(owner), id)
        .await
        .unwrap();
    assert_eq!(run.card_id, id);

    let admin = Caller::admin(Uuid::new_v4());
    reconciler.retry_card(&admin, id).await.unwrap();

    let err = reconciler
        .retry_card(&admin, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CardNotFound(_)));
}

#[tokio::test]
async fn deferred_metadata_resumes_when_preview_arrives() {
    let h = harness();
    let id = h
        .store
        .insert(
            NewCard::text(Uuid::new_v4(), "https://example.com")
                .with_url("https://example.com")
                .with_type(CardType::Link),
        )
        .await
        .unwrap();
    let mut card = h.store.get(id).await.unwrap().unwrap();
    card.link_preview = Some(LinkPreview::pending());
    h.store.put(card).await;

    let step = MetadataStep::new(
        h.store.clone(),
        h.inference.clone(),
        Arc::new(StaticBlobStore::new()),
        Arc::new(StaticTranscripts::ok("")),
    );

    // First invocation sees the pending preview and defers.
    let outcome = step.run(id).await.unwrap();
    assert!(matches!(outcome, StepOutcome::Deferred { .. }));

    // Preview arrives; the next invocation completes.
    let mut card = h.store.get(id).await.unwrap().unwrap();
    let mut preview = LinkPreview::pending();
    preview.status = PreviewStatus::Ready;
    preview.title = Some("Arrived".to_string());
    card.link_preview = Some(preview);
    h.store.put(card).await;

    let outcome = step.run(id).await.unwrap();
    assert!(matches!(outcome, StepOutcome::Done(_)));
    let card = h.store.get(id).await.unwrap().unwrap();
    assert!(card.processing_status.get(Stage::Metadata).is_completed());
}
