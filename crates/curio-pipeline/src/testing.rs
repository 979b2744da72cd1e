//! Collaborator doubles for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use curio_core::{BlobStore, Error, HtmlFetch, LinkPreviewService, Result, ThumbnailService, TranscriptService};

/// Blob store backed by a fixed `file_ref -> url` map.
#[derive(Default)]
pub struct StaticBlobStore {
    urls: HashMap<String, String>,
    deleted: Mutex<Vec<String>>,
}

impl StaticBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, file_ref: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.insert(file_ref.into(), url.into());
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("blob lock poisoned").clone()
    }
}

#[async_trait]
impl BlobStore for StaticBlobStore {
    async fn get_url(&self, file_ref: &str) -> Result<Option<String>> {
        Ok(self.urls.get(file_ref).cloned())
    }

    async fn delete(&self, file_ref: &str) -> Result<()> {
        self.deleted
            .lock()
            .expect("blob lock poisoned")
            .push(file_ref.to_string());
        Ok(())
    }
}

/// Transcript service returning one fixed transcript, or a fixed error.
pub struct StaticTranscripts {
    result: std::result::Result<String, String>,
}

impl StaticTranscripts {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
        }
    }
}

#[async_trait]
impl TranscriptService for StaticTranscripts {
    async fn transcribe(&self, _audio_url: &str, _mime_type: Option<&str>) -> Result<String> {
        self.result
            .clone()
            .map_err(Error::Transcription)
    }
}

/// Thumbnail service that records requested card ids.
#[derive(Default)]
pub struct RecordingThumbnails {
    requests: Mutex<Vec<Uuid>>,
}

impl RecordingThumbnails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<Uuid> {
        self.requests.lock().expect("thumbnail lock poisoned").clone()
    }
}

#[async_trait]
impl ThumbnailService for RecordingThumbnails {
    async fn generate(&self, card_id: Uuid) -> Result<()> {
        self.requests
            .lock()
            .expect("thumbnail lock poisoned")
            .push(card_id);
        Ok(())
    }
}

/// Link-preview service that records requested card ids.
#[derive(Default)]
pub struct RecordingPreviews {
    requests: Mutex<Vec<Uuid>>,
}

impl RecordingPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<Uuid> {
        self.requests.lock().expect("preview lock poisoned").clone()
    }
}

#[async_trait]
impl LinkPreviewService for RecordingPreviews {
    async fn request_preview(&self, card_id: Uuid) -> Result<()> {
        self.requests
            .lock()
            .expect("preview lock poisoned")
            .push(card_id);
        Ok(())
    }
}

/// Preview service that fails the first `n` requests, then records like
/// [`RecordingPreviews`].
pub struct FlakyPreviews {
    failures_left: Mutex<u32>,
    requests: Mutex<Vec<Uuid>>,
}

impl FlakyPreviews {
    pub fn failing_times(n: u32) -> Self {
        Self {
            failures_left: Mutex::new(n),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Uuid> {
        self.requests.lock().expect("preview lock poisoned").clone()
    }
}

#[async_trait]
impl LinkPreviewService for FlakyPreviews {
    async fn request_preview(&self, card_id: Uuid) -> Result<()> {
        let mut left = self.failures_left.lock().expect("preview lock poisoned");
        if *left > 0 {
            *left -= 1;
            return Err(Error::Fetch("preview service unavailable".to_string()));
        }
        drop(left);
        self.requests
            .lock()
            .expect("preview lock poisoned")
            .push(card_id);
        Ok(())
    }
}

/// HTML fetcher serving canned bodies per URL; unknown URLs error.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl HtmlFetch for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Fetch(format!("no canned page for {url}")))
    }
}
