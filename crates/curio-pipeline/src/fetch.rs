//! Bounded HTML fetching over reqwest.

use async_trait::async_trait;
use tracing::debug;

use curio_core::{defaults, Error, HtmlFetch, Result};

/// HTTP fetcher with a hard cap on the number of bytes read, so a runaway
/// page cannot balloon memory during structured-data enrichment.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_limit(defaults::HTML_FETCH_MAX_BYTES)
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HtmlFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Fetch(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let remaining = self.max_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!(url, max_bytes = self.max_bytes, "HTML body truncated at cap");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
