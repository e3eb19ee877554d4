use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::TARGET_WEB_REQUEST;

/// A text-to-vector embedding collaborator. Batch input, stable output
/// dimensionality, no side effects; vectors are cosine-comparable
/// across the whole corpus regardless of batch composition.
pub trait Embedder {
    /// Embeds a batch of texts, one vector per input, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The dimensionality every returned vector must have.
    fn dimensions(&self) -> usize;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding service reached over HTTP. One POST per batch, bounded
/// timeout per request; a timeout surfaces as an error the extractor
/// turns into dropped articles, never an aborted batch.
pub struct HttpEmbedder {
    url: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl HttpEmbedder {
    pub fn new(url: &str, dimensions: usize, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;
        Ok(Self {
            url: url.to_string(),
            dimensions,
            client,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        info!(target: TARGET_WEB_REQUEST, "Requesting {} embeddings from {}", texts.len(), self.url);
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { texts })
            .send()
            .with_context(|| format!("Embedding request to {} failed", self.url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Embedding service returned status {}",
                response.status()
            ));
        }

        let body: EmbedResponse = response
            .json()
            .context("Failed to parse embedding response")?;
        if body.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                body.embeddings.len()
            ));
        }
        Ok(body.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
