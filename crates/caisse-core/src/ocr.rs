//! OCR engine capability
//!
//! Text recognition runs in an external sidecar service; the core only
//! depends on the `OcrEngine` trait. `OcrClient` is the concrete Clone-able
//! wrapper (compile-time dispatch, no `Box<dyn>`), with a `Mock` variant so
//! ingestion can be tested deterministically without a running engine.
//!
//! # Configuration
//!
//! - `OCR_BACKEND`: `remote` (default) or `mock`
//! - `OCR_HOST`: sidecar URL (required for the remote backend)

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// What the recognizer produced: some engines return one undivided text
/// block, others pre-split lines. Extraction supports both shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutput {
    Block(String),
    Lines(Vec<String>),
}

/// Capability: image bytes -> recognized text. May fail.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in an image
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput>;

    /// Check if the engine is reachable
    async fn health_check(&self) -> bool;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete OCR client enum
#[derive(Clone)]
pub enum OcrClient {
    Remote(RemoteOcrEngine),
    Mock(MockOcrEngine),
}

impl OcrClient {
    /// Create an OCR client from environment variables.
    ///
    /// Returns None if the required variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("OCR_BACKEND").unwrap_or_else(|_| "remote".to_string());
        match backend.to_lowercase().as_str() {
            "mock" => Some(OcrClient::Mock(MockOcrEngine::default())),
            _ => RemoteOcrEngine::from_env().map(OcrClient::Remote),
        }
    }

    pub fn remote(host: &str) -> Self {
        OcrClient::Remote(RemoteOcrEngine::new(host))
    }
}

#[async_trait]
impl OcrEngine for OcrClient {
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput> {
        match self {
            OcrClient::Remote(e) => e.recognize(image).await,
            OcrClient::Mock(e) => e.recognize(image).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            OcrClient::Remote(e) => e.health_check().await,
            OcrClient::Mock(e) => e.health_check().await,
        }
    }

    fn host(&self) -> &str {
        match self {
            OcrClient::Remote(e) => e.host(),
            OcrClient::Mock(e) => e.host(),
        }
    }
}

/// HTTP client for an OCR sidecar service
///
/// Ships the image base64-encoded in a JSON body and accepts either a
/// `text` field (single block) or a `lines` array in the response.
#[derive(Clone)]
pub struct RemoteOcrEngine {
    http_client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    lines: Option<Vec<String>>,
}

impl RemoteOcrEngine {
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from the `OCR_HOST` environment variable
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OCR_HOST").ok()?;
        Some(Self::new(&host))
    }
}

#[async_trait]
impl OcrEngine for RemoteOcrEngine {
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        debug!(bytes = image.len(), "Sending image to OCR engine");

        let response = self
            .http_client
            .post(format!("{}/recognize", self.base_url))
            .json(&RecognizeRequest { image: &encoded })
            .send()
            .await
            .map_err(|e| Error::External(format!("OCR request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::External(format!(
                "OCR engine returned status {}",
                response.status()
            )));
        }

        let body: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Invalid OCR response: {}", e)))?;

        match (body.lines, body.text) {
            (Some(lines), _) => Ok(OcrOutput::Lines(lines)),
            (None, Some(text)) => Ok(OcrOutput::Block(text)),
            (None, None) => Err(Error::External(
                "OCR response contained neither text nor lines".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// Mock OCR engine for testing
///
/// Returns a fixed output regardless of input, or fails on demand.
#[derive(Clone)]
pub struct MockOcrEngine {
    output: Option<OcrOutput>,
}

impl Default for MockOcrEngine {
    fn default() -> Self {
        Self::with_lines(&["Pain 2.50", "Lait 1.20"])
    }
}

impl MockOcrEngine {
    /// Mock returning the given pre-split lines
    pub fn with_lines(lines: &[&str]) -> Self {
        Self {
            output: Some(OcrOutput::Lines(
                lines.iter().map(|s| s.to_string()).collect(),
            )),
        }
    }

    /// Mock returning one undivided text block
    pub fn with_block(text: &str) -> Self {
        Self {
            output: Some(OcrOutput::Block(text.to_string())),
        }
    }

    /// Mock that fails every recognition call
    pub fn failing() -> Self {
        Self { output: None }
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    async fn recognize(&self, _image: &[u8]) -> Result<OcrOutput> {
        match &self.output {
            Some(output) => Ok(output.clone()),
            None => Err(Error::External("Mock OCR engine failure".to_string())),
        }
    }

    async fn health_check(&self) -> bool {
        self.output.is_some()
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
