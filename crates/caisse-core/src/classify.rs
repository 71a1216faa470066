//! Category classifier capability
//!
//! Maps a transaction description to a category label. Like the OCR
//! engine, the real classifier runs in an external sidecar; the core
//! depends only on the `Classifier` trait and `ClassifierClient` enum.
//!
//! The "category missing, try to classify, fall back on any error"
//! discipline is a first-class two-outcome operation
//! (`classify_or_fallback`) rather than a caught exception, so the
//! fallback path is a testable branch.
//!
//! # Configuration
//!
//! - `CLASSIFIER_BACKEND`: `remote` (default) or `mock`
//! - `CLASSIFIER_HOST`: sidecar URL (required for the remote backend)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::FALLBACK_CATEGORY;

/// Outcome of the fallback-tolerant classification path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    /// The classifier produced a label
    Classified(String),
    /// The classifier failed; the fixed fallback category applies
    Fallback,
}

impl CategoryOutcome {
    /// Resolve to a concrete category label
    pub fn into_category(self) -> String {
        match self {
            Self::Classified(label) => label,
            Self::Fallback => FALLBACK_CATEGORY.to_string(),
        }
    }
}

/// Capability: description string -> category label. May fail.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a transaction description into a category
    async fn classify(&self, description: &str) -> Result<String>;

    /// Check if the classifier is reachable
    async fn health_check(&self) -> bool;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete classifier client enum
#[derive(Clone)]
pub enum ClassifierClient {
    Remote(RemoteClassifier),
    Mock(MockClassifier),
    /// No classifier configured; every call fails and the fallback
    /// category applies
    Disabled,
}

impl ClassifierClient {
    /// Create a classifier client from environment variables.
    ///
    /// Returns None if the required variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("CLASSIFIER_BACKEND").unwrap_or_else(|_| "remote".to_string());
        match backend.to_lowercase().as_str() {
            "mock" => Some(ClassifierClient::Mock(MockClassifier::new())),
            _ => RemoteClassifier::from_env().map(ClassifierClient::Remote),
        }
    }

    pub fn mock() -> Self {
        ClassifierClient::Mock(MockClassifier::new())
    }

    /// Classify, recovering any failure as the fallback outcome.
    ///
    /// Classification never blocks transaction creation; failures are
    /// logged and absorbed here.
    pub async fn classify_or_fallback(&self, description: &str) -> CategoryOutcome {
        match self.classify(description).await {
            Ok(label) => CategoryOutcome::Classified(label),
            Err(e) => {
                warn!(error = %e, description, "Classification failed, using fallback category");
                CategoryOutcome::Fallback
            }
        }
    }
}

#[async_trait]
impl Classifier for ClassifierClient {
    async fn classify(&self, description: &str) -> Result<String> {
        match self {
            ClassifierClient::Remote(c) => c.classify(description).await,
            ClassifierClient::Mock(c) => c.classify(description).await,
            ClassifierClient::Disabled => {
                Err(Error::External("Classifier not configured".to_string()))
            }
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            ClassifierClient::Remote(c) => c.health_check().await,
            ClassifierClient::Mock(c) => c.health_check().await,
            ClassifierClient::Disabled => false,
        }
    }

    fn host(&self) -> &str {
        match self {
            ClassifierClient::Remote(c) => c.host(),
            ClassifierClient::Mock(c) => c.host(),
            ClassifierClient::Disabled => "disabled",
        }
    }
}

/// HTTP client for a classifier sidecar service
#[derive(Clone)]
pub struct RemoteClassifier {
    http_client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    category: String,
}

impl RemoteClassifier {
    pub fn new(base_url: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from the `CLASSIFIER_HOST` environment variable
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("CLASSIFIER_HOST").ok()?;
        Some(Self::new(&host))
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, description: &str) -> Result<String> {
        let response = self
            .http_client
            .post(format!("{}/classify", self.base_url))
            .json(&ClassifyRequest { description })
            .send()
            .await
            .map_err(|e| Error::External(format!("Classifier request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::External(format!(
                "Classifier returned status {}",
                response.status()
            )));
        }

        let body: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| Error::External(format!("Invalid classifier response: {}", e)))?;

        if body.category.trim().is_empty() {
            return Err(Error::External("Classifier returned an empty category".to_string()));
        }

        Ok(body.category)
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

/// Mock classifier for testing
///
/// Keyword matching over common French receipt vocabulary; `failing()`
/// errors on every call to exercise the fallback paths.
#[derive(Clone, Default)]
pub struct MockClassifier {
    failing: bool,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self { failing: false }
    }

    /// Mock that fails every classification call
    pub fn failing() -> Self {
        Self { failing: true }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, description: &str) -> Result<String> {
        if self.failing {
            return Err(Error::External("Mock classifier failure".to_string()));
        }

        let category = match description.to_lowercase() {
            d if d.contains("pain") || d.contains("lait") || d.contains("marché") => "Nourriture",
            d if d.contains("essence") || d.contains("métro") || d.contains("train") => {
                "Transport"
            }
            d if d.contains("loyer") || d.contains("électricité") || d.contains("facture") => {
                "Factures"
            }
            d if d.contains("cinéma") || d.contains("concert") => "Divertissement",
            d if d.contains("pharmacie") || d.contains("médecin") => "Santé",
            _ => FALLBACK_CATEGORY,
        };

        Ok(category.to_string())
    }

    async fn health_check(&self) -> bool {
        !self.failing
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_classifies_known_keywords() {
        let classifier = ClassifierClient::mock();
        assert_eq!(classifier.classify("Pain complet").await.unwrap(), "Nourriture");
        assert_eq!(classifier.classify("Essence SP95").await.unwrap(), "Transport");
    }

    #[tokio::test]
    async fn test_fallback_outcome_on_failure() {
        let classifier = ClassifierClient::Mock(MockClassifier::failing());
        let outcome = classifier.classify_or_fallback("Pain").await;
        assert_eq!(outcome, CategoryOutcome::Fallback);
        assert_eq!(outcome.into_category(), FALLBACK_CATEGORY);
    }

    #[tokio::test]
    async fn test_classified_outcome() {
        let classifier = ClassifierClient::mock();
        let outcome = classifier.classify_or_fallback("Pain").await;
        assert_eq!(outcome, CategoryOutcome::Classified("Nourriture".to_string()));
    }
}
