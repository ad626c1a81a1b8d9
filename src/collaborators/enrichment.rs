//! Enrichment services - reference lookups for candidate labels
//!
//! - [`PubMedEnrichment`]: article counts from an E-utilities style search endpoint
//! - [`MockEnrichment`]: synthetic relevance after a simulated delay
//!
//! [`enrichment_from_config`] degrades to the mock whenever the remote
//! service cannot be set up, so a missing network never stops a run.

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{Enrichment, EnrichmentService};
use crate::config::{EnrichmentMode, PipelineConfig};
use crate::error::CollaboratorError;

/// Relevance assigned when the search response cannot be interpreted
const UNPARSED_RELEVANCE: f64 = 0.5;

/// Each matching article adds this much relevance (capped at 1.0)
const RELEVANCE_PER_ARTICLE: f64 = 0.01;

// ============================================================================
// Remote lookups
// ============================================================================

#[derive(Deserialize, Debug)]
struct SearchResponse {
    esearchresult: Option<SearchResult>,
}

#[derive(Deserialize, Debug)]
struct SearchResult {
    count: Option<String>,
}

/// Reference lookup against a PubMed `esearch` endpoint
pub struct PubMedEnrichment {
    client: Client,
    base_url: Url,
}

impl PubMedEnrichment {
    pub fn new(base_url: &str) -> Result<Self, CollaboratorError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            CollaboratorError::Unavailable(format!("invalid enrichment URL '{}': {}", base_url, e))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(CollaboratorError::Unavailable(format!(
                "unsupported enrichment URL scheme '{}'",
                base_url.scheme()
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("caseflow/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Map an article count onto [0, 1]
    pub fn relevance_from_count(count: u64) -> f64 {
        (RELEVANCE_PER_ARTICLE * count as f64).min(1.0)
    }

    /// Interpret a search response body
    ///
    /// An unreadable body is not an error: the lookup did answer, it just
    /// gets a neutral relevance.
    fn parse_body(label: &str, body: &str) -> Enrichment {
        let count = serde_json::from_str::<SearchResponse>(body)
            .ok()
            .and_then(|r| r.esearchresult)
            .and_then(|r| r.count)
            .and_then(|c| c.trim().parse::<u64>().ok());

        match count {
            Some(count) => Enrichment::new(
                Self::relevance_from_count(count),
                format!("Found {} articles about {}", count, label),
            ),
            None => Enrichment::new(
                UNPARSED_RELEVANCE,
                format!("Failed to parse reference index for {}", label),
            ),
        }
    }
}

#[async_trait]
impl EnrichmentService for PubMedEnrichment {
    fn name(&self) -> &'static str {
        "pubmed"
    }

    async fn lookup(
        &self,
        label: &str,
        timeout: Duration,
    ) -> Result<Enrichment, CollaboratorError> {
        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[("db", "pubmed"), ("term", label), ("retmode", "json")])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout(timeout)
                } else {
                    CollaboratorError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Lookup(format!(
                "reference index returned {} for '{}'",
                status, label
            )));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout(timeout)
            } else {
                CollaboratorError::Network(e)
            }
        })?;

        let enrichment = Self::parse_body(label, &body);
        debug!(label, relevance = enrichment.relevance, "Reference lookup complete");
        Ok(enrichment)
    }
}

// ============================================================================
// Local mock
// ============================================================================

/// Offline stand-in that returns a random relevance after a delay
#[derive(Debug, Clone)]
pub struct MockEnrichment {
    latency: Duration,
}

impl MockEnrichment {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockEnrichment {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl EnrichmentService for MockEnrichment {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn lookup(
        &self,
        label: &str,
        timeout: Duration,
    ) -> Result<Enrichment, CollaboratorError> {
        tokio::time::timeout(timeout, tokio::time::sleep(self.latency))
            .await
            .map_err(|_| CollaboratorError::Timeout(timeout))?;

        let relevance: f64 = rand::rng().random();
        Ok(Enrichment::new(
            relevance,
            format!("Mock reference snippet about {}...", label),
        ))
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Build the enrichment collaborator selected by the config
pub fn enrichment_from_config(config: &PipelineConfig) -> Arc<dyn EnrichmentService> {
    match config.enrichment_mode {
        EnrichmentMode::Mock => Arc::new(MockEnrichment::new(config.mock_latency())),
        EnrichmentMode::Remote => match PubMedEnrichment::new(&config.enrichment_url) {
            Ok(service) => Arc::new(service),
            Err(e) => {
                warn!("Remote enrichment unavailable ({}), falling back to mock lookups", e);
                Arc::new(MockEnrichment::new(config.mock_latency()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a local port
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/esearch.fcgi", addr)
    }

    #[test]
    fn test_relevance_from_count() {
        assert_eq!(PubMedEnrichment::relevance_from_count(0), 0.0);
        assert!((PubMedEnrichment::relevance_from_count(42) - 0.42).abs() < 1e-9);
        assert_eq!(PubMedEnrichment::relevance_from_count(25_000), 1.0);
    }

    #[test]
    fn test_parse_body() {
        let body = r#"{"header": {"type": "esearch"}, "esearchresult": {"count": "37", "idlist": []}}"#;
        let parsed = PubMedEnrichment::parse_body("Infection", body);
        assert!((parsed.relevance - 0.37).abs() < 1e-9);
        assert_eq!(parsed.note, "Found 37 articles about Infection");

        let garbled = PubMedEnrichment::parse_body("Infection", "<html>oops</html>");
        assert_eq!(garbled.relevance, UNPARSED_RELEVANCE);
        assert!(garbled.note.contains("Failed to parse"));
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(PubMedEnrichment::new("not a url").is_err());
        assert!(PubMedEnrichment::new("ftp://example.org/search").is_err());
        assert!(PubMedEnrichment::new("https://example.org/search").is_ok());
    }

    #[tokio::test]
    async fn test_remote_lookup_success() {
        let url = serve_once("200 OK", r#"{"esearchresult": {"count": "150"}}"#).await;
        let service = PubMedEnrichment::new(&url).unwrap();

        let enrichment = service
            .lookup("Respiratory condition", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(enrichment.relevance, 1.0);
        assert_eq!(enrichment.note, "Found 150 articles about Respiratory condition");
    }

    #[tokio::test]
    async fn test_remote_lookup_http_error() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let service = PubMedEnrichment::new(&url).unwrap();

        let err = service
            .lookup("Infection", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Lookup(_)));
    }

    #[tokio::test]
    async fn test_remote_lookup_timeout() {
        // Accept the connection but never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let service = PubMedEnrichment::new(&format!("http://{}/esearch.fcgi", addr)).unwrap();
        let err = service
            .lookup("Infection", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    }

    #[tokio::test]
    async fn test_mock_lookup() {
        let service = MockEnrichment::new(Duration::from_millis(5));
        let enrichment = service
            .lookup("Infection", Duration::from_secs(1))
            .await
            .unwrap();
        assert!((0.0..1.0).contains(&enrichment.relevance));
        assert!(enrichment.note.contains("Infection"));
    }

    #[tokio::test]
    async fn test_mock_lookup_times_out() {
        let service = MockEnrichment::new(Duration::from_secs(10));
        let err = service
            .lookup("Infection", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_misconfigured_remote_falls_back_to_mock() {
        let config = PipelineConfig {
            enrichment_mode: EnrichmentMode::Remote,
            enrichment_url: "::definitely not a url::".to_string(),
            ..Default::default()
        };
        assert_eq!(enrichment_from_config(&config).name(), "mock");

        let config = PipelineConfig {
            enrichment_mode: EnrichmentMode::Remote,
            ..Default::default()
        };
        assert_eq!(enrichment_from_config(&config).name(), "pubmed");
    }
}
