
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::{Embedder, Vector, normalize_query_text};
use crate::config::EmbeddingConfig;
use crate::{Result, StorefrontError};

/// Blocking client for OpenAI-compatible `/embeddings` endpoints.
///
/// Every call goes to the network: there is no cache and no retry. Transient
/// failures surface immediately as [`StorefrontError::EmbeddingService`].
#[derive(Clone)]
pub struct OpenAiClient {
    endpoint: Url,
    model: String,
    dimension: usize,
    api_key: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for OpenAiClient {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Fixed allowance for the response envelope and error bodies
const RESPONSE_BASE_LIMIT: u64 = 1024 * 1024;

/// Generous upper bound on one serialized float plus its separator
const BYTES_PER_COMPONENT: u64 = 32;

/// Largest response body accepted for a request of `expected` vectors
pub(crate) fn response_body_limit(expected: usize, dimension: usize) -> u64 {
    let components = (expected as u64).saturating_mul(dimension as u64);
    RESPONSE_BASE_LIMIT.saturating_add(components.saturating_mul(BYTES_PER_COMPONENT))
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: EmbedInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbedInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    /// Build a client, reading the API key from the configured environment variable
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        config.validate()?;
        if api_key.trim().is_empty() {
            return Err(StorefrontError::Config(format!(
                "Missing API key: environment variable {} is empty",
                config.api_key_env
            )));
        }

        let endpoint = config
            .endpoint_url()?
            .join("embeddings")
            .map_err(|e| StorefrontError::Config(format!("Invalid embeddings URL: {}", e)))?;

        Ok(Self {
            endpoint,
            model: config.model.clone(),
            dimension: config.dimension as usize,
            api_key,
            agent: build_agent(Duration::from_secs(config.timeout_secs)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn request_embeddings(&self, input: EmbedInput<'_>, expected: usize) -> Result<Vec<Vector>> {
        let request = EmbedRequest {
            model: &self.model,
            input,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            StorefrontError::EmbeddingService(format!("Failed to serialize request: {}", e))
        })?;

        debug!(
            "Requesting {} embedding(s) from {} with model {}",
            expected, self.endpoint, self.model
        );

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&request_json)
            .map_err(|e| {
                error!("Embedding request to {} failed: {}", self.endpoint, e);
                StorefrontError::EmbeddingService(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        let body = response
            .body_mut()
            .with_config()
            .limit(response_body_limit(expected, self.dimension))
            .read_to_string()
            .map_err(|e| {
                StorefrontError::EmbeddingService(format!("Failed to read response body: {}", e))
            })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!("Embedding service returned HTTP {}: {}", status.as_u16(), message);
            return Err(StorefrontError::EmbeddingService(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        let mut parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            StorefrontError::EmbeddingService(format!("Malformed embedding response: {}", e))
        })?;

        if parsed.data.len() != expected {
            return Err(StorefrontError::EmbeddingService(format!(
                "Mismatch between request and response counts: {} vs {}",
                expected,
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed
            .data
            .iter()
            .enumerate()
            .any(|(position, entry)| entry.index != position)
        {
            return Err(StorefrontError::EmbeddingService(
                "Embedding response indices do not cover the request".to_string(),
            ));
        }

        if let Some(bad) = parsed
            .data
            .iter()
            .find(|entry| entry.embedding.len() != self.dimension)
        {
            return Err(StorefrontError::EmbeddingService(format!(
                "Expected {}-dimensional embeddings, got {}",
                self.dimension,
                bad.embedding.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

impl Embedder for OpenAiClient {
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vector> {
        let input = normalize_query_text(text);
        debug!("Generating embedding for text (length: {})", input.len());

        self.request_embeddings(EmbedInput::Single(&input), 1)?
            .pop()
            .ok_or_else(|| StorefrontError::EmbeddingService("Empty embedding response".to_string()))
    }

    #[inline]
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());
        self.request_embeddings(EmbedInput::Batch(texts), texts.len())
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
