//! OpenAI-compatible embeddings client
//!
//! Blocking HTTP client for `POST {base}/embeddings`. The request timeout is
//! bounded so a stalled provider fails the request instead of hanging, and
//! the retry budget is bounded and only spent on 429/5xx responses or
//! transport errors. Embedding the same text twice is safe, which is what
//! makes the retry policy sound.

use super::{EmbeddingError, EmbeddingProvider};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Blocking embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_attempts: usize,
}

impl OpenAiEmbedder {
    /// Build a new client.
    ///
    /// `max_attempts` counts the first try: 1 means no retry.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "missing provider API key".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "missing provider model name".to_string(),
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbeddingError::Configuration("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            max_attempts: max_attempts.max(1),
        })
    }

    fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
            };

            match self.client.post(&self.endpoint).json(&request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp
                            .json()
                            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
                        parsed.data.sort_by_key(|entry| entry.index);

                        if parsed.data.len() != inputs.len() {
                            return Err(EmbeddingError::CountMismatch {
                                expected: inputs.len(),
                                actual: parsed.data.len(),
                            });
                        }

                        let vectors: Vec<Vec<f32>> =
                            parsed.data.into_iter().map(|entry| entry.embedding).collect();
                        for vector in &vectors {
                            if vector.len() != self.dimension {
                                return Err(EmbeddingError::DimensionMismatch {
                                    expected: self.dimension,
                                    actual: vector.len(),
                                });
                            }
                        }
                        return Ok(vectors);
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt < self.max_attempts {
                        tracing::warn!(
                            "embedding request got {}, retrying ({}/{})",
                            status,
                            attempt,
                            self.max_attempts
                        );
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(EmbeddingError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt < self.max_attempts {
                        tracing::warn!(
                            "embedding request failed ({}), retrying ({}/{})",
                            err,
                            attempt,
                            self.max_attempts
                        );
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(EmbeddingError::Request(err.to_string()));
                }
            }
        }
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        let mut vectors = self.request(&[text])?;
        Ok(vectors.remove(0))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.request(&inputs)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
