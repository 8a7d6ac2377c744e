use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::client::SearchError;
use crate::core::credentials::Credential;
use crate::core::telemetry::TelemetryRecorder;

/// Turns query text into a vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u64,
}

/// Azure OpenAI embeddings deployment
pub struct AzureOpenAiEmbedder {
    http: reqwest::Client,
    url: String,
    deployment: String,
    credential: Credential,
    telemetry: Arc<TelemetryRecorder>,
}

impl AzureOpenAiEmbedder {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        credential: Credential,
        telemetry: Arc<TelemetryRecorder>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let url = format!(
            "{}/openai/deployments/{deployment}/embeddings?api-version={api_version}",
            endpoint.trim_end_matches('/')
        );
        Ok(Self {
            http,
            url,
            deployment: deployment.to_string(),
            credential,
            telemetry,
        })
    }
}

#[async_trait]
impl Embedder for AzureOpenAiEmbedder {
    async fn embed(&self, input: &str) -> Result<Vec<f32>, SearchError> {
        let started = Instant::now();
        let builder = self.http.post(&self.url).json(&json!({ "input": input }));
        let builder = self.credential.authorize(builder).await?;

        let response = builder.send().await.map_err(|source| SearchError::Http {
            url: self.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| SearchError::InvalidResponse {
                    url: self.url.clone(),
                    message: e.to_string(),
                })?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| SearchError::InvalidResponse {
                url: self.url.clone(),
                message: "response contained no embedding".to_string(),
            })?;

        self.telemetry.record_model_call(
            &self.deployment,
            "embedding_generation",
            started.elapsed(),
            parsed.usage.map(|u| u.total_tokens),
        );

        Ok(vector)
    }
}
