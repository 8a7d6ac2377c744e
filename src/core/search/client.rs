use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::credentials::{Credential, CredentialError};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Authentication failed: {0}")]
    Credential(#[from] CredentialError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Simple,
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Any,
    All,
}

/// Nearest-neighbour component of a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorQuery {
    kind: &'static str,
    pub vector: Vec<f32>,
    pub k: usize,
    pub fields: String,
    pub weight: f32,
}

impl VectorQuery {
    pub fn new(vector: Vec<f32>, k: usize, field: impl Into<String>, weight: f32) -> Self {
        Self {
            kind: "vector",
            vector,
            k,
            fields: field.into(),
            weight,
        }
    }
}

fn comma_separated<S: Serializer>(fields: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&fields.join(","))
}

/// Body of `POST /indexes/{index}/docs/search`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub search: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_configuration: Option<String>,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "comma_separated"
    )]
    pub search_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<usize>,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "comma_separated"
    )]
    pub select: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vector_queries: Vec<VectorQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl SearchRequest {
    pub fn new(search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            ..Default::default()
        }
    }

    pub fn query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = Some(query_type);
        self
    }

    pub fn semantic_configuration(mut self, name: impl Into<String>) -> Self {
        self.semantic_configuration = Some(name.into());
        self
    }

    pub fn search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn answers(mut self, answers: impl Into<String>) -> Self {
        self.answers = Some(answers.into());
        self
    }

    pub fn captions(mut self, captions: impl Into<String>) -> Self {
        self.captions = Some(captions.into());
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn vector(mut self, query: Option<&VectorQuery>) -> Self {
        self.vector_queries = query.cloned().into_iter().collect();
        self
    }

    pub fn search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = Some(mode);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub highlights: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticAnswer {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub highlights: Option<String>,
}

/// One hit with its scores and selected fields
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchDocument {
    #[serde(rename = "@search.score", default)]
    pub score: f64,
    #[serde(rename = "@search.rerankerScore", default)]
    pub reranker_score: Option<f64>,
    #[serde(rename = "@search.captions", default)]
    pub captions: Option<Vec<Caption>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SearchDocument {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Field rendered as text; missing fields are empty
    pub fn text(&self, name: &str) -> String {
        match self.field(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn text_or(&self, name: &str, default: &str) -> String {
        match self.field(name) {
            Some(_) => self.text(name),
            None => default.to_string(),
        }
    }

    pub fn captions(&self) -> &[Caption] {
        self.captions.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "value", default)]
    pub results: Vec<SearchDocument>,
    #[serde(rename = "@search.answers", default)]
    pub answers: Option<Vec<SemanticAnswer>>,
}

impl SearchResponse {
    pub fn answers(&self) -> &[SemanticAnswer] {
        self.answers.as_deref().unwrap_or_default()
    }
}

/// A queryable document index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;
}

/// REST client for an Azure AI Search index
pub struct AzureSearchClient {
    http: reqwest::Client,
    url: String,
    credential: Credential,
}

impl AzureSearchClient {
    pub fn new(
        endpoint: &str,
        index: &str,
        api_version: &str,
        credential: Credential,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let url = format!(
            "{}/indexes/{index}/docs/search?api-version={api_version}",
            endpoint.trim_end_matches('/')
        );
        Ok(Self {
            http,
            url,
            credential,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SearchIndex for AzureSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let builder = self.http.post(&self.url).json(request);
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

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchError::InvalidResponse {
                url: self.url.clone(),
                message: e.to_string(),
            })
    }
}
