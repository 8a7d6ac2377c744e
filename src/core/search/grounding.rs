//! Citation lookup behind the `report_grounding` tool.
//!
//! Identifiers reported by the model are screened against [`KEY_PATTERN`] before
//! they are placed into an index filter, then resolved to the stored chunks.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use super::client::{SearchIndex, SearchRequest};
use super::pipeline::IndexSchema;
use crate::core::telemetry::unix_timestamp;

/// Characters allowed in a chunk identifier
pub static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_=-]+$").expect("key pattern is valid"));

const EXCERPT_CHARS: usize = 200;
const HIGH_RELEVANCE_SOURCES: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    #[default]
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// Parse the model-supplied level; anything unrecognised is `Medium`
    pub fn from_args(args: &Value) -> Self {
        match args.get("confidence_level").and_then(Value::as_str) {
            Some("high") => ConfidenceLevel::High,
            Some("low") => ConfidenceLevel::Low,
            _ => ConfidenceLevel::Medium,
        }
    }
}

/// Identifiers from `args.sources` that match [`KEY_PATTERN`], in order
pub fn accepted_sources(args: &Value) -> Vec<String> {
    args.get("sources")
        .and_then(Value::as_array)
        .map(|sources| {
            sources
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| KEY_PATTERN.is_match(s))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `search.in(<field>, 'a,b')` with single quotes doubled
pub fn source_filter(identifier_field: &str, sources: &[String]) -> String {
    let escaped: Vec<String> = sources.iter().map(|s| s.replace('\'', "''")).collect();
    format!("search.in({identifier_field}, '{}')", escaped.join(","))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundedSource {
    pub chunk_id: String,
    pub title: String,
    pub chunk: String,
    pub category: String,
    pub excerpt: String,
    pub word_count: usize,
    pub relevance: &'static str,
}

/// Resolves cited identifiers against the index
pub struct GroundingLookup {
    index: Arc<dyn SearchIndex>,
    schema: IndexSchema,
}

impl GroundingLookup {
    pub fn new(index: Arc<dyn SearchIndex>, schema: IndexSchema) -> Self {
        Self { index, schema }
    }

    /// Build the grounding payload for the client; lookup failures are reported inline
    pub async fn report(&self, args: &Value) -> Value {
        let sources = accepted_sources(args);
        let confidence = ConfidenceLevel::from_args(args);
        let summary = args
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if sources.is_empty() {
            warn!("No valid sources provided for grounding");
            return json!({
                "sources": [],
                "grounding_info": {
                    "total_sources": 0,
                    "confidence_level": confidence,
                    "summary": "No sources were referenced",
                    "status": "no_sources"
                }
            });
        }

        match self.lookup(&sources).await {
            Ok(docs) => self.found(&sources, docs, confidence, summary),
            Err(e) => {
                error!(error = %e, "Grounding lookup failed");
                json!({
                    "sources": [],
                    "grounding_info": {
                        "total_sources": 0,
                        "confidence_level": confidence,
                        "summary": format!("Error retrieving sources: {e}"),
                        "status": "error",
                        "error_details": e.to_string()
                    }
                })
            }
        }
    }

    async fn lookup(
        &self,
        sources: &[String],
    ) -> Result<Vec<GroundedSource>, super::client::SearchError> {
        let schema = &self.schema;
        let request = SearchRequest::new("*")
            .filter(source_filter(&schema.identifier_field, sources))
            .select([
                schema.identifier_field.as_str(),
                schema.title_field.as_str(),
                schema.content_field.as_str(),
                "category",
            ])
            .top(sources.len());

        let response = self.index.search(&request).await?;
        let leading = &sources[..sources.len().min(HIGH_RELEVANCE_SOURCES)];

        Ok(response
            .results
            .iter()
            .map(|doc| {
                let chunk_id = doc.text(&schema.identifier_field);
                let chunk = doc.text(&schema.content_field);
                let excerpt = match chunk.char_indices().nth(EXCERPT_CHARS) {
                    Some((idx, _)) => format!("{}...", &chunk[..idx]),
                    None => chunk.clone(),
                };
                GroundedSource {
                    relevance: if leading.contains(&chunk_id) {
                        "high"
                    } else {
                        "medium"
                    },
                    title: doc.text(&schema.title_field),
                    category: doc.text_or("category", "General"),
                    word_count: chunk.split_whitespace().count(),
                    excerpt,
                    chunk,
                    chunk_id,
                }
            })
            .collect())
    }

    fn found(
        &self,
        sources: &[String],
        docs: Vec<GroundedSource>,
        confidence: ConfidenceLevel,
        summary: &str,
    ) -> Value {
        let found: HashSet<&str> = docs.iter().map(|d| d.chunk_id.as_str()).collect();

        let mut missing: Vec<&str> = Vec::new();
        for source in sources {
            if !found.contains(source.as_str()) && !missing.contains(&source.as_str()) {
                missing.push(source);
            }
        }
        if !missing.is_empty() {
            warn!(?missing, "Could not find some grounding sources");
        }

        let mut categories: Vec<&str> = Vec::new();
        for doc in &docs {
            if !categories.contains(&doc.category.as_str()) {
                categories.push(&doc.category);
            }
        }

        info!(
            found = docs.len(),
            confidence = ?confidence,
            "Grounding completed"
        );

        let status = if docs.is_empty() { "not_found" } else { "success" };
        let total_words: usize = docs.iter().map(|d| d.word_count).sum();
        let grounding_info = json!({
            "total_sources": docs.len(),
            "requested_sources": sources.len(),
            "found_sources": found.len(),
            "missing_sources": missing,
            "confidence_level": confidence,
            "summary": summary,
            "status": status,
            "categories": categories,
            "total_words": total_words,
            "timestamp": unix_timestamp()
        });

        json!({
            "sources": docs,
            "grounding_info": grounding_info,
        })
    }
}
