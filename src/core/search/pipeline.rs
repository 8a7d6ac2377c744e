//! Query pipeline behind the `search` tool.
//!
//! A query is optionally embedded, sent as a hybrid semantic + vector query, and
//! formatted into `[id]: text` blocks the model can cite. When the primary query
//! fails the [`FallbackStrategy::LADDER`] is walked in order until a rung returns
//! at least one hit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use super::client::{
    Caption, QueryType, SearchDocument, SearchIndex, SearchMode, SearchRequest, SearchResponse,
    SemanticAnswer, VectorQuery,
};
use super::embedding::Embedder;
use crate::config::SearchSettings;

/// Longest query prefix sent to the embedding model
pub const MAX_EMBEDDING_INPUT_CHARS: usize = 4000;

/// Returned to the model when every strategy came back empty
pub const NO_RESULTS_MESSAGE: &str = "Je n'ai pas pu trouver d'informations pertinentes dans la base de connaissances. Veuillez reformuler votre question ou contacter un conseiller pour une assistance personnalisée.";

/// Separator between the formatted hits and the UI metadata
pub const METADATA_MARKER: &str = "__METADATA__: ";

const BLOCK_SEPARATOR: &str = "\n-----\n";
const VECTOR_K: usize = 25;
const VECTOR_WEIGHT: f32 = 0.5;
const PRIMARY_TOP: usize = 10;
const EXCERPT_CHARS: usize = 300;
const MAX_KEYWORDS: usize = 5;

/// Field layout of the knowledge-base index
#[derive(Debug, Clone)]
pub struct IndexSchema {
    pub semantic_configuration: String,
    pub identifier_field: String,
    pub content_field: String,
    pub embedding_field: String,
    pub title_field: String,
}

impl From<&SearchSettings> for IndexSchema {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            semantic_configuration: settings.semantic_configuration.clone(),
            identifier_field: settings.identifier_field.clone(),
            content_field: settings.content_field.clone(),
            embedding_field: settings.embedding_field.clone(),
            title_field: settings.title_field.clone(),
        }
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::from(&SearchSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Hybrid,
    Semantic,
    Lexical,
    Vector,
    Keyword,
    /// No strategy produced results
    None,
}

impl SearchType {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Hybrid => "hybrid",
            SearchType::Semantic => "semantic",
            SearchType::Lexical => "lexical",
            SearchType::Vector => "vector",
            SearchType::Keyword => "keyword",
            SearchType::None => "none",
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub text: String,
    pub count: usize,
    pub search_type: SearchType,
    pub elapsed: Duration,
}

impl SearchOutcome {
    fn exhausted(elapsed: Duration) -> Self {
        Self {
            text: NO_RESULTS_MESSAGE.to_string(),
            count: 0,
            search_type: SearchType::None,
            elapsed,
        }
    }
}

/// Inputs shared by every fallback rung
#[derive(Debug, Clone, Copy)]
pub struct FallbackContext<'a> {
    pub query: &'a str,
    pub schema: &'a IndexSchema,
    pub vector: Option<&'a VectorQuery>,
}

/// One rung of the fallback ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Simple query with permissive matching
    Lexical,
    /// Vector-only query; needs an embedding
    Vector,
    /// OR-joined keywords
    Keyword,
}

impl FallbackStrategy {
    pub const LADDER: [FallbackStrategy; 3] = [
        FallbackStrategy::Lexical,
        FallbackStrategy::Vector,
        FallbackStrategy::Keyword,
    ];

    pub fn search_type(self) -> SearchType {
        match self {
            FallbackStrategy::Lexical => SearchType::Lexical,
            FallbackStrategy::Vector => SearchType::Vector,
            FallbackStrategy::Keyword => SearchType::Keyword,
        }
    }

    /// Request issued by this rung, or `None` when it does not apply
    pub fn request(self, ctx: &FallbackContext<'_>) -> Option<SearchRequest> {
        let schema = ctx.schema;
        match self {
            FallbackStrategy::Lexical => Some(
                SearchRequest::new(ctx.query)
                    .query_type(QueryType::Simple)
                    .search_mode(SearchMode::Any)
                    .search_fields([schema.content_field.as_str(), "title"])
                    .select([
                        schema.identifier_field.as_str(),
                        schema.content_field.as_str(),
                        "title",
                    ])
                    .top(8),
            ),
            FallbackStrategy::Vector => ctx.vector.map(|vector| {
                SearchRequest::new("*")
                    .vector(Some(vector))
                    .select([
                        schema.identifier_field.as_str(),
                        schema.content_field.as_str(),
                        "title",
                    ])
                    .top(6)
            }),
            FallbackStrategy::Keyword => {
                let keywords = keywords(ctx.query);
                if keywords.is_empty() {
                    return None;
                }
                Some(
                    SearchRequest::new(keywords.join(" OR "))
                        .search_fields([schema.content_field.as_str(), "title"])
                        .select([schema.identifier_field.as_str(), schema.content_field.as_str()])
                        .top(5),
                )
            }
        }
    }
}

/// Whitespace-separated words longer than two characters, at most five
pub fn keywords(query: &str) -> Vec<&str> {
    query
        .split_whitespace()
        .filter(|word| word.chars().count() > 2)
        .take(MAX_KEYWORDS)
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn excerpt(text: &str, max: usize) -> String {
    let head = truncate_chars(text, max);
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        head.to_string()
    }
}

#[derive(Debug, Serialize)]
struct SourceMetadata {
    id: serde_json::Value,
    content: String,
    title: String,
    category: String,
    search_score: f64,
    reranker_score: Option<f64>,
    excerpt: String,
    captions: Vec<Caption>,
}

#[derive(Debug, Serialize)]
struct SearchStats {
    total_results: usize,
    has_vector_search: bool,
    embedding_time: f64,
}

#[derive(Debug, Serialize)]
struct ResultMetadata<'a> {
    sources: Vec<SourceMetadata>,
    semantic_answers: &'a [SemanticAnswer],
    search_stats: SearchStats,
}

/// Format the primary response with captions and the metadata trailer
fn format_primary(
    response: &SearchResponse,
    schema: &IndexSchema,
    has_vector: bool,
    embedding_time: Duration,
) -> String {
    let mut text = String::new();
    let mut sources = Vec::with_capacity(response.results.len());

    for doc in &response.results {
        let id = doc.text(&schema.identifier_field);
        let content = doc.text(&schema.content_field);
        let snippet = doc
            .captions()
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_else(|| content.clone());

        text.push_str(&format!("[{id}]: {snippet}{BLOCK_SEPARATOR}"));

        sources.push(SourceMetadata {
            id: doc
                .field(&schema.identifier_field)
                .cloned()
                .unwrap_or_default(),
            excerpt: excerpt(&snippet, EXCERPT_CHARS),
            content,
            title: doc.text("title"),
            category: doc.text("category"),
            search_score: doc.score,
            reranker_score: doc.reranker_score,
            captions: doc.captions().to_vec(),
        });
    }

    let metadata = ResultMetadata {
        search_stats: SearchStats {
            total_results: sources.len(),
            has_vector_search: has_vector,
            embedding_time: embedding_time.as_secs_f64(),
        },
        sources,
        semantic_answers: response.answers(),
    };

    // Plain structs of strings and numbers always serialize
    if let Ok(json) = serde_json::to_string(&metadata) {
        text.push('\n');
        text.push_str(METADATA_MARKER);
        text.push_str(&json);
    }
    text
}

/// Format fallback hits as raw content blocks
fn format_plain(results: &[SearchDocument], schema: &IndexSchema) -> String {
    results
        .iter()
        .map(|doc| {
            format!(
                "[{}]: {}{BLOCK_SEPARATOR}",
                doc.text(&schema.identifier_field),
                doc.text(&schema.content_field)
            )
        })
        .collect()
}

/// Hybrid search with embedding and fallback handling
pub struct SearchPipeline {
    index: Arc<dyn SearchIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    schema: IndexSchema,
    use_vector_query: bool,
}

impl SearchPipeline {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        embedder: Option<Arc<dyn Embedder>>,
        schema: IndexSchema,
        use_vector_query: bool,
    ) -> Self {
        Self {
            index,
            embedder,
            schema,
            use_vector_query,
        }
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    async fn vector_query(&self, query: &str) -> (Option<VectorQuery>, Duration) {
        if !self.use_vector_query {
            return (None, Duration::ZERO);
        }
        let Some(embedder) = &self.embedder else {
            warn!("Missing embedding configuration, skipping vector search");
            return (None, Duration::ZERO);
        };

        let started = Instant::now();
        match embedder
            .embed(truncate_chars(query, MAX_EMBEDDING_INPUT_CHARS))
            .await
        {
            Ok(vector) => {
                let elapsed = started.elapsed();
                info!(
                    dimensions = vector.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Generated query embedding"
                );
                let query =
                    VectorQuery::new(vector, VECTOR_K, &self.schema.embedding_field, VECTOR_WEIGHT);
                (Some(query), elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Query embedding failed, continuing with semantic search only");
                (None, Duration::ZERO)
            }
        }
    }

    fn primary_request(&self, query: &str, vector: Option<&VectorQuery>) -> SearchRequest {
        let schema = &self.schema;
        SearchRequest::new(query)
            .query_type(QueryType::Semantic)
            .semantic_configuration(&schema.semantic_configuration)
            .search_fields([schema.content_field.as_str(), "title"])
            .answers("extractive|count-3")
            .captions("extractive|highlight-true")
            .top(PRIMARY_TOP)
            .vector(vector)
            .select([
                schema.identifier_field.as_str(),
                schema.content_field.as_str(),
                "title",
                "category",
            ])
    }

    /// Run the query through the primary search and, on failure, the fallback ladder
    pub async fn run(&self, query: &str) -> SearchOutcome {
        let started = Instant::now();
        let (vector, embedding_time) = self.vector_query(query).await;

        let request = self.primary_request(query, vector.as_ref());
        let outcome = match self.index.search(&request).await {
            Ok(response) => {
                let search_type = if vector.is_some() {
                    SearchType::Hybrid
                } else {
                    SearchType::Semantic
                };
                SearchOutcome {
                    count: response.results.len(),
                    text: format_primary(&response, &self.schema, vector.is_some(), embedding_time),
                    search_type,
                    elapsed: started.elapsed(),
                }
            }
            Err(e) => {
                error!(error = %e, query, "Primary search failed, trying fallbacks");
                let ctx = FallbackContext {
                    query,
                    schema: &self.schema,
                    vector: vector.as_ref(),
                };
                self.fallback(&ctx, started).await
            }
        };

        info!(
            query,
            results = outcome.count,
            search_type = outcome.search_type.as_str(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Search completed"
        );
        outcome
    }

    async fn fallback(&self, ctx: &FallbackContext<'_>, started: Instant) -> SearchOutcome {
        for strategy in FallbackStrategy::LADDER {
            let Some(request) = strategy.request(ctx) else {
                continue;
            };
            let search_type = strategy.search_type();

            match self.index.search(&request).await {
                Ok(response) if !response.results.is_empty() => {
                    info!(
                        strategy = search_type.as_str(),
                        results = response.results.len(),
                        "Fallback search succeeded"
                    );
                    return SearchOutcome {
                        text: format_plain(&response.results, &self.schema),
                        count: response.results.len(),
                        search_type,
                        elapsed: started.elapsed(),
                    };
                }
                Ok(_) => info!(strategy = search_type.as_str(), "Fallback search returned nothing"),
                Err(e) => warn!(strategy = search_type.as_str(), error = %e, "Fallback search failed"),
            }
        }

        error!(query = ctx.query, "All fallback strategies failed");
        SearchOutcome::exhausted(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        query: &'a str,
        schema: &'a IndexSchema,
        vector: Option<&'a VectorQuery>,
    ) -> FallbackContext<'a> {
        FallbackContext {
            query,
            schema,
            vector,
        }
    }

    #[test]
    fn test_keywords_skip_short_words_and_cap_at_five() {
        assert_eq!(
            keywords("le prix de la franchise auto pour un jeune conducteur"),
            vec!["prix", "franchise", "auto", "pour", "jeune"]
        );
        assert!(keywords("a de la").is_empty());
    }

    #[test]
    fn test_keyword_length_counts_characters() {
        // "été" is three characters but six bytes
        assert_eq!(keywords("été ou"), vec!["été"]);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(excerpt("abcdef", 3), "abc...");
        assert_eq!(excerpt("abc", 3), "abc");
    }

    #[test]
    fn test_ladder_requests() {
        let schema = IndexSchema::default();
        let vector = VectorQuery::new(vec![1.0], 25, "text_vector", 0.5);

        let lexical = FallbackStrategy::Lexical
            .request(&ctx("auto", &schema, None))
            .unwrap();
        assert_eq!(lexical.query_type, Some(QueryType::Simple));
        assert_eq!(lexical.search_mode, Some(SearchMode::Any));
        assert_eq!(lexical.top, Some(8));
        assert_eq!(lexical.select, vec!["chunk_id", "chunk", "title"]);

        assert!(FallbackStrategy::Vector
            .request(&ctx("auto", &schema, None))
            .is_none());
        let vector_only = FallbackStrategy::Vector
            .request(&ctx("auto", &schema, Some(&vector)))
            .unwrap();
        assert_eq!(vector_only.search, "*");
        assert_eq!(vector_only.top, Some(6));
        assert_eq!(vector_only.vector_queries.len(), 1);

        let keyword = FallbackStrategy::Keyword
            .request(&ctx("bris de glace", &schema, None))
            .unwrap();
        assert_eq!(keyword.search, "bris OR glace");
        assert_eq!(keyword.top, Some(5));
        assert_eq!(keyword.select, vec!["chunk_id", "chunk"]);

        assert!(FallbackStrategy::Keyword
            .request(&ctx("a b", &schema, None))
            .is_none());
    }

    #[test]
    fn test_format_primary_prefers_captions_and_appends_metadata() {
        let response: SearchResponse = serde_json::from_value(serde_json::json!({
            "@search.answers": [{"text": "Oui", "score": 0.8}],
            "value": [
                {
                    "@search.score": 2.0,
                    "@search.rerankerScore": 3.1,
                    "@search.captions": [{"text": "La franchise est de 300 €", "highlights": null}],
                    "chunk_id": "faq_1",
                    "chunk": "Texte complet",
                    "title": "Franchise",
                    "category": "Auto"
                },
                {"@search.score": 1.0, "chunk_id": "faq_2", "chunk": "Autre texte"}
            ]
        }))
        .unwrap();

        let text = format_primary(&response, &IndexSchema::default(), true, Duration::from_millis(250));
        let (blocks, metadata) = text.split_once(&format!("\n{METADATA_MARKER}")).unwrap();

        assert_eq!(
            blocks,
            "[faq_1]: La franchise est de 300 €\n-----\n[faq_2]: Autre texte\n-----\n"
        );

        let metadata: serde_json::Value = serde_json::from_str(metadata).unwrap();
        assert_eq!(metadata["sources"][0]["id"], "faq_1");
        assert_eq!(metadata["sources"][0]["content"], "Texte complet");
        assert_eq!(metadata["sources"][0]["reranker_score"], 3.1);
        assert_eq!(metadata["sources"][1]["title"], "");
        assert!(metadata["sources"][1]["reranker_score"].is_null());
        assert_eq!(metadata["semantic_answers"][0]["text"], "Oui");
        assert_eq!(metadata["search_stats"]["total_results"], 2);
        assert_eq!(metadata["search_stats"]["has_vector_search"], true);
        assert_eq!(metadata["search_stats"]["embedding_time"], 0.25);
    }
}
