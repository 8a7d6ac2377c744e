//! Knowledge-base retrieval: index client, query embedding, the search pipeline
//! and grounding lookup.
//!
//! [`SearchIndex`] and [`Embedder`] are the seams to the outside world; the
//! pipeline and grounding logic only talk to those traits, so both can be driven
//! by in-memory fakes.

pub mod client;
pub mod embedding;
pub mod grounding;
pub mod pipeline;

pub use client::{
    AzureSearchClient, Caption, QueryType, SearchDocument, SearchError, SearchIndex, SearchMode,
    SearchRequest, SearchResponse, SemanticAnswer, VectorQuery,
};
pub use embedding::{AzureOpenAiEmbedder, Embedder};
pub use grounding::{ConfidenceLevel, GroundingLookup, KEY_PATTERN, accepted_sources};
pub use pipeline::{
    FallbackStrategy, IndexSchema, NO_RESULTS_MESSAGE, SearchOutcome, SearchPipeline, SearchType,
};
