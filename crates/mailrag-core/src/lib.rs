//! mailrag Core - thread extraction, enrichment and indexing
//!
//! This crate turns Gmail threads into per-message search documents,
//! optionally enriches them with embeddings, and builds and runs the
//! lexical, vector and hybrid queries against OpenSearch.

pub mod embedding;
pub mod gmail;
pub mod search;

pub use embedding::{
    embed_query, embed_threads, embedding_inputs, search_similar, Embedder, HttpEmbedder,
};
pub use gmail::{extract_thread, GmailClient, ProviderThread, ThreadFormat, ThreadIdEntry};
pub use search::{
    hybrid_query, index_body, lexical_query, map_thread_to_documents, map_threads,
    to_bulk_actions, vector_query, BulkAction, BulkOutcome, HybridParams, IndexSetup, IndexStats,
    OpenSearchClient, SearchHit, SearchResponse, VectorField,
};
