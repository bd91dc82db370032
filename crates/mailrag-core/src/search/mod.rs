//! Search module with OpenSearch integration
//!
//! Maps extracted threads into per-message documents, defines the index
//! schema, builds lexical / vector / hybrid query bodies, and talks to the
//! engine over its REST API.

pub mod client;
pub mod mapper;
pub mod query;
pub mod schema;

pub use client::{BulkOutcome, IndexStats, OpenSearchClient, SearchHit, SearchResponse};
pub use mapper::{map_thread_to_documents, map_threads, to_bulk_actions, BulkAction};
pub use query::{hybrid_query, lexical_query, vector_query, HybridParams, VectorField};
pub use schema::{index_body, IndexSetup};
