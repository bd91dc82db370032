//! Index settings and mappings for the message index

use serde_json::{json, Value};

/// Analyzer applied to address fields
pub const EMAIL_ANALYZER: &str = "email_analyzer";

/// HNSW graph construction parameters
pub const HNSW_EF_CONSTRUCTION: u32 = 128;
pub const HNSW_M: u32 = 24;

/// Outcome of index setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSetup {
    /// Index did not exist and was created
    Created,
    /// Existing index was dropped and created again
    Recreated,
    /// Index was already present and left untouched
    AlreadyExists,
}

impl IndexSetup {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexSetup::Created => "created",
            IndexSetup::Recreated => "recreated",
            IndexSetup::AlreadyExists => "already exists",
        }
    }
}

/// Full `PUT /{index}` body for vectors of `embedding_dim` dimensions
pub fn index_body(embedding_dim: usize) -> Value {
    json!({
        "settings": settings(),
        "mappings": { "properties": properties(embedding_dim) },
    })
}

fn settings() -> Value {
    json!({
        "number_of_shards": 1,
        "number_of_replicas": 0,
        "index.knn": true,
        "index.knn.space_type": "cosinesimil",
        "analysis": {
            "analyzer": {
                EMAIL_ANALYZER: {
                    "type": "custom",
                    "tokenizer": "uax_url_email",
                    "filter": ["lowercase", "stop"]
                }
            }
        }
    })
}

fn properties(embedding_dim: usize) -> Value {
    let mut properties = json!({
        "id": { "type": "keyword" },
        "thread_id": { "type": "keyword" },
        "message_id": { "type": "keyword" },
        "subject": {
            "type": "text",
            "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
        },
        "date": { "type": "date", "ignore_malformed": true },
        "timestamp": { "type": "date", "ignore_malformed": true },
        "body_text": { "type": "text", "analyzer": "standard" },
        "body_html": { "type": "text", "analyzer": "standard" },
        "snippet": { "type": "text" },
        "labels": { "type": "keyword" },
        "thread_message_count": { "type": "integer" },
        "thread_position": { "type": "integer" },
        "subject_embedding": knn_vector(embedding_dim),
        "body_embedding": knn_vector(embedding_dim),
    });

    for field in ["from", "to", "cc", "bcc"] {
        properties[field] = address_field();
    }

    properties
}

fn address_field() -> Value {
    json!({
        "type": "text",
        "analyzer": EMAIL_ANALYZER,
        "fields": { "keyword": { "type": "keyword" } }
    })
}

fn knn_vector(dimension: usize) -> Value {
    json!({
        "type": "knn_vector",
        "dimension": dimension,
        "method": {
            "name": "hnsw",
            "space_type": "cosinesimil",
            "engine": "nmslib",
            "parameters": { "ef_construction": HNSW_EF_CONSTRUCTION, "m": HNSW_M }
        }
    })
}
