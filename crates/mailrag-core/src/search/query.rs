//! OpenSearch query construction
//!
//! Pure builders for the three query shapes run against the message index:
//! lexical, k-NN vector, and a hybrid OR of the two. Nothing here talks to
//! the engine.

use mailrag_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Fields matched by lexical search, with boosts
pub const LEXICAL_FIELDS: [&str; 5] = ["subject^2", "body_text", "from", "to", "snippet"];

/// Source fields dropped from vector and hybrid responses
pub const EXCLUDED_SOURCE_FIELDS: [&str; 3] = ["subject_embedding", "body_embedding", "body_html"];

/// Fields returned with highlighted fragments
pub const HIGHLIGHT_FIELDS: [&str; 2] = ["subject", "body_text"];

/// Vector field a k-NN query runs against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorField {
    #[serde(rename = "subject_embedding")]
    Subject,
    #[default]
    #[serde(rename = "body_embedding")]
    Body,
}

impl VectorField {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorField::Subject => "subject_embedding",
            VectorField::Body => "body_embedding",
        }
    }
}

impl std::fmt::Display for VectorField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VectorField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "subject" | "subject_embedding" => Ok(VectorField::Subject),
            "body" | "body_embedding" => Ok(VectorField::Body),
            other => Err(Error::Validation(format!(
                "Unknown vector field '{}', expected subject_embedding or body_embedding",
                other
            ))),
        }
    }
}

/// Parameters of a hybrid query
#[derive(Debug, Clone, PartialEq)]
pub struct HybridParams<'a> {
    pub text: &'a str,
    pub vector: &'a [f32],
    pub field: VectorField,
    pub k: usize,
    pub text_weight: f32,
    pub vector_weight: f32,
}

impl<'a> HybridParams<'a> {
    /// Default weighting of 0.3 text / 0.7 vector
    pub fn new(text: &'a str, vector: &'a [f32], field: VectorField, k: usize) -> Self {
        Self {
            text,
            vector,
            field,
            k,
            text_weight: 0.3,
            vector_weight: 0.7,
        }
    }

    pub fn with_weights(mut self, text_weight: f32, vector_weight: f32) -> Self {
        self.text_weight = text_weight;
        self.vector_weight = vector_weight;
        self
    }
}

/// Multi-field match, newest first with undated messages last
pub fn lexical_query(text: &str, size: usize) -> Result<Value> {
    ensure_positive("size", size)?;

    Ok(json!({
        "query": multi_match(text, None),
        "size": size,
        "sort": [{ "timestamp": { "order": "desc", "missing": "_last" } }],
        "highlight": highlight(),
    }))
}

/// k-NN query against one vector field.
///
/// `min_score` is applied by the engine after ranking.
pub fn vector_query(
    vector: &[f32],
    field: VectorField,
    k: usize,
    min_score: Option<f32>,
) -> Result<Value> {
    ensure_positive("k", k)?;
    ensure_vector(vector)?;

    let mut body = json!({
        "size": k,
        "query": knn(vector, field, k, None),
        "_source": { "excludes": EXCLUDED_SOURCE_FIELDS },
    });

    if let Some(min_score) = min_score {
        if !min_score.is_finite() {
            return Err(Error::Validation("min_score must be finite".to_string()));
        }
        body["min_score"] = json!(min_score);
    }

    Ok(body)
}

/// Lexical OR vector, each branch boosted by its own weight.
///
/// Weights are independent multipliers and are not normalized. A zero
/// weight removes its branch, so the result is exactly the other branch's
/// pure query.
///
/// The text branch matches the same fields as [`lexical_query`], `snippet`
/// included, so hybrid and lexical scores stay comparable.
pub fn hybrid_query(params: &HybridParams<'_>) -> Result<Value> {
    ensure_positive("k", params.k)?;
    ensure_weight("text_weight", params.text_weight)?;
    ensure_weight("vector_weight", params.vector_weight)?;

    match (params.text_weight == 0.0, params.vector_weight == 0.0) {
        (true, true) => Err(Error::Validation(
            "text_weight and vector_weight cannot both be zero".to_string(),
        )),
        (false, true) => lexical_query(params.text, params.k),
        (true, false) => vector_query(params.vector, params.field, params.k, None),
        (false, false) => {
            ensure_vector(params.vector)?;
            Ok(json!({
                "size": params.k,
                "query": {
                    "bool": {
                        "should": [
                            multi_match(params.text, Some(params.text_weight)),
                            knn(params.vector, params.field, params.k, Some(params.vector_weight)),
                        ]
                    }
                },
                "_source": { "excludes": EXCLUDED_SOURCE_FIELDS },
                "highlight": highlight(),
            }))
        }
    }
}

/// Cardinality of `thread_id`, no hits
pub fn unique_threads_query() -> Value {
    json!({
        "size": 0,
        "aggs": { "unique_threads": { "cardinality": { "field": "thread_id" } } }
    })
}

fn multi_match(text: &str, boost: Option<f32>) -> Value {
    let mut clause = json!({ "query": text, "fields": LEXICAL_FIELDS });
    if let Some(boost) = boost {
        clause["boost"] = json!(boost);
    }
    json!({ "multi_match": clause })
}

fn knn(vector: &[f32], field: VectorField, k: usize, boost: Option<f32>) -> Value {
    let mut clause = json!({ "vector": vector, "k": k });
    if let Some(boost) = boost {
        clause["boost"] = json!(boost);
    }
    json!({ "knn": { field.as_str(): clause } })
}

fn highlight() -> Value {
    let fields: serde_json::Map<String, Value> = HIGHLIGHT_FIELDS
        .iter()
        .map(|f| (f.to_string(), json!({})))
        .collect();
    json!({ "fields": fields })
}

fn ensure_positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::Validation(format!("{} must be a positive integer", name)));
    }
    Ok(())
}

fn ensure_weight(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Validation(format!(
            "{} must be a finite, non-negative number",
            name
        )));
    }
    Ok(())
}

fn ensure_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::Validation("query vector must not be empty".to_string()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation(
            "query vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}
