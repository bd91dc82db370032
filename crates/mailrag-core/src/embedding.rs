//! Embedding enrichment
//!
//! Attaches subject and body vectors to extracted messages before they are
//! mapped into documents. Vectors come from any [`Embedder`]; the bundled
//! [`HttpEmbedder`] speaks the OpenAI-compatible `/v1/embeddings` API.
//! [`search_similar`] ranks already-enriched messages without a search
//! engine.

use std::time::Duration;

use async_trait::async_trait;
use mailrag_common::config::EmbeddingConfig;
use mailrag_common::{Error, Message, MessageEmbeddings, Result, Thread};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::search::query::VectorField;

const NO_SUBJECT: &str = "No Subject";
const EMPTY_MESSAGE: &str = "Empty message";
const TRUNCATION_MARKER: &str = "...";

/// Source of fixed-dimension text embeddings
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, returning one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    config: EmbeddingConfig,
    dimension: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig, dimension: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            dimension,
            client,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.config.url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Invalid embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Subject and body text to embed for a message.
///
/// Falls back to placeholder text so every message gets both vectors. The
/// body is cut to `max_chars` characters with a trailing `...`.
pub fn embedding_inputs(message: &Message, max_chars: usize) -> (String, String) {
    let subject = match message.headers.subject_or_empty() {
        "" => NO_SUBJECT.to_string(),
        subject => subject.to_string(),
    };

    let body = [message.body.text.as_str(), message.snippet.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(EMPTY_MESSAGE);

    let body = if body.chars().count() > max_chars {
        let mut truncated: String = body.chars().take(max_chars).collect();
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    } else {
        body.to_string()
    };

    (subject, body)
}

/// Embed a single query string
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vector = embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("Empty embedding response".to_string()))?;
    check_dimension(&vector, embedder.dimension())?;
    Ok(vector)
}

/// Attach subject and body embeddings to every message of `threads`.
///
/// All subjects are embedded first, then all bodies, `batch_size` texts per
/// call. Nothing is written unless every vector has the embedder's
/// dimension. Returns the number of enriched messages.
pub async fn embed_threads(
    threads: &mut [Thread],
    embedder: &dyn Embedder,
    batch_size: usize,
    max_chars: usize,
) -> Result<usize> {
    let (subjects, bodies): (Vec<String>, Vec<String>) = threads
        .iter()
        .flat_map(|t| t.messages.iter())
        .map(|m| embedding_inputs(m, max_chars))
        .unzip();

    if subjects.is_empty() {
        info!("No messages to embed");
        return Ok(0);
    }

    info!(
        "Embedding {} messages from {} threads",
        subjects.len(),
        threads.len()
    );
    let subject_vectors = embed_batched(embedder, &subjects, batch_size, "subjects").await?;
    let body_vectors = embed_batched(embedder, &bodies, batch_size, "bodies").await?;

    let vectors = subject_vectors.into_iter().zip(body_vectors);
    let messages = threads.iter_mut().flat_map(|t| t.messages.iter_mut());
    let mut enriched = 0;
    for (message, (subject, body)) in messages.zip(vectors) {
        message.embeddings = Some(MessageEmbeddings {
            subject_embedding: Some(subject),
            body_embedding: Some(body),
        });
        enriched += 1;
    }

    Ok(enriched)
}

async fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    label: &str,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    let total_batches = texts.len().div_ceil(batch_size.max(1));

    for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        debug!("Embedding {} batch {}/{}", label, i + 1, total_batches);
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                embedded.len()
            )));
        }
        for vector in &embedded {
            check_dimension(vector, embedder.dimension())?;
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Rank embedded messages by cosine similarity to `query`.
///
/// Messages without a vector for `field`, with a zero-norm or
/// wrong-length vector, are skipped. Returns at most `top_k` hits, best
/// first.
pub async fn search_similar<'a>(
    embedder: &dyn Embedder,
    query: &str,
    threads: &'a [Thread],
    field: VectorField,
    top_k: usize,
) -> Result<Vec<(f32, &'a Message)>> {
    let query_vector = embed_query(embedder, query).await?;

    let mut scored: Vec<(f32, &Message)> = threads
        .iter()
        .flat_map(|t| t.messages.iter())
        .filter_map(|message| {
            let embeddings = message.embeddings.as_ref()?;
            let vector = match field {
                VectorField::Subject => embeddings.subject_embedding.as_deref(),
                VectorField::Body => embeddings.body_embedding.as_deref(),
            }?;
            match cosine_similarity(&query_vector, vector) {
                Some(score) => Some((score, message)),
                None => {
                    debug!("Skipping message {} with unusable {}", message.id, field);
                    None
                }
            }
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(top_k);
    Ok(scored)
}

/// `None` when lengths differ or either vector has zero norm
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    Some(dot / (norm_a * norm_b))
}

fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::Embedding(format!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}
