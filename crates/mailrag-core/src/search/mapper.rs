//! Message document mapping for the search index
//!
//! Flattens each message of a [`Thread`] into an [`IndexDocument`],
//! denormalizing thread metadata onto every document.

use chrono::DateTime;
use mailrag_common::{IndexDocument, Message, Result, Thread};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One entry of a bulk upload request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAction {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: IndexDocument,
}

impl BulkAction {
    /// Render as the two NDJSON lines of an `index` operation
    pub fn to_ndjson(&self) -> Result<String> {
        let action = serde_json::json!({
            "index": { "_index": self.index, "_id": self.id }
        });
        Ok(format!(
            "{}\n{}\n",
            serde_json::to_string(&action)?,
            serde_json::to_string(&self.source)?
        ))
    }
}

/// Map every message of a thread, in thread order.
///
/// Position and count are derived from the thread as passed in, so a
/// reordered or grown thread maps to fresh values.
pub fn map_thread_to_documents(thread: &Thread) -> Vec<IndexDocument> {
    let count = thread.messages.len();

    thread
        .messages
        .iter()
        .enumerate()
        .map(|(position, message)| map_message(&thread.id, message, position, count))
        .collect()
}

/// Map a batch of threads into one flat document list
pub fn map_threads(threads: &[Thread]) -> Vec<IndexDocument> {
    let documents: Vec<IndexDocument> = threads.iter().flat_map(map_thread_to_documents).collect();
    debug!(
        "Mapped {} messages from {} threads",
        documents.len(),
        threads.len()
    );
    documents
}

/// Build the document for one message
pub fn map_message(
    thread_id: &str,
    message: &Message,
    position: usize,
    count: usize,
) -> IndexDocument {
    let headers = &message.headers;
    let date = normalize_date(headers.date_or_empty());
    let embeddings = message.embeddings.as_ref();

    IndexDocument {
        id: message.id.clone(),
        thread_id: thread_id.to_string(),
        message_id: message.id.clone(),
        subject: headers.subject_or_empty().to_string(),
        from: headers.from_or_empty().to_string(),
        to: headers.to_or_empty().to_string(),
        cc: headers.cc_or_empty().to_string(),
        bcc: headers.bcc_or_empty().to_string(),
        timestamp: date.clone(),
        date,
        body_text: message.body.text.clone(),
        body_html: message.body.html.clone(),
        snippet: message.snippet.clone(),
        labels: message.label_ids.clone(),
        thread_message_count: count,
        thread_position: position,
        subject_embedding: embeddings.and_then(|e| e.subject_embedding.clone()),
        body_embedding: embeddings.and_then(|e| e.body_embedding.clone()),
    }
}

/// Wrap documents for a bulk upload into `index`
pub fn to_bulk_actions(index: &str, documents: Vec<IndexDocument>) -> Vec<BulkAction> {
    documents
        .into_iter()
        .map(|source| BulkAction {
            index: index.to_string(),
            id: source.id.clone(),
            source,
        })
        .collect()
}

/// Parse an RFC 2822 `Date` header into RFC 3339, keeping its offset.
///
/// Returns `None` for empty or unparseable input. Trailing comments such as
/// `(UTC)` or `(Pacific Standard Time)` are ignored.
pub fn normalize_date(raw: &str) -> Option<String> {
    let candidate = strip_trailing_comments(raw.trim());
    if candidate.is_empty() {
        return None;
    }

    match DateTime::parse_from_rfc2822(candidate) {
        Ok(dt) => Some(dt.to_rfc3339()),
        Err(e) => {
            debug!("Unparseable date {:?}: {}", raw, e);
            None
        }
    }
}

fn strip_trailing_comments(mut value: &str) -> &str {
    while value.ends_with(')') {
        match value.rfind('(') {
            Some(open) => value = value[..open].trim_end(),
            None => break,
        }
    }
    value
}
