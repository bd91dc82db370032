//! Common types for mailrag
//!
//! `Thread` and `Message` are the normalized projection of provider data that
//! the pipeline stages exchange as JSON files. `IndexDocument` is the flat
//! per-message record sent to the search engine.

use serde::{Deserialize, Deserializer, Serialize};

/// A normalized conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thread {
    /// Provider-assigned thread ID
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    /// Provider history ID at fetch time
    pub history_id: Option<String>,
    /// Messages in provider order
    pub messages: Vec<Message>,
}

/// A normalized message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub thread_id: String,
    pub label_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub snippet: String,
    pub headers: MessageHeaders,
    pub body: MessageBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<MessageEmbeddings>,
}

/// Read a JSON `null` string as empty
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Recognized headers, absent ones omitted from JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageHeaders {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl MessageHeaders {
    /// Store a header value if `name` is recognized (case-insensitive).
    ///
    /// Returns false for unrecognized names, which are dropped.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        let slot = match name.to_ascii_lowercase().as_str() {
            "from" => &mut self.from,
            "to" => &mut self.to,
            "cc" => &mut self.cc,
            "bcc" => &mut self.bcc,
            "subject" => &mut self.subject,
            "date" => &mut self.date,
            _ => return false,
        };
        *slot = Some(value.into());
        true
    }

    pub fn from_or_empty(&self) -> &str {
        self.from.as_deref().unwrap_or_default()
    }

    pub fn to_or_empty(&self) -> &str {
        self.to.as_deref().unwrap_or_default()
    }

    pub fn cc_or_empty(&self) -> &str {
        self.cc.as_deref().unwrap_or_default()
    }

    pub fn bcc_or_empty(&self) -> &str {
        self.bcc.as_deref().unwrap_or_default()
    }

    pub fn subject_or_empty(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }

    pub fn date_or_empty(&self) -> &str {
        self.date.as_deref().unwrap_or_default()
    }
}

/// Decoded body text, accumulated across all parts of each type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageBody {
    pub text: String,
    pub html: String,
}

/// Vectors attached by the embedding stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageEmbeddings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_embedding: Option<Vec<f32>>,
}

/// Search-engine document, one per message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDocument {
    /// Message ID (document ID)
    pub id: String,
    pub thread_id: String,
    pub message_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    /// RFC 3339 date, null when the header did not parse
    pub date: Option<String>,
    /// Same value as `date`, kept as the sort field
    pub timestamp: Option<String>,
    pub body_text: String,
    pub body_html: String,
    pub snippet: String,
    pub labels: Vec<String>,
    pub thread_message_count: usize,
    pub thread_position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_embedding: Option<Vec<f32>>,
}

/// Thread listing entry written by thread search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSummary {
    pub id: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}
