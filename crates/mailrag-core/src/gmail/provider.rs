//! Gmail API wire types
//!
//! Every field is optional: the extractor treats missing data as empty rather
//! than rejecting the message.

use serde::{Deserialize, Serialize};

/// `users.threads.get` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderThread {
    pub id: Option<String>,
    pub history_id: Option<String>,
    pub snippet: Option<String>,
    #[serde(default)]
    pub messages: Vec<ProviderMessage>,
}

/// A message inside a thread
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMessage {
    pub id: Option<String>,
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    pub payload: Option<MessagePart>,
    pub internal_date: Option<String>,
}

/// A node of the MIME tree; the top-level payload is one too
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    pub part_id: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: Vec<PartHeader>,
    pub body: Option<PartBody>,
    /// `Some` marks a container, even when the list is empty
    pub parts: Option<Vec<MessagePart>>,
}

impl MessagePart {
    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or_default()
    }

    /// Encoded payload, `None` when absent or empty
    pub fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }
}

/// `{name, value}` header entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartHeader {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Part body; `data` is base64url
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    pub data: Option<String>,
    pub size: Option<u64>,
    pub attachment_id: Option<String>,
}

/// `users.threads.list` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadListResponse {
    #[serde(default)]
    pub threads: Vec<ThreadRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

/// Thread entry of a list response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRef {
    pub id: String,
    #[serde(default)]
    pub snippet: String,
    pub history_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_nested_payload() {
        let thread: ProviderThread = serde_json::from_value(serde_json::json!({
            "id": "t1",
            "historyId": "9",
            "messages": [{
                "id": "m1",
                "threadId": "t1",
                "labelIds": ["INBOX"],
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [{"name": "Subject", "value": "Hi"}],
                    "parts": [
                        {"mimeType": "text/plain", "body": {"data": "SGVsbG8=", "size": 5}},
                        {"mimeType": "image/png", "filename": "a.png", "body": {"attachmentId": "x"}}
                    ]
                }
            }]
        }))
        .unwrap();

        let payload = thread.messages[0].payload.as_ref().unwrap();
        assert_eq!(payload.mime_type(), "multipart/alternative");
        let parts = payload.parts.as_ref().unwrap();
        assert_eq!(parts[0].data(), Some("SGVsbG8="));
        assert_eq!(parts[1].data(), None);
    }

    #[test]
    fn test_empty_data_is_none() {
        let part = MessagePart {
            body: Some(PartBody {
                data: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(part.data().is_none());
    }
}
