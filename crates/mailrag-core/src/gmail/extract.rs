//! Thread content extraction
//!
//! Turns Gmail API threads into the normalized [`Thread`] shape: recognized
//! headers only, and the decoded `text/plain` / `text/html` content of the
//! MIME tree flattened into one body. Extraction never fails; anything that
//! cannot be read becomes an empty string.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use mailrag_common::{Message, MessageBody, MessageHeaders, Thread};
use tracing::trace;

use super::provider::{MessagePart, PartHeader, ProviderMessage, ProviderThread};

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// Gmail emits URL-safe data; standard alphabet shows up in exported dumps.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Extract a whole thread, preserving message order
pub fn extract_thread(thread: &ProviderThread) -> Thread {
    Thread {
        id: thread.id.clone().unwrap_or_default(),
        history_id: thread.history_id.clone(),
        messages: thread.messages.iter().map(extract_message).collect(),
    }
}

/// Extract a single message
pub fn extract_message(message: &ProviderMessage) -> Message {
    let (headers, body) = match &message.payload {
        Some(payload) => (extract_headers(&payload.headers), extract_body(payload)),
        None => Default::default(),
    };

    Message {
        id: message.id.clone().unwrap_or_default(),
        thread_id: message.thread_id.clone().unwrap_or_default(),
        label_ids: message.label_ids.clone(),
        snippet: message.snippet.clone().unwrap_or_default(),
        headers,
        body,
        embeddings: None,
    }
}

/// Keep the six recognized headers; a repeated name keeps the last value.
pub fn extract_headers(headers: &[PartHeader]) -> MessageHeaders {
    let mut out = MessageHeaders::default();
    for header in headers {
        if !out.set(&header.name, header.value.as_str()) {
            trace!("Dropping header {}", header.name);
        }
    }
    out
}

/// Flatten the payload into `{text, html}`.
///
/// A payload carrying a `parts` list is walked part by part. Otherwise the
/// top-level body is used and dispatched on a substring match of its MIME
/// type, so `text/plain; charset=utf-8` still lands in `text`.
pub fn extract_body(payload: &MessagePart) -> MessageBody {
    let mut body = MessageBody::default();

    match &payload.parts {
        Some(parts) => collect_parts(parts, &mut body),
        None => {
            if let Some(data) = payload.data() {
                let content = decode_body_data(data);
                let mime_type = payload.mime_type();
                if mime_type.contains("text/plain") {
                    body.text = content;
                } else if mime_type.contains("text/html") {
                    body.html = content;
                }
            }
        }
    }

    body
}

/// Pre-order walk with an explicit stack: a part is visited before its
/// children, and children before the part's next sibling.
fn collect_parts(parts: &[MessagePart], body: &mut MessageBody) {
    let mut stack: Vec<&MessagePart> = parts.iter().rev().collect();

    while let Some(part) = stack.pop() {
        if let Some(data) = part.data() {
            match part.mime_type() {
                "text/plain" => body.text.push_str(&decode_body_data(data)),
                "text/html" => body.html.push_str(&decode_body_data(data)),
                other => trace!("Skipping {} part", other),
            }
        }

        if let Some(children) = &part.parts {
            stack.extend(children.iter().rev());
        }
    }
}

/// Decode base64url data into text.
///
/// Invalid UTF-8 is replaced and undecodable base64 yields an empty string.
pub fn decode_body_data(data: &str) -> String {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = URL_SAFE_LENIENT
        .decode(cleaned.as_bytes())
        .or_else(|_| STANDARD_LENIENT.decode(cleaned.as_bytes()));

    match bytes {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            trace!("Undecodable body data: {}", e);
            String::new()
        }
    }
}
