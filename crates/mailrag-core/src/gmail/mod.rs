//! Gmail thread retrieval and content extraction

pub mod client;
pub mod extract;
pub mod provider;

pub use client::{GmailClient, ThreadFormat, ThreadIdEntry};
pub use extract::{decode_body_data, extract_body, extract_headers, extract_message, extract_thread};
pub use provider::{MessagePart, PartBody, PartHeader, ProviderMessage, ProviderThread, ThreadRef};
