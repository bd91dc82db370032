//! mailrag Common - Shared types and utilities
//!
//! This crate provides the configuration, error type and the thread/message
//! data model shared by the extraction, enrichment and indexing stages.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    IndexDocument, Message, MessageBody, MessageEmbeddings, MessageHeaders, Thread, ThreadSummary,
};
