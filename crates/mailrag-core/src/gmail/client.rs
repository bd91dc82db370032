//! Gmail REST client
//!
//! Read-only access to `users.threads.list` and `users.threads.get` with a
//! bearer token obtained out of band.

use std::time::Duration;

use mailrag_common::config::{GmailConfig, ENV_GMAIL_TOKEN};
use mailrag_common::{Error, Result, Thread, ThreadSummary};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::extract::extract_thread;
use super::provider::{ProviderThread, ThreadListResponse, ThreadRef};

/// Largest page `threads.list` will return
const MAX_PAGE_SIZE: usize = 100;

/// Characters of the list snippet kept in a summary
const SUMMARY_SNIPPET_CHARS: usize = 100;

const NO_SUBJECT: &str = "No subject";
const SUBJECT_ERROR: &str = "Error fetching subject";

/// Detail level requested from `threads.get`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThreadFormat {
    #[default]
    Full,
    Metadata,
    Minimal,
}

impl ThreadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadFormat::Full => "full",
            ThreadFormat::Metadata => "metadata",
            ThreadFormat::Minimal => "minimal",
        }
    }
}

/// Entry of a thread id file: a bare id or a summary object with an `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThreadIdEntry {
    Id(String),
    Summary { id: String },
}

impl ThreadIdEntry {
    pub fn id(&self) -> &str {
        match self {
            ThreadIdEntry::Id(id) | ThreadIdEntry::Summary { id } => id,
        }
    }
}

/// Gmail API client
#[derive(Debug, Clone)]
pub struct GmailClient {
    config: GmailConfig,
    client: Client,
    token: String,
}

impl GmailClient {
    /// Create a client; fails when no access token is configured
    pub fn new(config: GmailConfig) -> Result<Self> {
        let token = config
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Config(format!(
                    "Gmail access token missing: set gmail.access_token or {}",
                    ENV_GMAIL_TOKEN
                ))
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token,
        })
    }

    fn build_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);
        self.client.request(method, &url).bearer_auth(&self.token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Provider(format!("{}: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("{} response body: {}", context, body);
            return Err(Error::Provider(format!("{}: {}", context, status)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("{}: invalid response: {}", context, e)))
    }

    /// List threads matching a Gmail search query, following pagination
    /// until `max_results` threads are collected or pages run out.
    pub async fn list_threads(&self, query: &str, max_results: usize) -> Result<Vec<ThreadRef>> {
        let mut threads: Vec<ThreadRef> = Vec::new();
        let mut page_token: Option<String> = None;

        while threads.len() < max_results {
            let page_size = MAX_PAGE_SIZE.min(max_results - threads.len());
            let mut params = vec![("maxResults", page_size.to_string())];
            if !query.is_empty() {
                params.push(("q", query.to_string()));
            }
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: ThreadListResponse = self
                .get_json(
                    self.build_request(Method::GET, "/threads").query(&params),
                    "Failed to list threads",
                )
                .await?;
            debug!("Listed {} threads", page.threads.len());
            threads.extend(page.threads);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        threads.truncate(max_results);
        Ok(threads)
    }

    /// Fetch one thread with all its messages
    pub async fn get_thread(&self, thread_id: &str, format: ThreadFormat) -> Result<ProviderThread> {
        let path = format!("/threads/{}", thread_id);
        self.get_json(
            self.build_request(Method::GET, &path)
                .query(&[("format", format.as_str())]),
            &format!("Failed to fetch thread {}", thread_id),
        )
        .await
    }

    /// List threads and fetch the full content of each
    pub async fn fetch_threads(&self, query: &str, max_threads: usize) -> Result<Vec<Thread>> {
        info!("Fetching up to {} threads", max_threads);
        let listed = self.list_threads(query, max_threads).await?;
        if listed.is_empty() {
            info!("No threads found");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = listed.into_iter().map(|t| t.id).collect();
        Ok(self.fetch_thread_list(&ids).await)
    }

    /// Fetch and extract each thread id; failures are logged and skipped
    pub async fn fetch_thread_list(&self, thread_ids: &[String]) -> Vec<Thread> {
        let mut threads = Vec::with_capacity(thread_ids.len());

        for (i, thread_id) in thread_ids.iter().enumerate() {
            info!("Fetching thread {}/{}: {}", i + 1, thread_ids.len(), thread_id);
            match self.get_thread(thread_id, ThreadFormat::Full).await {
                Ok(thread) => threads.push(extract_thread(&thread)),
                Err(e) => warn!("Skipping thread {}: {}", thread_id, e),
            }
        }

        threads
    }

    /// List matching threads as summaries.
    ///
    /// With `fetch_metadata` each thread is fetched in metadata format to
    /// read the first message's subject.
    pub async fn search_threads(
        &self,
        query: &str,
        max_results: usize,
        fetch_metadata: bool,
    ) -> Result<Vec<ThreadSummary>> {
        info!("Searching for threads with query: {}", query);
        let listed = self.list_threads(query, max_results).await?;
        let total = listed.len();
        info!("Found {} threads", total);

        let mut summaries = Vec::with_capacity(total);
        for (i, thread) in listed.into_iter().enumerate() {
            let subject = if fetch_metadata {
                if i % 10 == 0 {
                    debug!("Fetching metadata {}/{}", i, total);
                }
                Some(self.first_subject(&thread.id).await)
            } else {
                None
            };

            summaries.push(ThreadSummary {
                snippet: thread.snippet.chars().take(SUMMARY_SNIPPET_CHARS).collect(),
                id: thread.id,
                subject,
            });
        }

        Ok(summaries)
    }

    async fn first_subject(&self, thread_id: &str) -> String {
        match self.get_thread(thread_id, ThreadFormat::Metadata).await {
            Ok(thread) => thread
                .messages
                .first()
                .and_then(|m| m.payload.as_ref())
                .and_then(|p| {
                    p.headers
                        .iter()
                        .find(|h| h.name.eq_ignore_ascii_case("subject"))
                })
                .map(|h| h.value.clone())
                .unwrap_or_else(|| NO_SUBJECT.to_string()),
            Err(e) => {
                warn!("Failed to fetch metadata for {}: {}", thread_id, e);
                SUBJECT_ERROR.to_string()
            }
        }
    }
}
