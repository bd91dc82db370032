//! OpenSearch client implementation

use std::collections::HashMap;
use std::time::Duration;

use mailrag_common::config::OpenSearchConfig;
use mailrag_common::{Error, IndexDocument, Result};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::mapper::to_bulk_actions;
use super::query::unique_threads_query;
use super::schema::{index_body, IndexSetup};

/// Item errors kept for reporting after a bulk upload
const MAX_REPORTED_ERRORS: usize = 5;

/// Search response from OpenSearch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub hits: SearchHits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
}

impl SearchResponse {
    /// Total matches reported by the engine
    pub fn total(&self) -> u64 {
        self.hits.total.as_ref().map(|t| t.value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    #[serde(default)]
    pub relation: String,
}

/// A matched message with optional highlight fragments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: IndexDocument,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub highlight: HashMap<String, Vec<String>>,
}

impl SearchHit {
    /// First highlighted fragment for `field`
    pub fn fragment(&self, field: &str) -> Option<&str> {
        self.highlight
            .get(field)
            .and_then(|f| f.first())
            .map(String::as_str)
    }
}

/// Result of a bulk upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// First few item errors, for display
    pub errors: Vec<String>,
}

impl BulkOutcome {
    fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub index_name: String,
    pub total_messages: u64,
    pub unique_threads: u64,
    pub index_size_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    status: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// OpenSearch client for the message index
///
/// Owned by the caller and passed to whatever needs it; cheap to clone.
#[derive(Debug, Clone)]
pub struct OpenSearchClient {
    config: OpenSearchConfig,
    client: Client,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client
    pub fn new(config: OpenSearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Search(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    /// Build a request with optional basic auth
    fn build_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.url.trim_end_matches('/'), path);
        let request = self.client.request(method, &url);

        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| Error::Search(format!("{}: {}", context, e)))
    }

    /// Check if the cluster is reachable and green or yellow
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .send(
                self.build_request(Method::GET, "/_cluster/health"),
                "Health check request failed",
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                warn!("Failed to read OpenSearch health response body: {}", e);
                String::new()
            });
            warn!("OpenSearch health check failed: status={} body={}", status, body);
            return Ok(false);
        }

        let health: ClusterHealth = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse health response: {}", e)))?;
        info!("OpenSearch cluster status: {}", health.status);

        Ok(matches!(health.status.as_str(), "green" | "yellow"))
    }

    /// Whether the message index exists
    pub async fn index_exists(&self) -> Result<bool> {
        let path = format!("/{}", self.config.index_name);
        let response = self
            .send(self.build_request(Method::HEAD, &path), "Index lookup failed")
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Error::Search(format!("Index lookup failed: {}", status))),
        }
    }

    /// Create the message index.
    ///
    /// An existing index is left alone unless `recreate` is set, in which
    /// case it is deleted together with its documents first.
    pub async fn setup_index(&self, recreate: bool) -> Result<IndexSetup> {
        let index_name = &self.config.index_name;

        if self.index_exists().await? {
            if !recreate {
                info!("Index {} already exists", index_name);
                return Ok(IndexSetup::AlreadyExists);
            }

            warn!("Deleting existing index: {}", index_name);
            self.delete_index().await?;
            return match self.create_index().await? {
                IndexSetup::Created => Ok(IndexSetup::Recreated),
                other => Ok(other),
            };
        }

        self.create_index().await
    }

    async fn create_index(&self) -> Result<IndexSetup> {
        let index_name = &self.config.index_name;
        let path = format!("/{}", index_name);
        let body = index_body(self.config.embedding_dim);

        info!("Creating index: {}", index_name);
        let response = self
            .send(
                self.build_request(Method::PUT, &path).json(&body),
                "Failed to create index",
            )
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Index {} ready", index_name);
            return Ok(IndexSetup::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if body.contains("resource_already_exists_exception") {
            info!("Index {} already exists", index_name);
            return Ok(IndexSetup::AlreadyExists);
        }

        error!("Failed to create index: {} - {}", status, body);
        Err(Error::Search(format!("Failed to create index: {}", status)))
    }

    async fn delete_index(&self) -> Result<()> {
        let path = format!("/{}", self.config.index_name);
        let response = self
            .send(self.build_request(Method::DELETE, &path), "Failed to delete index")
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Failed to delete index: {} - {}", status, body);
            Err(Error::Search(format!("Failed to delete index: {}", status)))
        }
    }

    /// Upload documents with `_bulk`, one request per batch.
    ///
    /// Item failures and failed batches are counted, never retried. A
    /// batch whose response cannot be read counts as failed.
    pub async fn bulk_index(&self, documents: Vec<IndexDocument>) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        if documents.is_empty() {
            return Ok(outcome);
        }

        info!("Indexing {} messages", documents.len());
        let actions = to_bulk_actions(&self.config.index_name, documents);

        for batch in actions.chunks(self.config.bulk_batch_size.max(1)) {
            let mut payload = String::new();
            for action in batch {
                payload.push_str(&action.to_ndjson()?);
            }

            let request = self
                .build_request(Method::POST, "/_bulk")
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(payload);

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    error!("Bulk request failed: {}", e);
                    outcome.failed += batch.len();
                    outcome.record_error(format!("bulk request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!("Bulk request rejected: {} - {}", status, body);
                outcome.failed += batch.len();
                outcome.record_error(format!("bulk request rejected: {}", status));
                continue;
            }

            let parsed: BulkResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!("Failed to parse bulk response: {}", e);
                    outcome.failed += batch.len();
                    outcome.record_error(format!("unreadable bulk response: {}", e));
                    continue;
                }
            };

            for item in parsed.items.iter().flat_map(|entry| entry.values()) {
                match &item.error {
                    None if (200..300).contains(&item.status) => outcome.succeeded += 1,
                    error => {
                        outcome.failed += 1;
                        outcome.record_error(format!(
                            "{}: status {} {}",
                            item.id.as_deref().unwrap_or("?"),
                            item.status,
                            error.as_ref().map(Value::to_string).unwrap_or_default()
                        ));
                    }
                }
            }
        }

        debug!(
            "Bulk upload finished: {} succeeded, {} failed",
            outcome.succeeded, outcome.failed
        );
        Ok(outcome)
    }

    /// Run a query body against the message index
    pub async fn search(&self, body: &Value) -> Result<SearchResponse> {
        let path = format!("/{}/_search", self.config.index_name);

        let response = self
            .send(self.build_request(Method::POST, &path).json(body), "Search failed")
            .await?;

        let status = response.status();
        if status.is_success() {
            let result: SearchResponse = response
                .json()
                .await
                .map_err(|e| Error::Search(format!("Failed to parse search response: {}", e)))?;
            debug!(
                "Search completed in {}ms, {} hits",
                result.took,
                result.hits.hits.len()
            );
            Ok(result)
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Search failed: {} - {}", status, body);
            Err(Error::Search(format!("Search failed: {}", status)))
        }
    }

    /// Document count, unique threads and store size of the index
    pub async fn stats(&self) -> Result<IndexStats> {
        let index_name = &self.config.index_name;

        let count: CountResponse = self.get_json(&format!("/{}/_count", index_name)).await?;

        let stats: Value = self.get_json(&format!("/{}/_stats", index_name)).await?;
        let index_size_bytes = stats
            .pointer(&format!("/indices/{}/primaries/store/size_in_bytes", index_name))
            .and_then(Value::as_u64)
            .unwrap_or_default();

        let aggregation = self.search(&unique_threads_query()).await?;
        let unique_threads = aggregation
            .aggregations
            .as_ref()
            .and_then(|a| a.pointer("/unique_threads/value"))
            .and_then(Value::as_u64)
            .unwrap_or_default();

        Ok(IndexStats {
            index_name: index_name.clone(),
            total_messages: count.count,
            unique_threads,
            index_size_bytes,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .send(self.build_request(Method::GET, path), "Request failed")
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Search(format!("GET {} failed: {}", path, status)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse {} response: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenSearchClient {
        OpenSearchClient::new(OpenSearchConfig {
            url: server.uri(),
            bulk_batch_size: 2,
            ..Default::default()
        })
        .unwrap()
    }

    fn doc(id: &str) -> IndexDocument {
        IndexDocument {
            id: id.to_string(),
            message_id: id.to_string(),
            thread_id: "t1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = OpenSearchConfig::default();
        assert_eq!(config.url, "http://localhost:9200");
        assert_eq!(config.index_name, "gmail-threads");
        assert!(config.username.is_none());
    }

    #[tokio::test]
    async fn test_health_check_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "yellow"})))
            .mount(&server)
            .await;

        assert!(client_for(&server).health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_red_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "red"})))
            .mount(&server)
            .await;

        assert!(!client_for(&server).health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_setup_existing_index_without_recreate_is_noop() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gmail-threads"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let setup = client_for(&server).setup_index(false).await.unwrap();
        assert_eq!(setup, IndexSetup::AlreadyExists);
    }

    #[tokio::test]
    async fn test_setup_recreate_deletes_then_creates() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gmail-threads"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/gmail-threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/gmail-threads"))
            .and(body_string_contains("knn_vector"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        let setup = client_for(&server).setup_index(true).await.unwrap();
        assert_eq!(setup, IndexSetup::Recreated);
    }

    #[tokio::test]
    async fn test_setup_creates_missing_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/gmail-threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"acknowledged": true})))
            .expect(1)
            .mount(&server)
            .await;

        let setup = client_for(&server).setup_index(false).await.unwrap();
        assert_eq!(setup, IndexSetup::Created);
    }

    #[tokio::test]
    async fn test_create_race_reports_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"type": "resource_already_exists_exception"},
                "status": 400
            })))
            .mount(&server)
            .await;

        let setup = client_for(&server).setup_index(false).await.unwrap();
        assert_eq!(setup, IndexSetup::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(400).set_body_string("mapper_parsing_exception"))
            .mount(&server)
            .await;

        let err = client_for(&server).setup_index(false).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }

    #[tokio::test]
    async fn test_bulk_counts_item_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .and(body_string_contains("\"_id\":\"m1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 3,
                "errors": true,
                "items": [
                    {"index": {"_id": "m1", "status": 201}},
                    {"index": {"_id": "m2", "status": 400,
                               "error": {"type": "mapper_parsing_exception"}}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(body_string_contains("\"_id\":\"m3\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [{"index": {"_id": "m3", "status": 200}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .bulk_index(vec![doc("m1"), doc("m2"), doc("m3")])
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("m2: status 400"));
    }

    #[tokio::test]
    async fn test_bulk_rejected_batch_counts_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .bulk_index(vec![doc("m1"), doc("m2"), doc("m3")])
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_unreadable_response_keeps_earlier_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(body_string_contains("\"_id\":\"m1\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [
                    {"index": {"_id": "m1", "status": 201}},
                    {"index": {"_id": "m2", "status": 201}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(body_string_contains("\"_id\":\"m3\""))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .bulk_index(vec![doc("m1"), doc("m2"), doc("m3")])
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("unreadable bulk response"));
    }

    #[tokio::test]
    async fn test_bulk_empty_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client_for(&server).bulk_index(vec![]).await.unwrap();
        assert_eq!(outcome, BulkOutcome::default());
    }

    #[tokio::test]
    async fn test_search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail-threads/_search"))
            .and(body_string_contains("multi_match"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 4,
                "hits": {
                    "total": {"value": 12, "relation": "eq"},
                    "max_score": null,
                    "hits": [{
                        "_id": "m1",
                        "_score": null,
                        "_source": {"id": "m1", "thread_id": "t1", "subject": "Budget",
                                    "date": "2024-01-01T10:00:00+00:00"},
                        "highlight": {"subject": ["<em>Budget</em>"]}
                    }]
                }
            })))
            .mount(&server)
            .await;

        let query = crate::search::query::lexical_query("budget", 10).unwrap();
        let response = client_for(&server).search(&query).await.unwrap();

        assert_eq!(response.total(), 12);
        let hit = &response.hits.hits[0];
        assert_eq!(hit.id, "m1");
        assert_eq!(hit.source.subject, "Budget");
        assert_eq!(hit.source.date.as_deref(), Some("2024-01-01T10:00:00+00:00"));
        assert_eq!(hit.fragment("subject"), Some("<em>Budget</em>"));
        assert_eq!(hit.fragment("body_text"), None);
    }

    #[tokio::test]
    async fn test_search_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("parsing_exception"))
            .mount(&server)
            .await;

        let err = client_for(&server).search(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("Search failed"));
    }

    #[tokio::test]
    async fn test_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail-threads/_count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 42})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gmail-threads/_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "indices": {"gmail-threads": {"primaries": {"store": {"size_in_bytes": 2048}}}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/gmail-threads/_search"))
            .and(body_string_contains("cardinality"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 1,
                "hits": {"total": {"value": 42, "relation": "eq"}, "hits": []},
                "aggregations": {"unique_threads": {"value": 7}}
            })))
            .mount(&server)
            .await;

        let stats = client_for(&server).stats().await.unwrap();
        assert_eq!(
            stats,
            IndexStats {
                index_name: "gmail-threads".to_string(),
                total_messages: 42,
                unique_threads: 7,
                index_size_bytes: 2048,
            }
        );
    }
}
