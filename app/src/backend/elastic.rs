// ==============================================================================
// backend/elastic.rs - Elasticsearch REST Client
// ==============================================================================
// Description: SearchBackend implementation over the Elasticsearch HTTP API
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// References:
// - Bulk API: https://www.elastic.co/guide/en/elasticsearch/reference/7.17/docs-bulk.html
// - Count API: https://www.elastic.co/guide/en/elasticsearch/reference/7.17/search-count.html
// ==============================================================================

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{BackendError, BulkResponse, IndexSettings, ItemFailure, SearchBackend};
use crate::models::{IndexName, Record};

/// Elasticsearch client
pub struct ElasticBackend {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BulkBody {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CountBody {
    count: u64,
}

impl ElasticBackend {
    /// `request_timeout` bounds administrative calls; bulk writes carry their own
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, index: &IndexName, endpoint: Option<&str>) -> String {
        match endpoint {
            Some(endpoint) => format!("{}/{}/{}", self.base_url, index, endpoint),
            None => format!("{}/{}", self.base_url, index),
        }
    }

    /// Index body: settings plus the per-record document mapping
    pub fn index_definition(settings: &IndexSettings) -> serde_json::Value {
        json!({
            "settings": {
                "index": {
                    "number_of_shards": settings.shards,
                    "number_of_replicas": settings.replicas,
                    "codec": "best_compression",
                    "refresh_interval": "-1",
                    "max_result_window": settings.max_result_window
                }
            },
            "mappings": {
                "properties": {
                    "gwas_id": { "type": "keyword" },
                    "snp_id": { "type": "keyword" },
                    "chr": { "type": "keyword" },
                    "position": { "type": "integer" },
                    "effect_allele": { "type": "keyword", "index": false },
                    "other_allele": { "type": "keyword", "index": false },
                    "effect_allele_freq": { "type": "float", "index": false },
                    "p": { "type": "float" },
                    "n": { "type": "integer", "index": false },
                    "beta": { "type": "float", "index": false },
                    "se": { "type": "float", "index": false }
                }
            }
        })
    }

    /// NDJSON body with one `create` action per record
    fn bulk_body(records: &[Record]) -> Result<String, BackendError> {
        let mut body = String::with_capacity(records.len() * 192);
        for record in records {
            body.push_str("{\"create\":{}}\n");
            let doc = serde_json::to_string(record)
                .map_err(|e| BackendError::Decode(format!("Failed to encode document: {}", e)))?;
            body.push_str(&doc);
            body.push('\n');
        }
        Ok(body)
    }
}

async fn ensure_success(response: Response, operation: &'static str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        operation,
        status: status.as_u16(),
        body,
    })
}

fn describe_item_error(error: Option<&serde_json::Value>) -> String {
    match error {
        Some(error) => {
            let kind = error.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
            let reason = error.get("reason").and_then(|v| v.as_str()).unwrap_or("");
            format!("{}: {}", kind, reason)
        }
        None => "no error detail".to_string(),
    }
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn index_exists(&self, index: &IndexName) -> Result<bool, BackendError> {
        let response = self.client.head(self.url(index, None)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => ensure_success(response, "index exists").await.map(|_| true),
        }
    }

    async fn create_index(&self, index: &IndexName, settings: &IndexSettings) -> Result<(), BackendError> {
        let response = self
            .client
            .put(self.url(index, None))
            .json(&Self::index_definition(settings))
            .send()
            .await?;

        match ensure_success(response, "create index").await {
            Ok(_) => Ok(()),
            Err(BackendError::Status { status: 400, body, .. })
                if body.contains("resource_already_exists_exception") =>
            {
                Err(BackendError::AlreadyExists(index.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_index(&self, index: &IndexName) -> Result<(), BackendError> {
        let response = self.client.delete(self.url(index, None)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Index {} does not exist, nothing to delete", index);
            return Ok(());
        }

        ensure_success(response, "delete index").await?;
        Ok(())
    }

    async fn set_index_read_write(&self, index: &IndexName) -> Result<(), BackendError> {
        let body = json!({
            "index": {
                "blocks": {
                    "write": false,
                    "read_only_allow_delete": false
                }
            }
        });

        let response = self
            .client
            .put(self.url(index, Some("_settings")))
            .json(&body)
            .send()
            .await?;

        ensure_success(response, "set read-write").await?;
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &IndexName,
        records: &[Record],
        timeout: Duration,
    ) -> Result<BulkResponse, BackendError> {
        if records.is_empty() {
            return Ok(BulkResponse::default());
        }

        let response = self
            .client
            .post(self.url(index, Some("_bulk")))
            .header("Content-Type", "application/x-ndjson")
            .timeout(timeout)
            .body(Self::bulk_body(records)?)
            .send()
            .await?;

        let body: BulkBody = ensure_success(response, "bulk write")
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("Invalid bulk response: {}", e)))?;

        if body.items.len() != records.len() {
            return Err(BackendError::Decode(format!(
                "Bulk response has {} items for {} documents",
                body.items.len(),
                records.len()
            )));
        }

        let mut result = BulkResponse::default();
        for (position, item) in body.items.iter().enumerate() {
            let Some(outcome) = item.values().next() else {
                return Err(BackendError::Decode(format!("Empty bulk item at {}", position)));
            };

            if (200..300).contains(&outcome.status) {
                result.acknowledged += 1;
            } else {
                result.failures.push(ItemFailure {
                    position,
                    status: outcome.status,
                    reason: describe_item_error(outcome.error.as_ref()),
                });
            }
        }

        if body.errors && result.failures.is_empty() {
            debug!("Bulk response flagged errors but every item succeeded");
        }

        Ok(result)
    }

    async fn refresh_index(&self, index: &IndexName) -> Result<(), BackendError> {
        let response = self.client.post(self.url(index, Some("_refresh"))).send().await?;
        ensure_success(response, "refresh").await?;
        Ok(())
    }

    async fn count_by_study(&self, index: &IndexName, study_id: &str) -> Result<u64, BackendError> {
        let query = json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "gwas_id": study_id } }
                    ]
                }
            }
        });

        let response = self
            .client
            .post(self.url(index, Some("_count")))
            .json(&query)
            .send()
            .await?;

        let body: CountBody = ensure_success(response, "count")
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("Invalid count response: {}", e)))?;

        Ok(body.count)
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> ElasticBackend {
        ElasticBackend::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn index(name: &str) -> IndexName {
        IndexName::new(name).unwrap()
    }

    fn record(id: &str) -> Record {
        let mut record = Record::new("2", "1", id, "A", "G");
        record.position = 100;
        record
    }

    #[tokio::test]
    async fn test_index_exists() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gwas"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let es = backend(&server);
        assert!(es.index_exists(&index("gwas")).await.unwrap());
        assert!(!es.index_exists(&index("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_index_sends_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/gwas"))
            .and(body_partial_json(json!({
                "settings": { "index": { "number_of_shards": 5, "codec": "best_compression" } },
                "mappings": { "properties": { "gwas_id": { "type": "keyword" }, "p": { "type": "float" } } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(1)
            .mount(&server)
            .await;

        backend(&server)
            .create_index(&index("gwas"), &IndexSettings::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_existing_index_reports_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/gwas"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "type": "resource_already_exists_exception", "reason": "index [gwas] already exists" },
                "status": 400
            })))
            .mount(&server)
            .await;

        let result = backend(&server)
            .create_index(&index("gwas"), &IndexSettings::default())
            .await;

        assert!(matches!(result, Err(BackendError::AlreadyExists(name)) if name == "gwas"));
    }

    #[tokio::test]
    async fn test_bulk_write_reports_item_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gwas/_bulk"))
            .and(header("Content-Type", "application/x-ndjson"))
            .and(body_string_contains("\"snp_id\":\"rs2\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "took": 3,
                "errors": true,
                "items": [
                    { "create": { "status": 201, "result": "created" } },
                    { "create": { "status": 429, "error": { "type": "es_rejected_execution_exception", "reason": "queue full" } } },
                    { "create": { "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "bad position" } } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = vec![record("rs1"), record("rs2"), record("rs3")];
        let response = backend(&server)
            .bulk_write(&index("gwas"), &records, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.acknowledged, 1);
        assert_eq!(response.failures.len(), 2);
        assert_eq!(response.failures[0].position, 1);
        assert!(response.failures[0].is_retryable());
        assert_eq!(response.failures[1].position, 2);
        assert!(response.failures[1].reason.starts_with("mapper_parsing_exception"));
    }

    #[tokio::test]
    async fn test_empty_bulk_write_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let response = backend(&server)
            .bulk_write(&index("gwas"), &[], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response, BulkResponse::default());
    }

    #[tokio::test]
    async fn test_bulk_write_service_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gwas/_bulk"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .bulk_write(&index("gwas"), &[record("rs1")], Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_count_by_study_filters_on_gwas_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gwas/_count"))
            .and(body_partial_json(json!({
                "query": { "bool": { "filter": [ { "term": { "gwas_id": "2" } } ] } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 42 })))
            .mount(&server)
            .await;

        let count = backend(&server).count_by_study(&index("gwas"), "2").await.unwrap();
        assert_eq!(count, 42);
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gwas/_refresh"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = backend(&server).refresh_index(&index("gwas")).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, operation: "refresh", .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_index_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        backend(&server).delete_index(&index("gone")).await.unwrap();
    }
}
