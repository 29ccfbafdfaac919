// ==============================================================================
// backend/mod.rs - Search Backend Contract
// ==============================================================================
// Description: Operations the ingestion pipeline needs from the document store
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod elastic;
#[cfg(test)]
pub mod memory;

pub use elastic::ElasticBackend;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::{IndexName, Record};

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Index '{0}' already exists")]
    AlreadyExists(String),

    #[error("Unexpected backend response: {0}")]
    Decode(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            BackendError::Unavailable(_) => true,
            BackendError::AlreadyExists(_) | BackendError::Decode(_) => false,
        }
    }
}

/// Settings applied when an index is created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSettings {
    pub shards: u32,
    pub replicas: u32,
    pub max_result_window: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            shards: 5,
            replicas: 1,
            max_result_window: 100_000,
        }
    }
}

/// One document the backend refused within a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    /// Offset of the document within the submitted slice
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

impl ItemFailure {
    /// Rejections caused by back-pressure are worth resending
    pub fn is_retryable(&self) -> bool {
        self.status == 429
    }
}

/// Outcome of one bulk request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub acknowledged: usize,
    pub failures: Vec<ItemFailure>,
}

/// Document store used by the ingestion pipeline
///
/// Implementations:
/// - `ElasticBackend`: Elasticsearch REST API over HTTP
/// - `MemoryBackend`: in-process fake for tests
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn index_exists(&self, index: &IndexName) -> Result<bool, BackendError>;

    /// Fails with `BackendError::AlreadyExists` if the index is present
    async fn create_index(&self, index: &IndexName, settings: &IndexSettings) -> Result<(), BackendError>;

    async fn delete_index(&self, index: &IndexName) -> Result<(), BackendError>;

    /// Lift write blocks left on an index
    async fn set_index_read_write(&self, index: &IndexName) -> Result<(), BackendError>;

    /// Write one batch; an empty batch is acknowledged without a request
    async fn bulk_write(
        &self,
        index: &IndexName,
        records: &[Record],
        timeout: Duration,
    ) -> Result<BulkResponse, BackendError>;

    /// Make recent writes visible to counts
    async fn refresh_index(&self, index: &IndexName) -> Result<(), BackendError>;

    async fn count_by_study(&self, index: &IndexName, study_id: &str) -> Result<u64, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
