// ==============================================================================
// backend/memory.rs - In-Memory Backend (tests only)
// ==============================================================================
// Description: Fake SearchBackend that records calls and injects failures
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::{BackendError, BulkResponse, IndexSettings, ItemFailure, SearchBackend};
use crate::models::{IndexName, Record};

#[derive(Default)]
struct MemoryIndex {
    /// Visible to counts
    searchable: Vec<Record>,
    /// Written since the last refresh
    pending: Vec<Record>,
    settings: Option<IndexSettings>,
    read_write_calls: usize,
}

#[derive(Default)]
struct State {
    indices: HashMap<String, MemoryIndex>,
    bulk_calls: Vec<(String, usize)>,
    refreshes: Vec<String>,
    counts: usize,
    /// Next N bulk calls fail as a whole with a retryable error
    failing_bulk_calls: usize,
    /// Variant ids answered with a 429 the first time they are seen
    throttle_once: HashSet<String>,
    /// Variant ids always rejected with a 400
    reject: HashSet<String>,
    fail_refresh: bool,
    fail_count: bool,
    /// Documents silently dropped after acknowledgement
    drop_after_ack: usize,
}

/// In-process SearchBackend for pipeline tests
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index already holding searchable documents
    pub fn with_documents(index: &str, records: Vec<Record>) -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock().unwrap();
            let entry = state.indices.entry(index.to_string()).or_default();
            entry.searchable = records;
            entry.settings = Some(IndexSettings::default());
        }
        backend
    }

    pub fn with_empty_index(index: &str) -> Self {
        Self::with_documents(index, Vec::new())
    }

    pub fn fail_next_bulk_calls(&self, n: usize) {
        self.state.lock().unwrap().failing_bulk_calls = n;
    }

    pub fn throttle_once(&self, variant_id: &str) {
        self.state.lock().unwrap().throttle_once.insert(variant_id.to_string());
    }

    pub fn reject(&self, variant_id: &str) {
        self.state.lock().unwrap().reject.insert(variant_id.to_string());
    }

    pub fn fail_refresh(&self) {
        self.state.lock().unwrap().fail_refresh = true;
    }

    pub fn fail_count(&self) {
        self.state.lock().unwrap().fail_count = true;
    }

    pub fn drop_after_ack(&self, n: usize) {
        self.state.lock().unwrap().drop_after_ack = n;
    }

    /// (index, batch size) for every bulk call, in order
    pub fn bulk_calls(&self) -> Vec<(String, usize)> {
        self.state.lock().unwrap().bulk_calls.clone()
    }

    pub fn bulk_call_count(&self) -> usize {
        self.state.lock().unwrap().bulk_calls.len()
    }

    pub fn refreshes(&self) -> Vec<String> {
        self.state.lock().unwrap().refreshes.clone()
    }

    pub fn count_calls(&self) -> usize {
        self.state.lock().unwrap().counts
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.state.lock().unwrap().indices.contains_key(index)
    }

    pub fn index_settings(&self, index: &str) -> Option<IndexSettings> {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(index)
            .and_then(|i| i.settings.clone())
    }

    pub fn read_write_calls(&self, index: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .indices
            .get(index)
            .map(|i| i.read_write_calls)
            .unwrap_or(0)
    }

    /// Every document written to an index, refreshed or not
    pub fn documents(&self, index: &str) -> Vec<Record> {
        let state = self.state.lock().unwrap();
        state
            .indices
            .get(index)
            .map(|i| i.searchable.iter().chain(i.pending.iter()).cloned().collect())
            .unwrap_or_default()
    }
}

fn missing(index: &IndexName) -> BackendError {
    BackendError::Status {
        operation: "memory",
        status: 404,
        body: format!("no such index [{}]", index),
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn index_exists(&self, index: &IndexName) -> Result<bool, BackendError> {
        Ok(self.state.lock().unwrap().indices.contains_key(index.as_str()))
    }

    async fn create_index(&self, index: &IndexName, settings: &IndexSettings) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.indices.contains_key(index.as_str()) {
            return Err(BackendError::AlreadyExists(index.to_string()));
        }
        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                settings: Some(settings.clone()),
                ..MemoryIndex::default()
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &IndexName) -> Result<(), BackendError> {
        self.state.lock().unwrap().indices.remove(index.as_str());
        Ok(())
    }

    async fn set_index_read_write(&self, index: &IndexName) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        let entry = state.indices.get_mut(index.as_str()).ok_or_else(|| missing(index))?;
        entry.read_write_calls += 1;
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &IndexName,
        records: &[Record],
        _timeout: Duration,
    ) -> Result<BulkResponse, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.bulk_calls.push((index.to_string(), records.len()));

        if state.failing_bulk_calls > 0 {
            state.failing_bulk_calls -= 1;
            return Err(BackendError::Unavailable("injected bulk failure".to_string()));
        }

        let mut response = BulkResponse::default();
        let mut accepted = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if state.reject.contains(&record.variant_id) {
                response.failures.push(ItemFailure {
                    position,
                    status: 400,
                    reason: "mapper_parsing_exception: injected".to_string(),
                });
            } else if state.throttle_once.remove(&record.variant_id) {
                response.failures.push(ItemFailure {
                    position,
                    status: 429,
                    reason: "es_rejected_execution_exception: injected".to_string(),
                });
            } else {
                accepted.push(record.clone());
            }
        }
        response.acknowledged = accepted.len();

        let dropped = state.drop_after_ack.min(accepted.len());
        state.drop_after_ack -= dropped;
        accepted.truncate(accepted.len() - dropped);

        let entry = state.indices.entry(index.to_string()).or_default();
        entry.pending.extend(accepted);

        Ok(response)
    }

    async fn refresh_index(&self, index: &IndexName) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_refresh {
            return Err(BackendError::Unavailable("injected refresh failure".to_string()));
        }
        state.refreshes.push(index.to_string());
        let entry = state.indices.get_mut(index.as_str()).ok_or_else(|| missing(index))?;
        let pending = std::mem::take(&mut entry.pending);
        entry.searchable.extend(pending);
        Ok(())
    }

    async fn count_by_study(&self, index: &IndexName, study_id: &str) -> Result<u64, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.counts += 1;
        if state.fail_count {
            return Err(BackendError::Unavailable("injected count failure".to_string()));
        }
        let entry = state.indices.get(index.as_str()).ok_or_else(|| missing(index))?;
        Ok(entry.searchable.iter().filter(|r| r.study_id == study_id).count() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
