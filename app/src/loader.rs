// ==============================================================================
// loader.rs - Batched Bulk Loader
// ==============================================================================
// Description: Buffers records and writes them to the backend in chunks
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Flushing:
//   - a buffer is written as soon as it holds `chunk_size` records
//   - `finish()` always performs one more write per index, even when empty
// Failures:
//   - whole-request transport/5xx/429 errors and per-item 429s are retried
//     with exponential backoff and jitter
//   - other per-item rejections are counted and dropped
//   - a batch that exhausts its retries is recorded as lost; the run goes on
// ==============================================================================

use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::backend::SearchBackend;
use crate::config::LoaderSettings;
use crate::models::{IndexName, Record};
use crate::parsers::TopHitSet;

/// Item failure reasons logged per batch before summarising
const MAX_LOGGED_REJECTIONS: usize = 5;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub chunk_size: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&LoaderSettings> for LoadOptions {
    fn from(settings: &LoaderSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            timeout: settings.timeout,
            max_retries: settings.max_retries,
            retry_backoff: settings.retry_backoff,
        }
    }
}

/// A batch whose records did not all reach the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub batch: u64,
    pub records: usize,
    pub error: String,
}

/// Write accounting for one index
///
/// `submitted == acknowledged + rejected + lost` once loading has finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    pub index: String,
    pub submitted: u64,
    pub acknowledged: u64,
    pub rejected: u64,
    pub lost: u64,
    pub bulk_calls: u64,
    pub attempts: u64,
    pub failed_batches: Vec<BatchFailure>,
}

/// Buffer and stats for one target index
struct Channel {
    index: IndexName,
    buffer: Vec<Record>,
    stats: LoadStats,
}

impl Channel {
    fn new(index: IndexName, capacity: usize) -> Self {
        Self {
            stats: LoadStats {
                index: index.to_string(),
                ..LoadStats::default()
            },
            index,
            buffer: Vec::with_capacity(capacity),
        }
    }

    async fn push(&mut self, record: Record, backend: &dyn SearchBackend, options: &LoadOptions) {
        self.buffer.push(record);
        if self.buffer.len() >= options.chunk_size {
            self.flush(backend, options).await;
        }
    }

    async fn flush(&mut self, backend: &dyn SearchBackend, options: &LoadOptions) {
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(options.chunk_size));
        self.stats.bulk_calls += 1;
        self.stats.submitted += batch.len() as u64;
        let batch_number = self.stats.bulk_calls;

        debug!(index = %self.index, batch = batch_number, "Writing {} records", batch.len());

        let mut pending = batch;
        let mut attempt: u32 = 0;

        loop {
            self.stats.attempts += 1;

            match backend.bulk_write(&self.index, &pending, options.timeout).await {
                Ok(response) => {
                    self.stats.acknowledged += response.acknowledged as u64;

                    let (retryable, rejected): (Vec<_>, Vec<_>) =
                        response.failures.into_iter().partition(|f| f.is_retryable());

                    if !rejected.is_empty() {
                        self.stats.rejected += rejected.len() as u64;
                        for failure in rejected.iter().take(MAX_LOGGED_REJECTIONS) {
                            warn!(
                                index = %self.index,
                                batch = batch_number,
                                variant_id = pending.get(failure.position).map(|r| r.variant_id.as_str()).unwrap_or("?"),
                                status = failure.status,
                                "Record rejected: {}",
                                failure.reason
                            );
                        }
                        if rejected.len() > MAX_LOGGED_REJECTIONS {
                            warn!(
                                index = %self.index,
                                batch = batch_number,
                                "{} more records rejected",
                                rejected.len() - MAX_LOGGED_REJECTIONS
                            );
                        }
                    }

                    if retryable.is_empty() {
                        break;
                    }

                    let throttled: Vec<Record> = retryable
                        .iter()
                        .filter_map(|f| pending.get(f.position).cloned())
                        .collect();

                    if attempt >= options.max_retries {
                        self.record_lost(batch_number, throttled.len(), "throttled items exhausted retries");
                        break;
                    }

                    warn!(
                        index = %self.index,
                        batch = batch_number,
                        "{} records throttled (attempt {}/{})",
                        throttled.len(),
                        attempt + 1,
                        options.max_retries + 1
                    );
                    pending = throttled;
                }
                Err(e) if e.is_retryable() && attempt < options.max_retries => {
                    warn!(
                        index = %self.index,
                        batch = batch_number,
                        "Bulk write failed (attempt {}/{}): {}",
                        attempt + 1,
                        options.max_retries + 1,
                        e
                    );
                }
                Err(e) => {
                    self.record_lost(batch_number, pending.len(), &e.to_string());
                    break;
                }
            }

            let delay = backoff_delay(options.retry_backoff, attempt);
            debug!(index = %self.index, batch = batch_number, "Retrying in {:?}", delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn record_lost(&mut self, batch: u64, records: usize, reason: &str) {
        error!(
            index = %self.index,
            batch,
            "Batch write failed, {} records lost: {}",
            records,
            reason
        );
        self.stats.lost += records as u64;
        self.stats.failed_batches.push(BatchFailure {
            batch,
            records,
            error: reason.to_string(),
        });
    }
}

/// `base * 2^attempt` plus up to half of that again
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let delay = base.saturating_mul(2u32.saturating_pow(attempt));
    let ceiling = delay.as_millis() as u64 / 2;
    let jitter = if ceiling == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=ceiling)
    };
    delay + Duration::from_millis(jitter)
}

/// Final accounting for a load
#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub primary: LoadStats,
    pub top_hits: Option<LoadStats>,
}

/// Streams records into the primary index and mirrors top hits into a
/// secondary index
pub struct BatchLoader<'a> {
    backend: &'a dyn SearchBackend,
    options: LoadOptions,
    primary: Channel,
    top_hits: Option<(&'a TopHitSet, Channel)>,
}

impl<'a> BatchLoader<'a> {
    pub fn new(backend: &'a dyn SearchBackend, index: IndexName, options: LoadOptions) -> Self {
        let capacity = options.chunk_size;
        Self {
            backend,
            options,
            primary: Channel::new(index, capacity),
            top_hits: None,
        }
    }

    /// Also write records whose variant id is in `set` to `index`
    pub fn with_top_hits(mut self, set: &'a TopHitSet, index: IndexName) -> Self {
        let capacity = self.options.chunk_size;
        self.top_hits = Some((set, Channel::new(index, capacity)));
        self
    }

    pub async fn push(&mut self, record: Record) {
        if let Some((set, channel)) = self.top_hits.as_mut() {
            if set.contains(&record.variant_id) {
                channel.push(record.clone(), self.backend, &self.options).await;
            }
        }
        self.primary.push(record, self.backend, &self.options).await;
    }

    /// Final flush of every buffer, performed even when a buffer is empty
    pub async fn finish(mut self) -> LoadOutcome {
        self.primary.flush(self.backend, &self.options).await;
        log_summary(&self.primary.stats);

        let top_hits = match self.top_hits {
            Some((_, mut channel)) => {
                channel.flush(self.backend, &self.options).await;
                log_summary(&channel.stats);
                Some(channel.stats)
            }
            None => None,
        };

        LoadOutcome {
            primary: self.primary.stats,
            top_hits,
        }
    }
}

fn log_summary(stats: &LoadStats) {
    info!(
        index = %stats.index,
        "Loaded {} of {} records in {} bulk calls ({} rejected, {} lost)",
        stats.acknowledged,
        stats.submitted,
        stats.bulk_calls,
        stats.rejected,
        stats.lost
    );
}
