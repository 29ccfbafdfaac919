// ==============================================================================
// guard.rs - Duplicate Study Guard
// ==============================================================================
// Description: Refuses to ingest a study already present in the target index
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// The check is a refresh plus a count query, not a lock: two concurrent runs
// for the same study can both pass it. The pipeline guards the top-hits index
// as well when a top-hits file is given, so leftovers in either index block
// the run.
// ==============================================================================

use tracing::{info, warn};

use crate::audit::{log_event, AuditEventType};
use crate::backend::SearchBackend;
use crate::error::IngestError;
use crate::models::{IndexName, StudyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardOutcome {
    /// Whether the target index was already present
    pub index_exists: bool,
}

pub struct DuplicateGuard<'a> {
    backend: &'a dyn SearchBackend,
}

impl<'a> DuplicateGuard<'a> {
    pub fn new(backend: &'a dyn SearchBackend) -> Self {
        Self { backend }
    }

    /// Fail with `DuplicateStudy` if any document for the study is indexed
    ///
    /// Indices are created with automatic refresh disabled, so an existing
    /// index is refreshed first. Documents bulk-written by a run that died
    /// before its own refresh are then visible to the count.
    pub async fn check(&self, index: &IndexName, study: &StudyId) -> Result<GuardOutcome, IngestError> {
        let index_exists = self
            .backend
            .index_exists(index)
            .await
            .map_err(|e| IngestError::backend("duplicate check", e))?;

        if !index_exists {
            info!(study = %study, index = %index, "Index does not exist yet, no duplicate possible");
            return Ok(GuardOutcome { index_exists });
        }

        self.backend
            .refresh_index(index)
            .await
            .map_err(|e| IngestError::backend("duplicate check", e))?;

        let existing = self
            .backend
            .count_by_study(index, study.normalized())
            .await
            .map_err(|e| IngestError::backend("duplicate check", e))?;

        if existing > 0 {
            warn!(study = %study, index = %index, "{} documents already indexed, refusing run", existing);
            log_event(
                AuditEventType::DuplicateRejected,
                study.normalized(),
                Some(index.to_string()),
                serde_json::json!({ "existing": existing }),
            );
            return Err(IngestError::DuplicateStudy {
                study: study.normalized().to_string(),
                index: index.to_string(),
                existing,
            });
        }

        info!(study = %study, index = %index, "No existing documents for study");
        Ok(GuardOutcome { index_exists })
    }
}
