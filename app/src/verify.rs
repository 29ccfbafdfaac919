// ==============================================================================
// verify.rs - Post-Load Verification and Ingestion Report
// ==============================================================================
// Description: Compares indexed counts with parsed counts and builds the report
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::SearchBackend;
use crate::error::IngestError;
use crate::loader::LoadStats;
use crate::models::{IndexName, SourceFormat, StudyId};
use crate::parsers::ParseStats;

/// Indexed count for one (index, study) pair against what was expected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub index: String,
    pub expected: u64,
    pub indexed: u64,
}

impl Verification {
    /// Documents missing from the index; negative when the index holds more
    pub fn discrepancy(&self) -> i64 {
        self.expected as i64 - self.indexed as i64
    }

    pub fn is_consistent(&self) -> bool {
        self.expected == self.indexed
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: read {} / indexed {} / discrepancy {}",
            self.index,
            self.expected,
            self.indexed,
            self.discrepancy()
        )
    }
}

pub struct VerificationReporter<'a> {
    backend: &'a dyn SearchBackend,
}

impl<'a> VerificationReporter<'a> {
    pub fn new(backend: &'a dyn SearchBackend) -> Self {
        Self { backend }
    }

    /// Count the study's documents in `index` and compare with `expected`
    ///
    /// A shortfall is logged, never retried. A failed count query is fatal.
    pub async fn verify(
        &self,
        index: &IndexName,
        study: &StudyId,
        expected: u64,
    ) -> Result<Verification, IngestError> {
        let indexed = self
            .backend
            .count_by_study(index, study.normalized())
            .await
            .map_err(|e| IngestError::backend("verification count", e))?;

        let verification = Verification {
            index: index.to_string(),
            expected,
            indexed,
        };

        if verification.is_consistent() {
            info!(study = %study, index = %index, "Verified {} documents", indexed);
        } else {
            warn!(
                study = %study,
                index = %index,
                "Integrity shortfall: read {} but indexed {} (discrepancy {})",
                expected,
                indexed,
                verification.discrepancy()
            );
        }

        Ok(verification)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Verified,
    Shortfall,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub run_id: Uuid,
    pub study: StudyId,
    pub source: PathBuf,
    pub format: SourceFormat,
    pub sha256: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub parse: ParseStats,
    pub primary_load: LoadStats,
    pub top_hits_load: Option<LoadStats>,
    pub primary: Verification,
    pub top_hits: Option<Verification>,
}

impl IngestionReport {
    pub fn records_read(&self) -> u64 {
        self.parse.records_read
    }

    pub fn verdict(&self) -> Verdict {
        let top_hits_ok = self.top_hits.as_ref().map(Verification::is_consistent).unwrap_or(true);
        if self.primary.is_consistent() && top_hits_ok {
            Verdict::Verified
        } else {
            Verdict::Shortfall
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Study {} ({})", self.study, self.source.display())?;
        writeln!(
            f,
            "  records read: {}  malformed lines: {}  written: {}",
            self.parse.records_read, self.parse.malformed, self.primary_load.acknowledged
        )?;
        for (field, counts) in &self.parse.fields {
            if counts.failed > 0 || counts.missing > 0 {
                writeln!(f, "  {}: {} missing, {} parse failures", field, counts.missing, counts.failed)?;
            }
        }
        writeln!(f, "  {}", self.primary)?;
        if let Some(top_hits) = &self.top_hits {
            writeln!(f, "  {}", top_hits)?;
        }
        write!(
            f,
            "  result: {}",
            match self.verdict() {
                Verdict::Verified => "verified",
                Verdict::Shortfall => "INTEGRITY SHORTFALL",
            }
        )
    }
}
