// ==============================================================================
// error.rs - Ingestion Error Taxonomy
// ==============================================================================
// Description: Run-level errors for the GWAS ingestion pipeline
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Data-level problems (bad fields, malformed lines, lost batches) never reach
// this type; they are recovered locally and counted in the IngestionReport.
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::BackendError;

/// Errors that abort an ingestion run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Can not access file {}", .0.display())]
    MissingSource(PathBuf),

    #[error("Invalid source file {}: {reason}", .path.display())]
    InvalidSource { path: PathBuf, reason: String },

    #[error("Invalid study id '{0}'")]
    InvalidStudyId(String),

    #[error("Invalid index name '{0}'")]
    InvalidIndexName(String),

    #[error("Invalid sample size: {0}")]
    InvalidSampleSize(String),

    #[error("Indexed records exist for {study} in {index} ({existing} documents)")]
    DuplicateStudy {
        study: String,
        index: String,
        existing: u64,
    },

    #[error("Unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Backend failure during {stage}: {source}")]
    BackendInfra {
        stage: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn backend(stage: &'static str, source: BackendError) -> Self {
        IngestError::BackendInfra { stage, source }
    }

    /// Failures raised while validating, before any backend write
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            IngestError::MissingSource(_)
                | IngestError::InvalidSource { .. }
                | IngestError::InvalidStudyId(_)
                | IngestError::InvalidIndexName(_)
                | IngestError::InvalidSampleSize(_)
                | IngestError::DuplicateStudy { .. }
                | IngestError::UnsupportedFormat(_)
        )
    }
}
