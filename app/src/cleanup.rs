// ==============================================================================
// cleanup.rs - Temporary Artifact Removal
// ==============================================================================
// Description: Owns intermediate files produced during a run and removes them
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Guarantee: an artifact is deleted on every exit path. Explicit removal
// logs and audits it; dropping the handle (early return, panic unwind) still
// unlinks the file.
// ==============================================================================

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditEventType};

/// An intermediate file scoped to one ingestion run
#[derive(Debug)]
pub struct TempArtifact {
    path: TempPath,
}

impl TempArtifact {
    pub fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now and record it in the audit trail
    pub async fn remove(self, study: &str) -> Result<()> {
        let location: PathBuf = self.path.to_path_buf();
        info!("Removing temporary file: {:?}", location);

        let size = std::fs::metadata(&location).map(|m| m.len()).unwrap_or(0);
        debug!("Temporary file size: {} bytes", size);

        self.path
            .close()
            .with_context(|| format!("Failed to remove temporary file {}", location.display()))?;

        AuditEvent::new(
            AuditEventType::TempFileDeleted,
            Some(study.to_string()),
            Some(location.display().to_string()),
            serde_json::json!({ "size": size }),
        )
        .emit();

        info!("Temporary file removed: {:?}", location);
        Ok(())
    }
}

/// Remove an optional artifact, logging rather than failing the run
pub async fn release(artifact: Option<TempArtifact>, study: &str) {
    if let Some(artifact) = artifact {
        if let Err(e) = artifact.remove(study).await {
            warn!("{:#}", e);
        }
    }
}
