// ==============================================================================
// pipeline.rs - GWAS Ingestion Pipeline
// ==============================================================================
// Description: Runs one study from source file to verified index documents
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// States:
//   Validating -> Extracting (variant-call only) -> Streaming -> FinalFlush
//   -> Refreshing -> Verifying -> Done | Failed
// Nothing is written to the backend before validation and the duplicate
// check have passed.
// ==============================================================================

use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{log_event, AuditEvent, AuditEventType};
use crate::backend::{BackendError, SearchBackend};
use crate::cleanup::{self, TempArtifact};
use crate::config::LoaderSettings;
use crate::error::IngestError;
use crate::extractor::Extractor;
use crate::guard::DuplicateGuard;
use crate::loader::{BatchLoader, LoadOptions, LoadOutcome};
use crate::models::{IndexName, SampleSize, SourceFormat, StudyId};
use crate::parsers::{detect_format, ParseStats, SummaryStatsParser, TopHitSet};
use crate::validator::SourceValidator;
use crate::verify::{IngestionReport, Verdict, VerificationReporter};

/// One ingestion run's inputs
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub study: StudyId,
    pub index: IndexName,
    pub source: PathBuf,
    pub top_hits: Option<PathBuf>,
    /// Used only when a variant-call source has no per-record sample size
    pub sample_size: SampleSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Validating,
    Extracting,
    Streaming,
    FinalFlush,
    Refreshing,
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Validating => "validating",
            RunState::Extracting => "extracting",
            RunState::Streaming => "streaming",
            RunState::FinalFlush => "final flush",
            RunState::Refreshing => "refreshing",
            RunState::Verifying => "verifying",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub struct IngestionPipeline<'a> {
    run_id: Uuid,
    backend: &'a dyn SearchBackend,
    extractor: &'a dyn Extractor,
    settings: LoaderSettings,
    state: RunState,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(backend: &'a dyn SearchBackend, extractor: &'a dyn Extractor, settings: LoaderSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            backend,
            extractor,
            settings,
            state: RunState::Validating,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(run = %self.run_id, "{} -> {}", self.state, next);
        self.state = next;
    }

    /// Main ingestion pipeline
    pub async fn run(&mut self, request: &IngestRequest) -> Result<IngestionReport, IngestError> {
        info!(
            run = %self.run_id,
            study = %request.study,
            index = %request.index,
            "Starting ingestion of {} via {}",
            request.source.display(),
            self.backend.name()
        );
        log_event(
            AuditEventType::RunStarted,
            request.study.normalized(),
            Some(request.index.to_string()),
            serde_json::json!({
                "run_id": self.run_id,
                "raw_study_id": request.study.raw(),
                "source": request.source.display().to_string(),
            }),
        );

        let result = self.execute(request).await;

        match &result {
            Ok(report) => {
                self.transition(RunState::Done);
                let event = match report.verdict() {
                    Verdict::Verified => AuditEventType::RunCompleted,
                    Verdict::Shortfall => AuditEventType::RunShortfall,
                };
                log_event(
                    event,
                    request.study.normalized(),
                    Some(request.index.to_string()),
                    serde_json::json!({
                        "run_id": self.run_id,
                        "records_read": report.records_read(),
                        "indexed": report.primary.indexed,
                    }),
                );
            }
            Err(e) => {
                self.transition(RunState::Failed);
                log_event(
                    AuditEventType::RunFailed,
                    request.study.normalized(),
                    Some(request.index.to_string()),
                    serde_json::json!({
                        "run_id": self.run_id,
                        "error": e.to_string(),
                    }),
                );
            }
        }

        result
    }

    async fn execute(&mut self, request: &IngestRequest) -> Result<IngestionReport, IngestError> {
        let started_at = Utc::now();
        let study = &request.study;
        let index = &request.index;

        // 1. Validate source, top hits and duplicate state
        self.transition(RunState::Validating);
        let format = detect_format(&request.source)?;
        let validated = SourceValidator::validate(&request.source, format)?;
        log_event(
            AuditEventType::SourceValidated,
            study.normalized(),
            Some(validated.path.display().to_string()),
            serde_json::json!({
                "format": format.as_str(),
                "size": validated.size,
                "sha256": validated.sha256,
            }),
        );

        let top_hits = request.top_hits.as_deref().map(TopHitSet::load).transpose()?;
        let top_hits_index = match &top_hits {
            Some(_) => Some(index.with_suffix(&self.settings.tophits_suffix)?),
            None => None,
        };

        let duplicates = DuplicateGuard::new(self.backend);
        let guard = duplicates.check(index, study).await?;
        if let Some(top_index) = &top_hits_index {
            duplicates.check(top_index, study).await?;
        }

        // 2. Extract variant-call input into a temporary flat-text file
        let artifact = match format {
            SourceFormat::VariantCall => {
                self.transition(RunState::Extracting);
                Some(self.extractor.extract(&request.source, study, request.sample_size).await?)
            }
            SourceFormat::FlatText => None,
        };

        // 3. Prepare indices, stream and flush
        let loaded = self
            .load(
                request,
                artifact.as_ref(),
                guard.index_exists,
                top_hits.as_ref().zip(top_hits_index.as_ref()),
            )
            .await;

        // 4. Temporary file is done with whether or not loading succeeded
        cleanup::release(artifact, study.normalized()).await;
        let (parse, load) = loaded?;

        // 5. Refresh so counts see the new documents
        self.transition(RunState::Refreshing);
        self.refresh(index).await?;
        if let Some(top_index) = &top_hits_index {
            self.refresh(top_index).await?;
        }

        // 6. Verify indexed counts
        self.transition(RunState::Verifying);
        let reporter = VerificationReporter::new(self.backend);
        let primary = reporter.verify(index, study, parse.records_read).await?;
        let top_hits_verification = match (&top_hits_index, &load.top_hits) {
            (Some(top_index), Some(stats)) => Some(reporter.verify(top_index, study, stats.submitted).await?),
            _ => None,
        };

        let report = IngestionReport {
            run_id: self.run_id,
            study: study.clone(),
            source: request.source.clone(),
            format,
            sha256: validated.sha256,
            started_at,
            finished_at: Utc::now(),
            parse,
            primary_load: load.primary,
            top_hits_load: load.top_hits,
            primary,
            top_hits: top_hits_verification,
        };

        info!(run = %self.run_id, "Ingestion finished\n{}", report);
        Ok(report)
    }

    async fn load(
        &mut self,
        request: &IngestRequest,
        artifact: Option<&TempArtifact>,
        index_exists: bool,
        top_hits: Option<(&TopHitSet, &IndexName)>,
    ) -> Result<(ParseStats, LoadOutcome), IngestError> {
        self.prepare_index(&request.index, Some(index_exists)).await?;
        if let Some((_, top_index)) = top_hits {
            self.prepare_index(top_index, None).await?;
        }

        self.transition(RunState::Streaming);
        let stream_path: &Path = artifact.map(TempArtifact::path).unwrap_or(request.source.as_path());
        let mut parser = SummaryStatsParser::open(stream_path, request.study.normalized())?;

        let mut loader = BatchLoader::new(self.backend, request.index.clone(), LoadOptions::from(&self.settings));
        if let Some((set, top_index)) = top_hits {
            loader = loader.with_top_hits(set, top_index.clone());
        }

        for record in parser.by_ref() {
            loader.push(record?).await;
        }

        self.transition(RunState::FinalFlush);
        let outcome = loader.finish().await;

        Ok((parser.into_stats(), outcome))
    }

    /// Create the index when absent, then lift write blocks
    async fn prepare_index(&self, index: &IndexName, known_exists: Option<bool>) -> Result<(), IngestError> {
        let exists = match known_exists {
            Some(exists) => exists,
            None => self
                .backend
                .index_exists(index)
                .await
                .map_err(|e| IngestError::backend("index preparation", e))?,
        };

        if exists {
            info!(index = %index, "Index already exists, adding to it");
        } else {
            create_index(self.backend, index, &self.settings).await?;
        }

        self.backend
            .set_index_read_write(index)
            .await
            .map_err(|e| IngestError::backend("index preparation", e))
    }

    async fn refresh(&self, index: &IndexName) -> Result<(), IngestError> {
        info!(index = %index, "Refreshing index");
        self.backend
            .refresh_index(index)
            .await
            .map_err(|e| IngestError::backend("refresh", e))
    }
}

/// Create an index with the configured schema; an existing index is left alone
///
/// Returns whether the index was created by this call.
pub async fn create_index(
    backend: &dyn SearchBackend,
    index: &IndexName,
    settings: &LoaderSettings,
) -> Result<bool, IngestError> {
    match backend.create_index(index, &settings.index).await {
        Ok(()) => {
            info!(
                index = %index,
                "Created index ({} shards, {} replicas)",
                settings.index.shards,
                settings.index.replicas
            );
            AuditEvent::new(
                AuditEventType::IndexCreated,
                None,
                Some(index.to_string()),
                serde_json::json!({
                    "shards": settings.index.shards,
                    "replicas": settings.index.replicas,
                }),
            )
            .emit();
            Ok(true)
        }
        Err(BackendError::AlreadyExists(_)) => {
            info!(index = %index, "Index already exists");
            Ok(false)
        }
        Err(e) => Err(IngestError::backend("index creation", e)),
    }
}

pub async fn delete_index(backend: &dyn SearchBackend, index: &IndexName) -> Result<(), IngestError> {
    backend
        .delete_index(index)
        .await
        .map_err(|e| IngestError::backend("index deletion", e))?;

    info!(index = %index, "Deleted index");
    AuditEvent::new(AuditEventType::IndexDeleted, None, Some(index.to_string()), serde_json::json!({})).emit();
    Ok(())
}
