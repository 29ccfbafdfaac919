// ==============================================================================
// audit.rs - Audit Trail for Ingestion Runs
// ==============================================================================
// Description: Structured lifecycle events for every index mutation
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Events are emitted on the `audit` tracing target as one JSON object each,
// so they can be routed to their own sink with `RUST_LOG=audit=info`.
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Run lifecycle
    RunStarted,
    RunCompleted,
    RunShortfall,
    RunFailed,

    // Validation
    SourceValidated,
    DuplicateRejected,

    // Index administration
    IndexCreated,
    IndexDeleted,

    // Temporary files
    TempFileDeleted,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub study: Option<String>,
    pub resource: Option<String>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        study: Option<String>,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            AuditEventType::DuplicateRejected | AuditEventType::RunShortfall => LogSeverity::Warning,
            AuditEventType::RunFailed => LogSeverity::Error,
            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            study,
            resource,
            details,
            severity,
        }
    }

    pub fn emit(&self) {
        let payload = match serde_json::to_string(self) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialise audit event {}: {}", self.id, e);
                return;
            }
        };

        match self.severity {
            LogSeverity::Info => info!(target: "audit", "{}", payload),
            LogSeverity::Warning => warn!(target: "audit", "{}", payload),
            LogSeverity::Error => error!(target: "audit", "{}", payload),
        }
    }
}

/// Convenience function to emit an audit event
pub fn log_event(
    event_type: AuditEventType,
    study: &str,
    resource: Option<String>,
    details: serde_json::Value,
) {
    AuditEvent::new(event_type, Some(study.to_string()), resource, details).emit();
}
