// ==============================================================================
// models.rs - Summary Statistics Data Models
// ==============================================================================
// Description: Data structures for GWAS summary-statistics ingestion
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IngestError;

/// Token used by the flat-text format for a value that was not measured
pub const MISSING_VALUE: &str = ".";

/// Source format, decided from the file's suffix chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Compressed, whitespace-separated summary statistics
    FlatText,
    /// Compressed variant-call container (needs external extraction)
    VariantCall,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::FlatText => "flat-text",
            SourceFormat::VariantCall => "variant-call",
        }
    }
}

/// Study identifier as supplied and in its normalized (partition key) form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyId {
    raw: String,
    normalized: String,
}

impl StudyId {
    /// Separator between the batch prefix and the study number (e.g. "ieu-a:2")
    pub const DELIMITER: char = ':';

    /// Normalize a raw study id by keeping the last segment after `:`
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let raw = raw.trim();
        let normalized = raw.rsplit(Self::DELIMITER).next().unwrap_or_default().trim();

        if normalized.is_empty() {
            return Err(IngestError::InvalidStudyId(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            normalized: normalized.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

const INVALID_INDEX_CHARS: [char; 11] = ['/', '\\', ' ', ',', '*', '?', '"', '<', '>', '|', '#'];

/// Backend index name, always lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexName(String);

impl IndexName {
    pub fn new(name: &str) -> Result<Self, IngestError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() || name.chars().any(|c| INVALID_INDEX_CHARS.contains(&c)) {
            return Err(IngestError::InvalidIndexName(name));
        }
        Ok(Self(name))
    }

    /// Secondary index holding the study's top hits
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, IngestError> {
        Self::new(&format!("{}{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-study sample size substituted when the variant-call source has no
/// per-record `SS` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleSize {
    Total(u64),
    #[default]
    Missing,
}

impl SampleSize {
    /// Cases plus controls, or controls alone for continuous traits
    pub fn from_counts(ncase: Option<u64>, ncontrol: Option<u64>) -> Result<Self, IngestError> {
        match (ncase, ncontrol) {
            (Some(cases), Some(controls)) => cases.checked_add(controls).map(SampleSize::Total).ok_or_else(|| {
                IngestError::InvalidSampleSize(format!("{} cases plus {} controls overflows", cases, controls))
            }),
            (None, Some(controls)) => Ok(SampleSize::Total(controls)),
            _ => Ok(SampleSize::Missing),
        }
    }

    /// Column token written into the flat-text stream
    pub fn token(&self) -> String {
        match self {
            SampleSize::Total(n) => n.to_string(),
            SampleSize::Missing => MISSING_VALUE.to_string(),
        }
    }
}

/// One association result, serialized as the backend document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "gwas_id")]
    pub study_id: String,

    #[serde(rename = "snp_id")]
    pub variant_id: String,

    #[serde(rename = "chr")]
    pub chromosome: String,

    pub position: u64,

    pub effect_allele: String,

    pub other_allele: String,

    pub effect_allele_freq: Option<f64>,

    pub beta: Option<f64>,

    pub se: Option<f64>,

    pub p: Option<f64>,

    pub n: Option<u64>,
}

impl Record {
    /// Record with key fields set and every statistic missing
    pub fn new(
        study_id: &str,
        chromosome: &str,
        variant_id: &str,
        effect_allele: &str,
        other_allele: &str,
    ) -> Self {
        Self {
            study_id: study_id.to_string(),
            variant_id: variant_id.to_string(),
            chromosome: chromosome.to_string(),
            position: 0,
            effect_allele: effect_allele.to_string(),
            other_allele: other_allele.to_string(),
            effect_allele_freq: None,
            beta: None,
            se: None,
            p: None,
            n: None,
        }
    }
}
