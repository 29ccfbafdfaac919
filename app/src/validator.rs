// ==============================================================================
// validator.rs - Source File Validation
// ==============================================================================
// Description: Validates a GWAS source file before anything touches the backend
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// Security: Magic number verification, SHA-256 fingerprint
// ==============================================================================

use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::IngestError;
use crate::models::SourceFormat;

/// gzip and BGZF both start with this
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedSource {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub size: u64,
    pub sha256: String,
    pub validated_at: DateTime<Utc>,
}

pub struct SourceValidator;

impl SourceValidator {
    pub fn validate(path: &Path, format: SourceFormat) -> Result<ValidatedSource, IngestError> {
        info!("Validating source file: {}", path.display());

        // 1. Existence
        if !path.exists() {
            return Err(IngestError::MissingSource(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(invalid(path, "not a regular file"));
        }
        if metadata.len() == 0 {
            return Err(invalid(path, "file is empty"));
        }
        debug!("Size check passed: {} bytes", metadata.len());

        // 2. Magic number verification
        let magic = read_magic_number(path)?;
        if magic != GZIP_MAGIC {
            return Err(invalid(path, "not gzip/BGZF compressed"));
        }
        debug!("Magic number check passed");

        // 3. Content validation (basic format check)
        validate_content(path, format)?;
        debug!("Content validation passed");

        // 4. Compute SHA-256 hash
        let sha256 = compute_sha256(path)?;
        debug!("SHA-256: {}", sha256);

        Ok(ValidatedSource {
            path: path.to_path_buf(),
            format,
            size: metadata.len(),
            sha256,
            validated_at: Utc::now(),
        })
    }
}

fn invalid(path: &Path, reason: &str) -> IngestError {
    IngestError::InvalidSource {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_magic_number(path: &Path) -> Result<[u8; 2], IngestError> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    file.read_exact(&mut buffer)
        .map_err(|_| invalid(path, "file too short"))?;
    Ok(buffer)
}

/// Decompress the first block and check it looks like the detected format
fn validate_content(path: &Path, format: SourceFormat) -> Result<(), IngestError> {
    let mut decoder = MultiGzDecoder::new(File::open(path)?);
    let mut head = Vec::with_capacity(64);
    decoder
        .by_ref()
        .take(64)
        .read_to_end(&mut head)
        .map_err(|e| invalid(path, &format!("corrupt compressed stream: {}", e)))?;

    match format {
        SourceFormat::FlatText => Ok(()),
        SourceFormat::VariantCall => {
            if head.starts_with(b"BCF") || head.starts_with(b"##fileformat=VCF") {
                Ok(())
            } else {
                Err(invalid(path, "missing BCF/VCF header"))
            }
        }
    }
}

fn compute_sha256(path: &Path) -> Result<String, IngestError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
