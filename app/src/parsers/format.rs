// ==============================================================================
// parsers/format.rs - Source Format Detection
// ==============================================================================
// Description: Classifies an input path by its suffix chain
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Recognised chains (case-insensitive):
//   *.bcf, *.vcf.gz, *.vcf.bgz    -> variant-call
//   *.txt.gz, *.tsv.gz, *.gz, ... -> flat-text
// ==============================================================================

use std::path::Path;

use crate::error::IngestError;
use crate::models::SourceFormat;

const COMPRESSION_SUFFIXES: [&str; 2] = ["gz", "bgz"];

/// Lowercased suffixes after the first '.' of the file name, in order
fn suffix_chain(path: &Path) -> Vec<String> {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .split('.')
                .skip(1)
                .map(|s| s.to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

/// Detect the source format without touching the file
pub fn detect_format(path: &Path) -> Result<SourceFormat, IngestError> {
    let suffixes = suffix_chain(path);

    let Some(last) = suffixes.last() else {
        return Err(IngestError::UnsupportedFormat(path.to_path_buf()));
    };

    if last == "bcf" {
        return Ok(SourceFormat::VariantCall);
    }

    if COMPRESSION_SUFFIXES.contains(&last.as_str()) {
        let inner = suffixes.iter().rev().nth(1).map(String::as_str);
        return Ok(match inner {
            Some("vcf") | Some("bcf") => SourceFormat::VariantCall,
            _ => SourceFormat::FlatText,
        });
    }

    Err(IngestError::UnsupportedFormat(path.to_path_buf()))
}
