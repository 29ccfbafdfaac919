// ==============================================================================
// extractor.rs - Variant-Call Extraction
// ==============================================================================
// Description: Converts BCF/VCF input into the flat summary-statistics format
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Output columns (space separated, gzip'd):
//   chromosome position id alt ref AF ES SE p SS
// p is derived from the stored -log10 p (LP). SS is taken from the record
// when the header declares it, otherwise a single run-wide total is used.
// ==============================================================================

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::cleanup::TempArtifact;
use crate::error::IngestError;
use crate::models::{SampleSize, StudyId, MISSING_VALUE};

/// Header line declaring a per-record sample size
const SAMPLE_SIZE_HEADER: &str = "##FORMAT=<ID=SS";

/// Column holding -log10 p in query output
const LP_COLUMN: usize = 8;

/// Produces a temporary flat-text file from a variant-call source
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        source: &Path,
        study: &StudyId,
        sample_size: SampleSize,
    ) -> Result<TempArtifact, IngestError>;
}

/// Extraction through the `bcftools` binary
pub struct BcftoolsExtractor {
    program: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl BcftoolsExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            scratch_dir: None,
        }
    }

    /// Write temporary output here instead of the system temp directory
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    async fn declares_sample_size(&self, source: &Path) -> Result<bool, IngestError> {
        let output = Command::new(&self.program)
            .arg("view")
            .arg("-h")
            .arg(source)
            .output()
            .await
            .map_err(|e| spawn_error(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IngestError::Extraction(format!(
                "bcftools view -h exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let header = String::from_utf8_lossy(&output.stdout);
        Ok(header.lines().any(|line| line.starts_with(SAMPLE_SIZE_HEADER)))
    }

    fn create_output(&self) -> Result<tempfile::NamedTempFile, IngestError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gwas-extract-").suffix(".txt.gz");
        let file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }
}

#[async_trait]
impl Extractor for BcftoolsExtractor {
    async fn extract(
        &self,
        source: &Path,
        study: &StudyId,
        sample_size: SampleSize,
    ) -> Result<TempArtifact, IngestError> {
        info!(study = %study, "Extracting variant-call file: {}", source.display());

        let has_sample_size = self.declares_sample_size(source).await?;
        if !has_sample_size {
            info!(study = %study, "No per-record sample size, using {}", sample_size.token());
        }

        let (file, temp_path) = self.create_output()?.into_parts();
        debug!("Extraction output: {}", temp_path.display());

        let mut child = Command::new(&self.program)
            .arg("query")
            .arg("-f")
            .arg(query_format(has_sample_size))
            .arg(source)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IngestError::Extraction("bcftools stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| IngestError::Extraction("bcftools stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut lines = BufReader::new(stdout).lines();
        let mut converted: u64 = 0;

        while let Some(line) = lines.next_line().await? {
            let flat = convert_line(&line, has_sample_size, &sample_size);
            encoder.write_all(flat.as_bytes())?;
            encoder.write_all(b"\n")?;
            converted += 1;
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(IngestError::Extraction(format!(
                "bcftools query exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        encoder.finish()?.flush()?;

        info!(study = %study, "Extracted {} records", converted);
        Ok(TempArtifact::new(temp_path))
    }
}

fn spawn_error(program: &Path, e: std::io::Error) -> IngestError {
    IngestError::Extraction(format!("Failed to run {}: {}", program.display(), e))
}

/// `bcftools query` format string for the flat column order
pub fn query_format(has_sample_size: bool) -> String {
    let mut format = String::from("%CHROM %POS %ID %ALT %REF [%AF] [%ES] [%SE] [%LP]");
    if has_sample_size {
        format.push_str(" [%SS]");
    }
    format.push('\n');
    format
}

/// Rewrite one query line: LP becomes p, sample size appended when absent
///
/// Lines with an unexpected column count pass through unchanged so the
/// parser reports them as malformed with their line number.
pub fn convert_line(line: &str, has_sample_size: bool, sample_size: &SampleSize) -> String {
    let mut tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();

    let expected = if has_sample_size { LP_COLUMN + 2 } else { LP_COLUMN + 1 };
    if tokens.len() != expected {
        return line.to_string();
    }

    tokens[LP_COLUMN] = lp_to_p(&tokens[LP_COLUMN]);
    if !has_sample_size {
        tokens.push(sample_size.token());
    }

    tokens.join(" ")
}

fn lp_to_p(token: &str) -> String {
    match token.parse::<f64>() {
        Ok(lp) if lp.is_finite() => format!("{:e}", 10f64.powf(-lp)),
        _ => MISSING_VALUE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(line: &str, column: usize) -> String {
        line.split(' ').nth(column).unwrap().to_string()
    }

    #[test]
    fn test_query_format() {
        assert_eq!(
            query_format(false),
            "%CHROM %POS %ID %ALT %REF [%AF] [%ES] [%SE] [%LP]\n"
        );
        assert!(query_format(true).ends_with(" [%SS]\n"));
    }

    #[test]
    fn test_convert_line_substitutes_sample_size() {
        let line = "1 100 rs1 A G 0.5 0.1 0.05 3";
        let converted = convert_line(line, false, &SampleSize::Total(3000));

        assert_eq!(converted.split(' ').count(), 10);
        assert_eq!(token(&converted, 9), "3000");

        let p: f64 = token(&converted, 8).parse().unwrap();
        assert!((p - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_convert_line_keeps_record_sample_size() {
        let line = "1 100 rs1 A G 0.5 0.1 0.05 0 12000";
        let converted = convert_line(line, true, &SampleSize::Total(3000));

        assert_eq!(token(&converted, 9), "12000");
        let p: f64 = token(&converted, 8).parse().unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_missing_lp_and_sample_size() {
        let line = "1 100 rs1 A G . . . .";
        let converted = convert_line(line, false, &SampleSize::Missing);

        assert_eq!(converted, "1 100 rs1 A G . . . . .");
    }

    #[test]
    fn test_unexpected_columns_pass_through() {
        let line = "1 100 rs1";
        assert_eq!(convert_line(line, false, &SampleSize::Missing), line);
    }

    #[tokio::test]
    async fn test_missing_program_is_extraction_error() {
        let extractor = BcftoolsExtractor::new("/nonexistent/bin/bcftools");
        let study = StudyId::parse("ieu-a:2").unwrap();

        let result = extractor
            .extract(Path::new("/nonexistent/data.vcf.gz"), &study, SampleSize::Missing)
            .await;

        assert!(matches!(result, Err(IngestError::Extraction(_))));
    }
}
