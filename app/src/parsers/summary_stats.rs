// ==============================================================================
// parsers/summary_stats.rs - Flat-Text Summary Statistics Parser
// ==============================================================================
// Description: Streaming parser for compressed GWAS summary statistics
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Format: gzip'd, newline-delimited, whitespace-separated, no header
// Columns:
//   chr  pos  id  alt(effect)  ref(other)  af  beta  se  p  n
// Example:
//   1 100 rs1 A G 0.5 0.1 0.05 1e-3 1000
//   1 200 rs2 C T . 0.2 0.02 5e-4 2000
// ==============================================================================

use flate2::read::MultiGzDecoder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Record, MISSING_VALUE};

/// Tokens per well-formed line
pub const EXPECTED_COLUMNS: usize = 10;

/// Lines between progress log entries
pub const PROGRESS_INTERVAL: u64 = 100_000;

const CHROMOSOME: usize = 0;
const VARIANT_ID: usize = 2;
const EFFECT_ALLELE: usize = 3;
const OTHER_ALLELE: usize = 4;

/// What happens to a line when one of its parsed fields is unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Keep the record, store the field as missing
    SetMissing,
    /// Drop the whole line as malformed
    RejectRecord,
}

/// One parsed column: where it lives, how to read it, what to do when it is bad
pub struct FieldSpec {
    pub name: &'static str,
    pub column: usize,
    pub parse: fn(&str, &mut Record) -> Result<(), String>,
    pub on_failure: OnFailure,
}

/// Parsed (non-string) columns, applied to every line in order
///
/// `position` is the one deliberate exception to keeping a record when a
/// single field fails. `Record::position` is not optional, so a line without a
/// usable position (including `.`) is rejected as malformed. Every other field
/// falls back to missing.
pub const FIELDS: [FieldSpec; 6] = [
    FieldSpec { name: "position", column: 1, parse: set_position, on_failure: OnFailure::RejectRecord },
    FieldSpec { name: "effect_allele_freq", column: 5, parse: set_effect_allele_freq, on_failure: OnFailure::SetMissing },
    FieldSpec { name: "beta", column: 6, parse: set_beta, on_failure: OnFailure::SetMissing },
    FieldSpec { name: "se", column: 7, parse: set_se, on_failure: OnFailure::SetMissing },
    FieldSpec { name: "p", column: 8, parse: set_p, on_failure: OnFailure::SetMissing },
    FieldSpec { name: "n", column: 9, parse: set_n, on_failure: OnFailure::SetMissing },
];

fn parse_float(token: &str) -> Result<f64, String> {
    let value: f64 = token.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    if !value.is_finite() {
        return Err("non-finite value".to_string());
    }
    Ok(value)
}

/// Whole counts, accepting float renderings such as "1000.0"
fn parse_count(token: &str) -> Result<u64, String> {
    if let Ok(n) = token.parse::<u64>() {
        return Ok(n);
    }
    let value = parse_float(token)?;
    if value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err("not a whole non-negative number".to_string());
    }
    Ok(value as u64)
}

fn set_position(token: &str, record: &mut Record) -> Result<(), String> {
    record.position = token.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    Ok(())
}

fn set_effect_allele_freq(token: &str, record: &mut Record) -> Result<(), String> {
    record.effect_allele_freq = Some(parse_float(token)?);
    Ok(())
}

fn set_beta(token: &str, record: &mut Record) -> Result<(), String> {
    record.beta = Some(parse_float(token)?);
    Ok(())
}

fn set_se(token: &str, record: &mut Record) -> Result<(), String> {
    record.se = Some(parse_float(token)?);
    Ok(())
}

fn set_p(token: &str, record: &mut Record) -> Result<(), String> {
    record.p = Some(parse_float(token)?);
    Ok(())
}

fn set_n(token: &str, record: &mut Record) -> Result<(), String> {
    record.n = Some(parse_count(token)?);
    Ok(())
}

/// A single unparseable statistic; the record is kept with the field missing
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: invalid {field} '{value}' for {variant_id}: {reason}")]
pub struct FieldParseError {
    pub line: u64,
    pub field: &'static str,
    pub variant_id: String,
    pub value: String,
    pub reason: String,
}

/// A line that cannot become a record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LineError {
    #[error("line {line}: expected {expected} whitespace-separated fields, found {found}")]
    FieldCount { line: u64, expected: usize, found: usize },

    #[error("line {line}: invalid {field} '{value}': {reason}")]
    InvalidKey {
        line: u64,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("line {line}: not valid UTF-8")]
    Encoding { line: u64 },
}

/// Result of parsing one well-formed line
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub record: Record,
    pub failures: Vec<FieldParseError>,
    /// Fields holding the missing-value literal
    pub missing: Vec<&'static str>,
}

/// Parse one line of the flat-text format
pub fn parse_line(line: &str, line_number: u64, study_id: &str) -> Result<ParsedLine, LineError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if tokens.len() != EXPECTED_COLUMNS {
        return Err(LineError::FieldCount {
            line: line_number,
            expected: EXPECTED_COLUMNS,
            found: tokens.len(),
        });
    }

    let mut record = Record::new(
        study_id,
        tokens[CHROMOSOME],
        tokens[VARIANT_ID],
        tokens[EFFECT_ALLELE],
        tokens[OTHER_ALLELE],
    );
    let mut failures = Vec::new();
    let mut missing = Vec::new();

    for spec in FIELDS.iter() {
        let token = tokens[spec.column];

        // Value comparison against the literal, not identity
        let outcome = if token == MISSING_VALUE {
            Err(None)
        } else {
            (spec.parse)(token, &mut record).map_err(Some)
        };

        match (outcome, spec.on_failure) {
            (Ok(()), _) => {}
            (Err(None), OnFailure::SetMissing) => missing.push(spec.name),
            (Err(Some(reason)), OnFailure::SetMissing) => failures.push(FieldParseError {
                line: line_number,
                field: spec.name,
                variant_id: record.variant_id.clone(),
                value: token.to_string(),
                reason,
            }),
            (Err(reason), OnFailure::RejectRecord) => {
                return Err(LineError::InvalidKey {
                    line: line_number,
                    field: spec.name,
                    value: token.to_string(),
                    reason: reason.unwrap_or_else(|| "missing value".to_string()),
                });
            }
        }
    }

    Ok(ParsedLine {
        record,
        failures,
        missing,
    })
}

/// Per-field tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldCounts {
    /// Held the missing-value literal
    pub missing: u64,
    /// Could not be parsed
    pub failed: u64,
}

/// Counters accumulated while streaming a source
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseStats {
    pub lines: u64,
    /// Records produced (malformed lines excluded)
    pub records_read: u64,
    pub malformed: u64,
    pub fields: BTreeMap<&'static str, FieldCounts>,
}

impl ParseStats {
    pub fn field(&self, name: &str) -> FieldCounts {
        self.fields.get(name).copied().unwrap_or_default()
    }

    pub fn field_failures(&self) -> u64 {
        self.fields.values().map(|c| c.failed).sum()
    }
}

/// Where records are coming from, for log context
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub study_id: String,
    pub source: PathBuf,
}

/// Forward-only parser over a line stream
///
/// Yields one `Record` per well-formed line. Malformed lines are logged,
/// counted and skipped; only read errors from the underlying stream are
/// returned as `Err`.
pub struct SummaryStatsParser<R> {
    reader: R,
    buffer: Vec<u8>,
    context: ParseContext,
    stats: ParseStats,
    started: Instant,
}

/// Open a (multi-member) gzip file for line reading
pub fn open_gzip(path: &Path) -> io::Result<BufReader<MultiGzDecoder<File>>> {
    let file = File::open(path)?;
    Ok(BufReader::new(MultiGzDecoder::new(file)))
}

impl SummaryStatsParser<BufReader<MultiGzDecoder<File>>> {
    pub fn open(path: &Path, study_id: &str) -> io::Result<Self> {
        let reader = open_gzip(path)?;
        Ok(Self::new(
            reader,
            ParseContext {
                study_id: study_id.to_string(),
                source: path.to_path_buf(),
            },
        ))
    }
}

impl<R: BufRead> SummaryStatsParser<R> {
    pub fn new(reader: R, context: ParseContext) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(256),
            context,
            stats: ParseStats::default(),
            started: Instant::now(),
        }
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub fn into_stats(self) -> ParseStats {
        self.stats
    }

    fn tally(&mut self, parsed: &ParsedLine) {
        for &name in &parsed.missing {
            self.stats.fields.entry(name).or_default().missing += 1;
            debug!(
                study = %self.context.study_id,
                variant_id = %parsed.record.variant_id,
                field = name,
                "Missing value"
            );
        }

        for failure in &parsed.failures {
            self.stats.fields.entry(failure.field).or_default().failed += 1;
            warn!(
                study = %self.context.study_id,
                source = %self.context.source.display(),
                line = failure.line,
                field = failure.field,
                variant_id = %failure.variant_id,
                value = %failure.value,
                "Field parse error, stored as missing: {}",
                failure.reason
            );
        }
    }
}

impl<R: BufRead> Iterator for SummaryStatsParser<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }

            self.stats.lines += 1;
            let line_number = self.stats.lines;

            if line_number % PROGRESS_INTERVAL == 0 {
                info!(
                    "{} {:.4}s {}",
                    self.context.source.display(),
                    self.started.elapsed().as_secs_f64(),
                    line_number
                );
            }

            let parsed = match std::str::from_utf8(&self.buffer) {
                Ok(text) => parse_line(text, line_number, &self.context.study_id),
                Err(_) => Err(LineError::Encoding { line: line_number }),
            };

            match parsed {
                Ok(parsed) => {
                    self.tally(&parsed);
                    self.stats.records_read += 1;
                    return Some(Ok(parsed.record));
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(
                        study = %self.context.study_id,
                        source = %self.context.source.display(),
                        line = line_number,
                        "Skipping malformed record: {}",
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    /// Gzip'd flat-text fixture
    pub(crate) fn create_gz_file(contents: &str) -> NamedTempFile {
        let file = tempfile::Builder::new().suffix(".txt.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        std::fs::write(file.path(), encoder.finish().unwrap()).unwrap();
        file
    }

    fn parser(contents: &[u8]) -> SummaryStatsParser<Cursor<Vec<u8>>> {
        SummaryStatsParser::new(
            Cursor::new(contents.to_vec()),
            ParseContext {
                study_id: "2".to_string(),
                source: PathBuf::from("test.txt.gz"),
            },
        )
    }

    #[test]
    fn test_three_line_example() {
        let contents = "\
1 100 rs1 A G 0.5 0.1 0.05 1e-3 1000
1 200 rs2 C T . 0.2 0.02 5e-4 2000
bad line
";
        let file = create_gz_file(contents);
        let mut parser = SummaryStatsParser::open(file.path(), "2").unwrap();

        let records: Vec<Record> = parser.by_ref().map(|r| r.unwrap()).collect();
        let stats = parser.into_stats();

        assert_eq!(records.len(), 2);
        assert_eq!(stats.records_read, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.lines, 3);

        let rs1 = &records[0];
        assert_eq!(rs1.study_id, "2");
        assert_eq!(rs1.chromosome, "1");
        assert_eq!(rs1.position, 100);
        assert_eq!(rs1.variant_id, "rs1");
        assert_eq!(rs1.effect_allele, "A");
        assert_eq!(rs1.other_allele, "G");
        assert_eq!(rs1.effect_allele_freq, Some(0.5));
        assert_eq!(rs1.beta, Some(0.1));
        assert_eq!(rs1.se, Some(0.05));
        assert_eq!(rs1.p, Some(1e-3));
        assert_eq!(rs1.n, Some(1000));

        let rs2 = &records[1];
        assert_eq!(rs2.effect_allele_freq, None);
        assert_eq!(rs2.beta, Some(0.2));
        assert_eq!(rs2.n, Some(2000));

        assert_eq!(stats.field("effect_allele_freq").missing, 1);
        assert_eq!(stats.field_failures(), 0);
    }

    #[test]
    fn test_single_field_failure_keeps_record() {
        let parsed = parse_line("1 100 rs1 A G 0.5 abc 0.05 1e-3 1000", 7, "2").unwrap();

        assert_eq!(parsed.record.beta, None);
        assert_eq!(parsed.record.se, Some(0.05));
        assert_eq!(parsed.record.n, Some(1000));
        assert_eq!(parsed.failures.len(), 1);

        let failure = &parsed.failures[0];
        assert_eq!(failure.field, "beta");
        assert_eq!(failure.line, 7);
        assert_eq!(failure.variant_id, "rs1");
        assert_eq!(failure.value, "abc");
    }

    /// Shared buffer the fmt subscriber writes into
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn test_field_failure_logged_once_with_field_and_line() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let mut contents: String = (1..=6)
            .map(|i| format!("1 {} rs{} A G 0.5 0.1 0.05 1e-3 1000\n", i * 100, i))
            .collect();
        contents.push_str("1 700 rs7 A G 0.5 abc 0.05 1e-3 1000\n");

        let records: Vec<Record> = tracing::subscriber::with_default(subscriber, || {
            parser(contents.as_bytes()).map(|r| r.unwrap()).collect()
        });

        assert_eq!(records.len(), 7);
        let warnings: Vec<String> = logs.lines().into_iter().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warnings.len(), 1, "{:?}", warnings);
        assert!(warnings[0].contains("field=\"beta\""), "{}", warnings[0]);
        assert!(warnings[0].contains("line=7"), "{}", warnings[0]);
        assert!(warnings[0].contains("rs7"), "{}", warnings[0]);
    }

    #[test]
    fn test_field_failures_are_counted_per_field() {
        let mut parser = parser(b"1 100 rs1 A G 0.5 abc 0.05 1e-3 1000\n1 101 rs2 A G 0.5 0.1 0.05 nan x\n");
        let records: Vec<Record> = parser.by_ref().map(|r| r.unwrap()).collect();
        let stats = parser.into_stats();

        assert_eq!(records.len(), 2);
        assert_eq!(stats.field("beta").failed, 1);
        assert_eq!(stats.field("p").failed, 1);
        assert_eq!(stats.field("n").failed, 1);
        assert_eq!(stats.field("se").failed, 0);
        assert_eq!(stats.field_failures(), 3);
    }

    #[test]
    fn test_wrong_token_count_is_malformed() {
        let err = parse_line("1 100 rs1 A G 0.5 0.1 0.05 1e-3", 3, "2").unwrap_err();
        assert_eq!(
            err,
            LineError::FieldCount {
                line: 3,
                expected: 10,
                found: 9
            }
        );

        assert!(parse_line("1 100 rs1 A G 0.5 0.1 0.05 1e-3 1000 extra", 4, "2").is_err());
        assert!(parse_line("", 5, "2").is_err());
    }

    #[test]
    fn test_bad_position_is_malformed() {
        match parse_line("1 12x rs1 A G 0.5 0.1 0.05 1e-3 1000", 9, "2").unwrap_err() {
            LineError::InvalidKey { line, field, value, .. } => {
                assert_eq!(line, 9);
                assert_eq!(field, "position");
                assert_eq!(value, "12x");
            }
            other => panic!("Expected InvalidKey, got {:?}", other),
        }

        assert!(parse_line("1 . rs1 A G 0.5 0.1 0.05 1e-3 1000", 10, "2").is_err());
    }

    #[test]
    fn test_sample_size_accepts_whole_floats() {
        let parsed = parse_line("1 100 rs1 A G 0.5 0.1 0.05 1e-3 1000.0", 1, "2").unwrap();
        assert_eq!(parsed.record.n, Some(1000));

        let parsed = parse_line("1 100 rs1 A G 0.5 0.1 0.05 1e-3 12.5", 1, "2").unwrap();
        assert_eq!(parsed.record.n, None);
        assert_eq!(parsed.failures[0].field, "n");
    }

    #[test]
    fn test_tabs_and_crlf_are_whitespace() {
        let parsed = parse_line("X\t5000\trs9\tT\tC\t0.1\t-0.3\t0.01\t2.5e-8\t450000\r\n", 1, "2").unwrap();
        assert_eq!(parsed.record.chromosome, "X");
        assert_eq!(parsed.record.beta, Some(-0.3));
        assert_eq!(parsed.record.p, Some(2.5e-8));
        assert_eq!(parsed.record.n, Some(450000));
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut contents = b"1 100 rs1 A G 0.5 0.1 0.05 1e-3 1000\n".to_vec();
        contents.extend_from_slice(b"1 101 rs\xff A G 0.5 0.1 0.05 1e-3 1000\n");
        contents.extend_from_slice(b"1 102 rs3 A G 0.5 0.1 0.05 1e-3 1000");

        let mut parser = parser(&contents);
        let ids: Vec<String> = parser.by_ref().map(|r| r.unwrap().variant_id).collect();

        assert_eq!(ids, vec!["rs1", "rs3"]);
        assert_eq!(parser.stats().malformed, 1);
        assert_eq!(parser.stats().records_read, 2);
    }
}
