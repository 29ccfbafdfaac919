// ==============================================================================
// parsers/mod.rs - Input parser modules
// ==============================================================================
// Description: Format detection and parsers for GWAS ingestion inputs
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

pub mod format;
pub mod summary_stats;
pub mod top_hits;

pub use format::detect_format;
pub use summary_stats::{
    parse_line, FieldCounts, FieldParseError, LineError, ParseStats, ParsedLine, SummaryStatsParser,
};
pub use top_hits::TopHitSet;
