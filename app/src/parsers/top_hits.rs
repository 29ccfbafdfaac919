// ==============================================================================
// parsers/top_hits.rs - Top Hits Allow-List
// ==============================================================================
// Description: Loads the curated set of significant variant ids for a study
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================
// Format: one variant id per line, plain text or gzip'd (.gz)
// ==============================================================================

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

use super::summary_stats::open_gzip;
use crate::error::IngestError;

/// Variant ids mirrored into the top-hits index; read once, never modified
#[derive(Debug, Clone, Default)]
pub struct TopHitSet {
    ids: HashSet<String>,
}

impl TopHitSet {
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        if !path.is_file() {
            return Err(IngestError::MissingSource(path.to_path_buf()));
        }

        let gzipped = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let set = if gzipped {
            Self::from_reader(open_gzip(path)?)?
        } else {
            Self::from_reader(BufReader::new(File::open(path)?))?
        };

        info!("Loaded {} top hits from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, IngestError> {
        let mut ids = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        }
        Ok(Self { ids })
    }

    pub fn contains(&self, variant_id: &str) -> bool {
        self.ids.contains(variant_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TopHitSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}
