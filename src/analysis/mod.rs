pub mod focus;
pub mod prioritize;
pub mod qc;
pub mod reliability;
pub mod sift;
pub mod tagging;

use serde::Serialize;
use std::collections::BTreeMap;

pub use focus::FocusMode;
pub use prioritize::{PrioritizationSummary, Prioritizer, ProteinEffect};
pub use qc::{QcComparison, QcReport};
pub use reliability::{calculate_ab, ReliabilityClassifier, ReliabilitySummary, ReliabilityVerdict};
pub use sift::{SiftScore, SiftSummary};
pub use tagging::{FrequencyTagger, PhenotypeTagger, Tagger};

/// Container for everything a single pass reports.
#[derive(Debug, Default, Serialize)]
pub struct AnalysisResults {
    pub input: String,
    pub records: usize,
    pub skipped_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization: Option<PrioritizationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reliability: Option<ReliabilitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc: Option<QcComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sift: Option<SiftSummary>,
    /// Tag key to per-value record counts.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, BTreeMap<String, usize>>,
}

impl AnalysisResults {
    pub fn new(input: impl Into<String>, records: usize, skipped_lines: usize) -> Self {
        Self {
            input: input.into(),
            records,
            skipped_lines,
            ..Self::default()
        }
    }

    pub fn count_tag(&mut self, key: &str, value: &str) {
        *self
            .tags
            .entry(key.to_string())
            .or_default()
            .entry(value.to_string())
            .or_insert(0) += 1;
    }
}
