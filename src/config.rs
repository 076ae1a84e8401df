use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Result, TriageError};
use crate::parsers::ParseMode;

/// Thresholds and switches shared by all passes.
///
/// Every field has a default, so a config file only needs to name what it changes:
///
/// ```toml
/// min_dp = 15
/// allowed_filters = ["PASS"]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriageConfig {
    /// Minimum read depth (DP) of the first sample.
    pub min_dp: u32,
    /// Minimum allele balance, alt / (ref + alt).
    pub min_ab: f64,
    /// Minimum INFO MQ; records without MQ are not penalised.
    pub min_mq: f64,
    /// FILTER values accepted as reliable. A missing FILTER counts as `.`.
    pub allowed_filters: BTreeSet<String>,
    /// Window size for the amino-acid position histogram.
    pub bin_size: u64,
    /// Drop non protein-coding transcripts before collapsing.
    pub collapse_coding_only: bool,
    /// Number of genes reported by the top-genes aggregate.
    pub top_n: usize,
    /// SIFT4G scores strictly below this are damaging.
    pub sift_threshold: f64,
    pub parse_mode: ParseMode,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            min_dp: 10,
            min_ab: 0.2,
            min_mq: 40.0,
            allowed_filters: ["PASS", "."].iter().map(|s| s.to_string()).collect(),
            bin_size: 100,
            collapse_coding_only: false,
            top_n: 10,
            sift_threshold: 0.05,
            parse_mode: ParseMode::FailFast,
        }
    }
}

impl TriageConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| TriageError::UnreadableSource {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            TriageError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_ab) {
            return Err(TriageError::InvalidConfig(format!(
                "min_ab must be within [0, 1], got {}",
                self.min_ab
            )));
        }
        if self.bin_size == 0 {
            return Err(TriageError::InvalidConfig(
                "bin_size must be at least 1".to_string(),
            ));
        }
        if self.min_mq < 0.0 {
            return Err(TriageError::InvalidConfig(format!(
                "min_mq must not be negative, got {}",
                self.min_mq
            )));
        }
        if !self.sift_threshold.is_finite() {
            return Err(TriageError::InvalidConfig(
                "sift_threshold must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}
