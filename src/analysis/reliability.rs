use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::config::TriageConfig;
use crate::types::VariantRecord;

/// Allele balance `alt / (ref + alt)` from the first two allele depths.
///
/// Returns 0.0 when depths are missing, fewer than two, or sum to zero.
pub fn calculate_ab(ad: Option<&[u32]>) -> f64 {
    match ad {
        Some([reference, alt, ..]) => {
            let total = u64::from(*reference) + u64::from(*alt);
            if total == 0 {
                0.0
            } else {
                f64::from(*alt) / total as f64
            }
        }
        _ => 0.0,
    }
}

/// Read depth of the first sample, falling back to INFO `DP`.
pub fn record_depth(record: &VariantRecord) -> Option<u32> {
    record
        .format
        .as_ref()
        .and_then(|f| f.first_sample("DP"))
        .and_then(|v| v.parse().ok())
        .or_else(|| record.info.value("DP").and_then(|v| v.parse().ok()))
}

/// Allele depths of the first sample. Any unparsable value drops the whole list.
pub fn record_allele_depths(record: &VariantRecord) -> Option<Vec<u32>> {
    let raw = record.format.as_ref()?.first_sample("AD")?;
    raw.split(',').map(|v| v.parse().ok()).collect()
}

fn info_number(record: &VariantRecord, key: &str) -> Option<f64> {
    record.info.value(key).and_then(|v| v.parse().ok())
}

/// SAF and SAR both present and at least one of them zero.
pub fn has_strand_bias(record: &VariantRecord) -> bool {
    match (info_number(record, "SAF"), info_number(record, "SAR")) {
        (Some(saf), Some(sar)) => saf == 0.0 || sar == 0.0,
        _ => false,
    }
}

/// INFO MQ present and below `threshold`.
pub fn has_low_mapping_quality(record: &VariantRecord, threshold: f64) -> bool {
    info_number(record, "MQ").is_some_and(|mq| mq < threshold)
}

/// A failed reliability predicate. Declaration order is the reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowDepth,
    LowAlleleBalance,
    FilterNotAllowed,
    StrandBias,
    LowMappingQuality,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::LowDepth => "low depth",
            RejectReason::LowAlleleBalance => "low allele balance",
            RejectReason::FilterNotAllowed => "filter not allowed",
            RejectReason::StrandBias => "strand bias",
            RejectReason::LowMappingQuality => "low mapping quality",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityVerdict {
    pub reliable: bool,
    pub reasons: Vec<RejectReason>,
    pub depth: u32,
    pub allele_balance: f64,
}

impl ReliabilityVerdict {
    pub fn primary_reason(&self) -> Option<RejectReason> {
        self.reasons.first().copied()
    }
}

/// Counts over a batch of verdicts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReliabilitySummary {
    pub total: usize,
    pub reliable: usize,
    /// Records per first failing reason.
    pub primary_reasons: BTreeMap<RejectReason, usize>,
    /// Every failing predicate, counted once per record.
    pub failures: BTreeMap<RejectReason, usize>,
}

impl ReliabilitySummary {
    pub fn from_verdicts(verdicts: &[ReliabilityVerdict]) -> Self {
        let mut summary = Self {
            total: verdicts.len(),
            ..Self::default()
        };
        for verdict in verdicts {
            if verdict.reliable {
                summary.reliable += 1;
            }
            if let Some(primary) = verdict.primary_reason() {
                *summary.primary_reasons.entry(primary).or_insert(0) += 1;
            }
            for reason in &verdict.reasons {
                *summary.failures.entry(*reason).or_insert(0) += 1;
            }
        }
        summary
    }
}

/// Technical reliability gate for single-sample records.
pub struct ReliabilityClassifier {
    min_dp: u32,
    min_ab: f64,
    min_mq: f64,
    allowed_filters: BTreeSet<String>,
}

impl ReliabilityClassifier {
    pub fn new(min_dp: u32, min_ab: f64, min_mq: f64, allowed_filters: BTreeSet<String>) -> Self {
        Self {
            min_dp,
            min_ab,
            min_mq,
            allowed_filters,
        }
    }

    pub fn from_config(config: &TriageConfig) -> Self {
        Self::new(
            config.min_dp,
            config.min_ab,
            config.min_mq,
            config.allowed_filters.clone(),
        )
    }

    /// Evaluate every predicate; the verdict lists all failures.
    pub fn classify(&self, record: &VariantRecord) -> ReliabilityVerdict {
        let depth = record_depth(record).unwrap_or(0);
        let allele_balance = calculate_ab(record_allele_depths(record).as_deref());
        let filter = record.filter.as_deref().unwrap_or(".");

        let mut reasons = Vec::new();
        if depth < self.min_dp {
            reasons.push(RejectReason::LowDepth);
        }
        if allele_balance < self.min_ab {
            reasons.push(RejectReason::LowAlleleBalance);
        }
        if !self.allowed_filters.contains(filter) {
            reasons.push(RejectReason::FilterNotAllowed);
        }
        if has_strand_bias(record) {
            reasons.push(RejectReason::StrandBias);
        }
        if has_low_mapping_quality(record, self.min_mq) {
            reasons.push(RejectReason::LowMappingQuality);
        }

        ReliabilityVerdict {
            reliable: reasons.is_empty(),
            reasons,
            depth,
            allele_balance,
        }
    }

    pub fn is_reliable(&self, record: &VariantRecord) -> bool {
        self.classify(record).reliable
    }

    /// Classify a batch on the rayon pool; verdicts line up with `records`.
    pub fn classify_all(&self, records: &[VariantRecord]) -> Vec<ReliabilityVerdict> {
        records.par_iter().map(|r| self.classify(r)).collect()
    }

    /// Reliable records in input order.
    pub fn filter_reliable(&self, records: &[VariantRecord]) -> Vec<VariantRecord> {
        let verdicts = self.classify_all(records);
        let kept: Vec<VariantRecord> = records
            .iter()
            .zip(&verdicts)
            .filter(|(_, v)| v.reliable)
            .map(|(r, _)| r.clone())
            .collect();
        debug!("{} of {} records reliable", kept.len(), records.len());
        kept
    }
}

impl Default for ReliabilityClassifier {
    fn default() -> Self {
        Self::from_config(&TriageConfig::default())
    }
}
