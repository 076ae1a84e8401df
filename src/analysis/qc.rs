use serde::Serialize;
use std::collections::BTreeMap;

use crate::analysis::reliability::{calculate_ab, record_allele_depths, record_depth};
use crate::types::VariantRecord;

/// Stratum label for records whose first annotation carries no impact.
pub const UNKNOWN_IMPACT: &str = "UNKNOWN";

/// Five-number style summary of a sample of values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl DistributionSummary {
    /// `None` for an empty sample.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean: sorted.iter().sum::<f64>() / count as f64,
            median,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImpactStratum {
    pub depth: Vec<f64>,
    pub allele_balance: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumSummary {
    pub depth: Option<DistributionSummary>,
    pub allele_balance: Option<DistributionSummary>,
}

/// Depth and allele balance by the impact of each record's first annotation.
///
/// Records without annotations, depth or allele depths are left out.
pub fn stratify_by_impact(records: &[VariantRecord]) -> BTreeMap<String, ImpactStratum> {
    let mut strata: BTreeMap<String, ImpactStratum> = BTreeMap::new();

    for record in records {
        let annotations = record.annotations();
        let first = match annotations.first() {
            Some(first) => first,
            None => continue,
        };
        let (depth, ad) = match (record_depth(record), record_allele_depths(record)) {
            (Some(depth), Some(ad)) => (depth, ad),
            _ => continue,
        };

        let impact = first
            .impact
            .as_ref()
            .map(|i| i.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN_IMPACT.to_string());
        let stratum = strata.entry(impact).or_default();
        stratum.depth.push(f64::from(depth));
        stratum.allele_balance.push(calculate_ab(Some(ad.as_slice())));
    }

    strata
}

/// Cohort-wide and per-impact distributions for one record set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcReport {
    pub records: usize,
    pub depth: Option<DistributionSummary>,
    pub allele_balance: Option<DistributionSummary>,
    pub by_impact: BTreeMap<String, StratumSummary>,
}

impl QcReport {
    pub fn from_records(records: &[VariantRecord]) -> Self {
        let depths: Vec<f64> = records
            .iter()
            .filter_map(record_depth)
            .map(f64::from)
            .collect();
        let balances: Vec<f64> = records
            .iter()
            .filter_map(record_allele_depths)
            .filter(|ad| ad.len() >= 2)
            .map(|ad| calculate_ab(Some(ad.as_slice())))
            .collect();

        let by_impact = stratify_by_impact(records)
            .into_iter()
            .map(|(impact, stratum)| {
                (
                    impact,
                    StratumSummary {
                        depth: DistributionSummary::from_values(&stratum.depth),
                        allele_balance: DistributionSummary::from_values(&stratum.allele_balance),
                    },
                )
            })
            .collect();

        Self {
            records: records.len(),
            depth: DistributionSummary::from_values(&depths),
            allele_balance: DistributionSummary::from_values(&balances),
            by_impact,
        }
    }
}

/// QC of the full input next to QC of the reliable subset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcComparison {
    pub raw: QcReport,
    pub reliable: QcReport,
}

impl QcComparison {
    pub fn new(raw: &[VariantRecord], reliable: &[VariantRecord]) -> Self {
        Self {
            raw: QcReport::from_records(raw),
            reliable: QcReport::from_records(reliable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_record;
    use pretty_assertions::assert_eq;

    fn rec(info: &str, sample: &str) -> VariantRecord {
        parse_record(&format!("chrI\t10\t.\tA\tG\t.\tPASS\t{}\tGT:DP:AD\t{}", info, sample)).unwrap()
    }

    #[test]
    fn test_distribution_summary() {
        let summary = DistributionSummary::from_values(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.mean, 2.5);
        assert_eq!(summary.median, 2.5);
        assert_eq!(DistributionSummary::from_values(&[7.0]).unwrap().median, 7.0);
        assert!(DistributionSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_stratify_uses_first_annotation() {
        let records = vec![
            rec("ANN=G|missense_variant|MODERATE,G|stop_gained|HIGH", "0/1:20:10,10"),
            rec("ANN=G|stop_gained|HIGH", "0/1:30:15,15"),
            rec("ANN=G|intron_variant", "0/1:12:6,6"),
            rec("DP=40", "0/1:40:20,20"),
            rec("ANN=G|stop_gained|HIGH", "0/1:.:."),
        ];
        let strata = stratify_by_impact(&records);
        assert_eq!(strata.len(), 3);
        assert_eq!(strata["MODERATE"].depth, vec![20.0]);
        assert_eq!(strata["HIGH"].depth, vec![30.0]);
        assert_eq!(strata["HIGH"].allele_balance, vec![0.5]);
        assert_eq!(strata[UNKNOWN_IMPACT].depth, vec![12.0]);
    }

    #[test]
    fn test_comparison_counts() {
        let raw = vec![
            rec("ANN=G|missense_variant|MODERATE", "0/1:20:10,10"),
            rec("ANN=G|missense_variant|MODERATE", "0/1:4:4,0"),
        ];
        let reliable = vec![raw[0].clone()];
        let qc = QcComparison::new(&raw, &reliable);
        assert_eq!(qc.raw.records, 2);
        assert_eq!(qc.reliable.records, 1);
        assert_eq!(qc.raw.depth.as_ref().unwrap().min, 4.0);
        assert_eq!(qc.reliable.allele_balance.as_ref().unwrap().mean, 0.5);
    }
}
