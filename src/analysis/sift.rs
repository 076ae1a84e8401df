use hashbrown::HashSet;
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{VariantKey, VariantRecord};

pub const SIFT_SCORE_KEY: &str = "SIFT4G";
pub const SIFT_PRED_KEY: &str = "SIFT4G_pred";

/// Meta line emitted by the SIFT4G annotator that downstream VCF readers reject.
pub const SIFT_THRESHOLD_HEADER: &str = "##SIFT_Threshold:";

/// Deleteriousness score and prediction attached to one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiftScore {
    pub key: VariantKey,
    pub score: Option<f64>,
    pub prediction: Option<String>,
}

impl SiftScore {
    pub fn from_record(record: &VariantRecord) -> Self {
        let score = record.info.value(SIFT_SCORE_KEY).and_then(|raw| {
            raw.parse().ok().or_else(|| {
                warn!("Unparsable {} value '{}' at {}", SIFT_SCORE_KEY, raw, record.key());
                None
            })
        });

        Self {
            key: record.key().clone(),
            score,
            prediction: record.info.value(SIFT_PRED_KEY).map(str::to_string),
        }
    }

    /// Scored strictly below `threshold`. Unscored variants are never damaging.
    pub fn is_damaging(&self, threshold: f64) -> bool {
        self.score.is_some_and(|s| s < threshold)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiftSummary {
    pub records: usize,
    pub scored: usize,
    pub damaging: usize,
}

impl SiftSummary {
    pub fn new(scores: &[SiftScore], threshold: f64) -> Self {
        Self {
            records: scores.len(),
            scored: scores.iter().filter(|s| s.score.is_some()).count(),
            damaging: scores.iter().filter(|s| s.is_damaging(threshold)).count(),
        }
    }
}

pub fn parse_sift_scores(records: &[VariantRecord]) -> Vec<SiftScore> {
    records.iter().map(SiftScore::from_record).collect()
}

pub fn filter_damaging(scores: &[SiftScore], threshold: f64) -> Vec<SiftScore> {
    let damaging: Vec<SiftScore> = scores
        .iter()
        .filter(|s| s.is_damaging(threshold))
        .cloned()
        .collect();
    debug!(
        "{} of {} scored variants below {}",
        damaging.len(),
        scores.len(),
        threshold
    );
    damaging
}

/// Records whose key appears in `scores`, in record order.
pub fn select_scored_records(records: &[VariantRecord], scores: &[SiftScore]) -> Vec<VariantRecord> {
    let keys: HashSet<&VariantKey> = scores.iter().map(|s| &s.key).collect();
    records
        .iter()
        .filter(|r| keys.contains(r.key()))
        .cloned()
        .collect()
}

pub fn is_sift_threshold_header(line: &str) -> bool {
    line.starts_with(SIFT_THRESHOLD_HEADER)
}

pub fn strip_sift_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .filter(|h| !is_sift_threshold_header(h))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::parse_record;

    fn scored(pos: u64, info: &str) -> VariantRecord {
        parse_record(&format!("chrI\t{}\t.\tA\tT\t50\tPASS\t{}", pos, info)).unwrap()
    }

    #[test]
    fn test_parse_scores() {
        let records = vec![
            scored(1, "SIFT4G=0.01;SIFT4G_pred=DELETERIOUS"),
            scored(2, "SIFT4G=0.5;SIFT4G_pred=TOLERATED"),
            scored(3, "DP=4"),
            scored(4, "SIFT4G=NA"),
        ];
        let scores = parse_sift_scores(&records);
        assert_eq!(scores[0].score, Some(0.01));
        assert_eq!(scores[0].prediction.as_deref(), Some("DELETERIOUS"));
        assert_eq!(scores[2].score, None);
        assert_eq!(scores[2].prediction, None);
        assert_eq!(scores[3].score, None);
    }

    #[test]
    fn test_damaging_threshold_is_strict() {
        let records = vec![
            scored(1, "SIFT4G=0.01"),
            scored(2, "SIFT4G=0.05"),
            scored(3, "."),
            scored(4, "SIFT4G=0"),
        ];
        let scores = parse_sift_scores(&records);
        let damaging = filter_damaging(&scores, 0.05);
        let positions: Vec<u64> = damaging.iter().map(|s| s.key.pos).collect();
        assert_eq!(positions, vec![1, 4]);

        let summary = SiftSummary::new(&scores, 0.05);
        assert_eq!(summary.records, 4);
        assert_eq!(summary.scored, 3);
        assert_eq!(summary.damaging, 2);

        let selected = select_scored_records(&records, &damaging);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[1].pos(), 4);
    }

    #[test]
    fn test_strip_threshold_header() {
        let headers = vec![
            "##fileformat=VCFv4.2".to_string(),
            "##SIFT_Threshold: 0.05".to_string(),
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO".to_string(),
        ];
        let stripped = strip_sift_headers(&headers);
        assert_eq!(stripped.len(), 2);
        assert!(!stripped.iter().any(|h| h.contains("SIFT_Threshold")));
    }
}
