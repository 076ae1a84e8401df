use hashbrown::{HashMap, HashSet};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::TriageConfig;
use crate::types::*;

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").expect("valid digit regex");
}

/// Consequences that change the protein product.
pub const PROTEIN_ALTERING: [&str; 4] = [
    "missense_variant",
    "stop_gained",
    "start_lost",
    "frameshift_variant",
];

/// Protein-level class of an `HGVS.p` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProteinEffect {
    Unknown,
    Nonsense,
    Synonymous,
    Missense,
    Other,
}

impl ProteinEffect {
    /// Classify by precedence: unknown, termination, equality, then the
    /// length-based missense fallback.
    pub fn classify(hgvs_p: Option<&str>) -> Self {
        let p = match hgvs_p {
            None | Some("") | Some("p.?") => return ProteinEffect::Unknown,
            Some(p) => p,
        };

        if p.contains("Ter") || p.contains('*') {
            ProteinEffect::Nonsense
        } else if p.contains('=') {
            ProteinEffect::Synonymous
        } else if p.starts_with("p.") && p.len() > 5 {
            ProteinEffect::Missense
        } else {
            ProteinEffect::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProteinEffect::Unknown => "unknown",
            ProteinEffect::Nonsense => "nonsense",
            ProteinEffect::Synonymous => "synonymous",
            ProteinEffect::Missense => "missense",
            ProteinEffect::Other => "other",
        }
    }
}

/// Reduce transcript-level annotations to one per variant.
///
/// With `coding_only`, non protein-coding entries are dropped before grouping, so a
/// variant annotated only on non-coding transcripts disappears from the output.
/// Within a variant the highest impact rank wins; among equal ranks the first
/// entry in input order is kept. Output follows first appearance of each variant.
pub fn collapse_to_most_severe(
    annotations: &[KeyedAnnotation],
    coding_only: bool,
) -> Vec<KeyedAnnotation> {
    let mut index: HashMap<&VariantKey, usize> = HashMap::new();
    let mut best: Vec<&KeyedAnnotation> = Vec::new();

    for ann in annotations
        .iter()
        .filter(|a| !coding_only || a.entry.is_protein_coding())
    {
        match index.get(&ann.key) {
            Some(&slot) => {
                if ann.entry.impact_rank() > best[slot].entry.impact_rank() {
                    best[slot] = ann;
                }
            }
            None => {
                index.insert(&ann.key, best.len());
                best.push(ann);
            }
        }
    }

    debug!(
        "Collapsed {} annotations to {} variants (coding_only={})",
        annotations.len(),
        best.len(),
        coding_only
    );
    best.into_iter().cloned().collect()
}

/// Number of variants annotated on more than one distinct feature.
pub fn count_multi_transcript_variants(annotations: &[KeyedAnnotation]) -> usize {
    let mut features: HashMap<&VariantKey, HashSet<Option<&str>>> = HashMap::new();
    for ann in annotations {
        features
            .entry(&ann.key)
            .or_default()
            .insert(ann.entry.feature_id.as_deref());
    }
    features.values().filter(|f| f.len() > 1).count()
}

pub fn classify_protein_effects(annotations: &[KeyedAnnotation]) -> BTreeMap<ProteinEffect, usize> {
    let mut counts = BTreeMap::new();
    for ann in annotations {
        *counts
            .entry(ProteinEffect::classify(ann.entry.hgvs_p.as_deref()))
            .or_insert(0) += 1;
    }
    counts
}

/// First contiguous run of digits in a protein change, e.g. `p.Lys123Ter` gives 123.
///
/// Only expressions starting with `p.` and longer than five characters carry a position.
pub fn extract_amino_acid_position(hgvs_p: &str) -> Option<u64> {
    if !hgvs_p.starts_with("p.") || hgvs_p.len() <= 5 {
        return None;
    }
    DIGIT_RUN
        .find(hgvs_p)
        .and_then(|m| m.as_str().parse().ok())
}

pub fn extract_amino_acid_positions(annotations: &[KeyedAnnotation]) -> Vec<u64> {
    annotations
        .iter()
        .filter_map(|a| a.entry.hgvs_p.as_deref())
        .filter_map(extract_amino_acid_position)
        .collect()
}

/// Bucket positions into windows of `bin_size`, keyed by window start.
pub fn histogram_positions(positions: &[u64], bin_size: u64) -> BTreeMap<u64, usize> {
    let bin_size = bin_size.max(1);
    let mut histogram = BTreeMap::new();
    for pos in positions {
        *histogram.entry((pos / bin_size) * bin_size).or_insert(0) += 1;
    }
    histogram
}

pub fn consequence_counts(annotations: &[KeyedAnnotation]) -> BTreeMap<String, usize> {
    count_field(annotations, AnnotationField::Consequence)
}

pub fn impact_counts(annotations: &[KeyedAnnotation]) -> BTreeMap<String, usize> {
    count_field(annotations, AnnotationField::Impact)
}

fn count_field(annotations: &[KeyedAnnotation], field: AnnotationField) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in annotations.iter().filter_map(|a| a.entry.field(field)) {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Per-gene count of annotations at `impact`. Entries without a gene name are ignored.
pub fn count_by_impact_per_gene(
    annotations: &[KeyedAnnotation],
    impact: &Impact,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for ann in annotations {
        if ann.entry.impact.as_ref() != Some(impact) {
            continue;
        }
        if let Some(gene) = &ann.entry.gene_name {
            *counts.entry(gene.clone()).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneCount {
    pub gene: String,
    pub count: usize,
}

/// The `n` genes with the most annotations, highest first. Equal counts keep the
/// order in which the genes were first seen.
pub fn top_genes_by_annotation_count(annotations: &[KeyedAnnotation], n: usize) -> Vec<GeneCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut genes: Vec<GeneCount> = Vec::new();

    for gene in annotations.iter().filter_map(|a| a.entry.gene_name.as_deref()) {
        match index.get(gene) {
            Some(&slot) => genes[slot].count += 1,
            None => {
                index.insert(gene, genes.len());
                genes.push(GeneCount {
                    gene: gene.to_string(),
                    count: 1,
                });
            }
        }
    }

    genes.sort_by(|a, b| b.count.cmp(&a.count));
    genes.truncate(n);
    genes
}

/// Keep annotations whose `field` equals one of `allowed`.
pub fn filter_annotations(
    annotations: &[KeyedAnnotation],
    field: AnnotationField,
    allowed: &[&str],
) -> Vec<KeyedAnnotation> {
    annotations
        .iter()
        .filter(|a| a.entry.field(field).is_some_and(|v| allowed.contains(&v)))
        .cloned()
        .collect()
}

pub fn filter_by_impact(annotations: &[KeyedAnnotation], impacts: &[Impact]) -> Vec<KeyedAnnotation> {
    let allowed: Vec<&str> = impacts.iter().map(Impact::as_str).collect();
    filter_annotations(annotations, AnnotationField::Impact, &allowed)
}

pub fn filter_by_consequence(
    annotations: &[KeyedAnnotation],
    consequences: &[&str],
) -> Vec<KeyedAnnotation> {
    filter_annotations(annotations, AnnotationField::Consequence, consequences)
}

pub fn filter_protein_altering(annotations: &[KeyedAnnotation]) -> Vec<KeyedAnnotation> {
    filter_by_consequence(annotations, &PROTEIN_ALTERING)
}

pub fn group_by_gene(annotations: &[KeyedAnnotation]) -> BTreeMap<String, Vec<KeyedAnnotation>> {
    let mut groups: BTreeMap<String, Vec<KeyedAnnotation>> = BTreeMap::new();
    for ann in annotations {
        if let Some(gene) = &ann.entry.gene_name {
            groups.entry(gene.clone()).or_default().push(ann.clone());
        }
    }
    groups
}

/// Cohort-level statistics for one set of annotated variants.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrioritizationSummary {
    pub annotation_count: usize,
    pub variant_count: usize,
    pub multi_transcript_variants: usize,
    pub consequence_counts: BTreeMap<String, usize>,
    pub impact_counts: BTreeMap<String, usize>,
    pub top_genes: Vec<GeneCount>,
    pub high_impact_genes: BTreeMap<String, usize>,
    pub protein_effects: BTreeMap<ProteinEffect, usize>,
    pub position_histogram: BTreeMap<u64, usize>,
}

/// Collapses annotations and computes the cohort summary.
pub struct Prioritizer {
    coding_only: bool,
    bin_size: u64,
    top_n: usize,
}

impl Prioritizer {
    pub fn new(coding_only: bool, bin_size: u64, top_n: usize) -> Self {
        Self {
            coding_only,
            bin_size,
            top_n,
        }
    }

    pub fn from_config(config: &TriageConfig) -> Self {
        Self::new(config.collapse_coding_only, config.bin_size, config.top_n)
    }

    pub fn collapse(&self, annotations: &[KeyedAnnotation]) -> Vec<KeyedAnnotation> {
        collapse_to_most_severe(annotations, self.coding_only)
    }

    /// Fan-out, consequence, impact and gene counts use every annotation; the
    /// per-variant statistics (HIGH genes, protein effects, positions) use the
    /// collapsed set so each variant is counted once.
    pub fn summarize(
        &self,
        annotations: &[KeyedAnnotation],
        collapsed: &[KeyedAnnotation],
    ) -> PrioritizationSummary {
        PrioritizationSummary {
            annotation_count: annotations.len(),
            variant_count: collapsed.len(),
            multi_transcript_variants: count_multi_transcript_variants(annotations),
            consequence_counts: consequence_counts(annotations),
            impact_counts: impact_counts(annotations),
            top_genes: top_genes_by_annotation_count(annotations, self.top_n),
            high_impact_genes: count_by_impact_per_gene(collapsed, &Impact::High),
            protein_effects: classify_protein_effects(collapsed),
            position_histogram: histogram_positions(
                &extract_amino_acid_positions(collapsed),
                self.bin_size,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ann(pos: u64, impact: &str, gene: &str, feature: &str, biotype: &str) -> KeyedAnnotation {
        KeyedAnnotation {
            key: VariantKey::new("chrI", pos, "A", "T"),
            entry: AnnotationEntry {
                consequence: Some("missense_variant".to_string()),
                impact: Some(Impact::from(impact)),
                gene_name: Some(gene.to_string()),
                feature_id: Some(feature.to_string()),
                transcript_biotype: Some(biotype.to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_collapse_picks_highest_impact() {
        let annotations = vec![
            ann(1, "LOW", "G1", "t1", "protein_coding"),
            ann(1, "HIGH", "G1", "t2", "protein_coding"),
            ann(1, "MODIFIER", "G1", "t3", "protein_coding"),
        ];
        let collapsed = collapse_to_most_severe(&annotations, false);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].entry.impact, Some(Impact::High));
        assert_eq!(collapsed[0].entry.feature_id.as_deref(), Some("t2"));
    }

    #[test]
    fn test_collapse_ties_keep_first() {
        let annotations = vec![
            ann(1, "MODIFIER", "G1", "first", "protein_coding"),
            ann(1, "MODIFIER", "G1", "second", "protein_coding"),
            ann(1, "MODIFIER", "G1", "third", "protein_coding"),
        ];
        let collapsed = collapse_to_most_severe(&annotations, false);
        assert_eq!(collapsed[0].entry.feature_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_collapse_unknown_impact_ranks_below_modifier() {
        let annotations = vec![
            ann(1, "WHATEVER", "G1", "t1", "protein_coding"),
            ann(1, "MODIFIER", "G1", "t2", "protein_coding"),
        ];
        let collapsed = collapse_to_most_severe(&annotations, false);
        assert_eq!(collapsed[0].entry.feature_id.as_deref(), Some("t2"));
    }

    #[test]
    fn test_collapse_coding_filter_applies_before_grouping() {
        let annotations = vec![
            ann(1, "HIGH", "G1", "t1", "nonsense_mediated_decay"),
            ann(1, "LOW", "G1", "t2", "protein_coding"),
            ann(2, "HIGH", "G2", "t3", "retained_intron"),
        ];
        let collapsed = collapse_to_most_severe(&annotations, true);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].key.pos, 1);
        assert_eq!(collapsed[0].entry.impact, Some(Impact::Low));

        let all = collapse_to_most_severe(&annotations, false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].entry.impact, Some(Impact::High));
    }

    #[test]
    fn test_collapse_preserves_variant_order() {
        let annotations = vec![
            ann(30, "LOW", "G3", "t1", "protein_coding"),
            ann(10, "LOW", "G1", "t2", "protein_coding"),
            ann(30, "HIGH", "G3", "t3", "protein_coding"),
            ann(20, "LOW", "G2", "t4", "protein_coding"),
        ];
        let positions: Vec<u64> = collapse_to_most_severe(&annotations, false)
            .iter()
            .map(|a| a.key.pos)
            .collect();
        assert_eq!(positions, vec![30, 10, 20]);
    }

    #[test]
    fn test_multi_transcript_count() {
        let annotations = vec![
            ann(1, "LOW", "G1", "t1", "protein_coding"),
            ann(1, "LOW", "G1", "t2", "protein_coding"),
            ann(2, "LOW", "G2", "t3", "protein_coding"),
            ann(2, "HIGH", "G2", "t3", "protein_coding"),
        ];
        assert_eq!(count_multi_transcript_variants(&annotations), 1);
    }

    #[rstest]
    #[case(None, ProteinEffect::Unknown)]
    #[case(Some(""), ProteinEffect::Unknown)]
    #[case(Some("p.?"), ProteinEffect::Unknown)]
    #[case(Some("p.Gln12Ter"), ProteinEffect::Nonsense)]
    #[case(Some("p.Gln12*"), ProteinEffect::Nonsense)]
    #[case(Some("p.Ter12Ter="), ProteinEffect::Nonsense)]
    #[case(Some("p.Leu12="), ProteinEffect::Synonymous)]
    #[case(Some("p.Lys4Asn"), ProteinEffect::Missense)]
    #[case(Some("p.A4"), ProteinEffect::Other)]
    #[case(Some("c.10A>T"), ProteinEffect::Other)]
    fn test_protein_effect_precedence(#[case] hgvs_p: Option<&str>, #[case] expected: ProteinEffect) {
        assert_eq!(ProteinEffect::classify(hgvs_p), expected);
    }

    #[rstest]
    #[case("p.Lys123Ter", Some(123))]
    #[case("p.Ala12_Gly14del", Some(12))]
    #[case("p.Leu5=", Some(5))]
    #[case("p.?", None)]
    #[case("p.Met", None)]
    #[case("c.123A>G", None)]
    fn test_amino_acid_position(#[case] hgvs_p: &str, #[case] expected: Option<u64>) {
        assert_eq!(extract_amino_acid_position(hgvs_p), expected);
    }

    #[test]
    fn test_histogram_buckets() {
        let histogram = histogram_positions(&[50, 149, 150, 399], 100);
        let expected: BTreeMap<u64, usize> = [(0, 1), (100, 2), (300, 1)].into_iter().collect();
        assert_eq!(histogram, expected);
    }

    #[test]
    fn test_top_genes_ties_keep_first_seen() {
        let annotations = vec![
            ann(1, "LOW", "B", "t", "protein_coding"),
            ann(2, "LOW", "A", "t", "protein_coding"),
            ann(3, "LOW", "C", "t", "protein_coding"),
            ann(4, "LOW", "C", "t", "protein_coding"),
            ann(5, "LOW", "A", "t", "protein_coding"),
            ann(6, "LOW", "B", "t", "protein_coding"),
            ann(7, "LOW", "D", "t", "protein_coding"),
        ];
        let top = top_genes_by_annotation_count(&annotations, 3);
        let names: Vec<&str> = top.iter().map(|g| g.gene.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(top[0].count, 2);
    }

    #[test]
    fn test_high_impact_genes_and_filters() {
        let mut annotations = vec![
            ann(1, "HIGH", "G1", "t1", "protein_coding"),
            ann(2, "HIGH", "G1", "t2", "protein_coding"),
            ann(3, "MODERATE", "G2", "t3", "protein_coding"),
            ann(4, "LOW", "G3", "t4", "protein_coding"),
        ];
        annotations[3].entry.consequence = Some("synonymous_variant".to_string());

        let high = count_by_impact_per_gene(&annotations, &Impact::High);
        assert_eq!(high.get("G1"), Some(&2));
        assert_eq!(high.len(), 1);

        assert_eq!(
            filter_by_impact(&annotations, &[Impact::High, Impact::Moderate]).len(),
            3
        );
        assert_eq!(filter_protein_altering(&annotations).len(), 3);
        assert_eq!(
            filter_annotations(&annotations, AnnotationField::GeneName, &["G3"]).len(),
            1
        );
        assert_eq!(group_by_gene(&annotations)["G1"].len(), 2);
    }

    #[test]
    fn test_missing_fields_degrade_quietly() {
        let bare = KeyedAnnotation {
            key: VariantKey::new("chrI", 9, "C", "G"),
            entry: AnnotationEntry::default(),
        };
        let annotations = vec![bare];
        assert!(consequence_counts(&annotations).is_empty());
        assert!(top_genes_by_annotation_count(&annotations, 5).is_empty());
        assert!(extract_amino_acid_positions(&annotations).is_empty());
        assert_eq!(
            classify_protein_effects(&annotations).get(&ProteinEffect::Unknown),
            Some(&1)
        );
        assert_eq!(collapse_to_most_severe(&annotations, false).len(), 1);
    }

    #[test]
    fn test_summary() {
        let mut annotations = vec![
            ann(1, "LOW", "G1", "t1", "protein_coding"),
            ann(1, "HIGH", "G1", "t2", "protein_coding"),
            ann(2, "MODERATE", "G2", "t3", "protein_coding"),
        ];
        annotations[1].entry.hgvs_p = Some("p.Gln120Ter".to_string());
        annotations[2].entry.hgvs_p = Some("p.Lys4Asn".to_string());

        let prioritizer = Prioritizer::new(false, 100, 10);
        let collapsed = prioritizer.collapse(&annotations);
        let summary = prioritizer.summarize(&annotations, &collapsed);

        assert_eq!(summary.annotation_count, 3);
        assert_eq!(summary.variant_count, 2);
        assert_eq!(summary.multi_transcript_variants, 1);
        assert_eq!(summary.impact_counts.get("LOW"), Some(&1));
        assert_eq!(summary.high_impact_genes.get("G1"), Some(&1));
        assert_eq!(summary.protein_effects.get(&ProteinEffect::Nonsense), Some(&1));
        assert_eq!(summary.protein_effects.get(&ProteinEffect::Missense), Some(&1));
        let expected: BTreeMap<u64, usize> = [(0, 1), (100, 1)].into_iter().collect();
        assert_eq!(summary.position_histogram, expected);
    }
}
