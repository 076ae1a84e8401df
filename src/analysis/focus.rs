use serde::Deserialize;

use crate::types::VariantRecord;

pub const MISSENSE: &str = "missense_variant";

/// Subset of records kept by the `focus` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    /// Single-nucleotide variants with one ALT allele.
    BiallelicSnv,
    /// Records with at least one missense annotation.
    Missense,
    /// Both of the above.
    BiallelicMissense,
}

impl FocusMode {
    pub fn matches(&self, record: &VariantRecord) -> bool {
        match self {
            FocusMode::BiallelicSnv => is_biallelic_snv(record),
            FocusMode::Missense => is_missense(record),
            FocusMode::BiallelicMissense => is_biallelic_snv(record) && is_missense(record),
        }
    }

    pub fn select(&self, records: &[VariantRecord]) -> Vec<VariantRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

pub fn is_biallelic_snv(record: &VariantRecord) -> bool {
    record.is_snv() && record.is_biallelic()
}

pub fn is_missense(record: &VariantRecord) -> bool {
    record
        .annotations()
        .iter()
        .filter_map(|a| a.consequence.as_deref())
        .any(|c| c.contains(MISSENSE))
}
