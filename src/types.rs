use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::parsers::ann::decode_annotations;

/// INFO key carrying functional annotations.
pub const ANN_KEY: &str = "ANN";

/// Identity of a variant: chromosome, position, reference and alternate allele.
///
/// Rendered as `chrom:pos:ref:alt`, which is also the form used by reference
/// variant sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VariantKey {
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub ref_allele: String,
    pub alt: String,
}

impl VariantKey {
    pub fn new(
        chrom: impl Into<String>,
        pos: u64,
        ref_allele: impl Into<String>,
        alt: impl Into<String>,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt: alt.into(),
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chrom, self.pos, self.ref_allele, self.alt
        )
    }
}

impl FromStr for VariantKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(4, ':').collect();
        if parts.len() != 4 {
            return Err(format!("expected chrom:pos:ref:alt, got '{}'", s));
        }
        let pos = parts[1]
            .parse()
            .map_err(|_| format!("invalid position in variant key '{}'", s))?;
        Ok(VariantKey::new(parts[0], pos, parts[2], parts[3]))
    }
}

/// Single-base, non-identical REF and ALT.
pub fn is_snv(ref_allele: &str, alt: &str) -> bool {
    ref_allele.len() == 1 && alt.len() == 1 && ref_allele != alt
}

pub fn is_biallelic(alt: &str) -> bool {
    !alt.contains(',')
}

/// Value of one INFO entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Flag,
    Value(String),
}

/// The INFO column as an ordered list of entries.
///
/// Order is preserved so that a parsed record serializes back to the same text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoField {
    entries: Vec<(String, InfoValue)>,
}

impl InfoField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Self {
        let mut info = InfoField::new();
        if raw == "." || raw.is_empty() {
            return info;
        }

        for entry in raw.split(';').filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((key, value)) => info
                    .entries
                    .push((key.to_string(), InfoValue::Value(value.to_string()))),
                None => info.entries.push((entry.to_string(), InfoValue::Flag)),
            }
        }

        info
    }

    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// String value for `key`; `None` for flags and absent keys.
    pub fn value(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            InfoValue::Value(v) => Some(v.as_str()),
            InfoValue::Flag => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` to `value`, replacing an existing entry in place.
    ///
    /// Later duplicates of the same key are dropped so repeated application
    /// always leaves exactly one occurrence.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = InfoValue::Value(value.into());
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.entries[idx].1 = value;
                let mut seen = false;
                self.entries.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn occurrences(&self, key: &str) -> usize {
        self.entries.iter().filter(|(k, _)| k == key).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InfoValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for InfoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, ".");
        }
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            match value {
                InfoValue::Flag => write!(f, "{}", key)?,
                InfoValue::Value(v) => write!(f, "{}={}", key, v)?,
            }
        }
        Ok(())
    }
}

/// FORMAT keys and the per-sample values aligned with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatColumns {
    keys: Vec<String>,
    samples: Vec<Vec<String>>,
}

impl FormatColumns {
    pub fn parse(format: &str, samples: &[&str]) -> Self {
        Self {
            keys: format.split(':').map(str::to_string).collect(),
            samples: samples
                .iter()
                .map(|s| s.split(':').map(str::to_string).collect())
                .collect(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// One value per sample for `key`. Samples with trailing fields dropped yield `"."`.
    pub fn values(&self, key: &str) -> Option<Vec<&str>> {
        let idx = self.keys.iter().position(|k| k == key)?;
        Some(
            self.samples
                .iter()
                .map(|s| s.get(idx).map(String::as_str).unwrap_or("."))
                .collect(),
        )
    }

    /// Value of `key` for the first sample, treating `.` as missing.
    pub fn first_sample(&self, key: &str) -> Option<&str> {
        let idx = self.keys.iter().position(|k| k == key)?;
        let value = self.samples.first()?.get(idx)?.as_str();
        if value == "." || value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    pub(crate) fn write_columns(&self, out: &mut String) {
        out.push_str(&self.keys.join(":"));
        for sample in &self.samples {
            out.push('\t');
            out.push_str(&sample.join(":"));
        }
    }
}

/// One parsed variant line.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    key: VariantKey,
    pub id: Option<String>,
    pub qual: Option<String>,
    pub filter: Option<String>,
    pub info: InfoField,
    pub format: Option<FormatColumns>,
}

impl VariantRecord {
    pub fn new(key: VariantKey) -> Self {
        Self {
            key,
            id: None,
            qual: None,
            filter: None,
            info: InfoField::new(),
            format: None,
        }
    }

    pub fn key(&self) -> &VariantKey {
        &self.key
    }

    pub fn chrom(&self) -> &str {
        &self.key.chrom
    }

    pub fn pos(&self) -> u64 {
        self.key.pos
    }

    pub fn reference(&self) -> &str {
        &self.key.ref_allele
    }

    pub fn alt(&self) -> &str {
        &self.key.alt
    }

    pub fn is_snv(&self) -> bool {
        is_snv(self.reference(), self.alt())
    }

    pub fn is_biallelic(&self) -> bool {
        is_biallelic(self.alt())
    }

    pub fn annotations(&self) -> Vec<AnnotationEntry> {
        decode_annotations(&self.info)
    }

    pub fn keyed_annotations(&self) -> Vec<KeyedAnnotation> {
        self.annotations()
            .into_iter()
            .map(|entry| KeyedAnnotation {
                key: self.key.clone(),
                entry,
            })
            .collect()
    }

    /// Serialize back to a tab-separated line without the trailing newline.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(128);
        line.push_str(&self.key.chrom);
        line.push('\t');
        line.push_str(&self.key.pos.to_string());
        line.push('\t');
        line.push_str(self.id.as_deref().unwrap_or("."));
        line.push('\t');
        line.push_str(&self.key.ref_allele);
        line.push('\t');
        line.push_str(&self.key.alt);
        line.push('\t');
        line.push_str(self.qual.as_deref().unwrap_or("."));
        line.push('\t');
        line.push_str(self.filter.as_deref().unwrap_or("."));
        line.push('\t');
        line.push_str(&self.info.to_string());
        if let Some(format) = &self.format {
            line.push('\t');
            format.write_columns(&mut line);
        }
        line
    }
}

/// Ordinal severity of a functional consequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Impact {
    High,
    Moderate,
    Low,
    Modifier,
    /// Anything the annotator emitted that is not one of the four levels.
    Other(String),
}

impl Impact {
    /// HIGH=3, MODERATE=2, LOW=1, MODIFIER=0, anything else -1.
    pub fn rank(&self) -> i8 {
        match self {
            Impact::High => 3,
            Impact::Moderate => 2,
            Impact::Low => 1,
            Impact::Modifier => 0,
            Impact::Other(_) => -1,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Impact::High => "HIGH",
            Impact::Moderate => "MODERATE",
            Impact::Low => "LOW",
            Impact::Modifier => "MODIFIER",
            Impact::Other(raw) => raw.as_str(),
        }
    }
}

impl From<&str> for Impact {
    fn from(s: &str) -> Self {
        match s {
            "HIGH" => Impact::High,
            "MODERATE" => Impact::Moderate,
            "LOW" => Impact::Low,
            "MODIFIER" => Impact::Modifier,
            other => Impact::Other(other.to_string()),
        }
    }
}

impl FromStr for Impact {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Impact::from(s))
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Impact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One transcript-level call from the ANN field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationEntry {
    pub allele: Option<String>,
    pub consequence: Option<String>,
    pub impact: Option<Impact>,
    pub gene_name: Option<String>,
    pub gene_id: Option<String>,
    pub feature_type: Option<String>,
    pub feature_id: Option<String>,
    pub transcript_biotype: Option<String>,
    pub rank: Option<String>,
    pub hgvs_c: Option<String>,
    pub hgvs_p: Option<String>,
    pub cdna_pos_len: Option<String>,
    pub cds_pos_len: Option<String>,
    pub aa_pos_len: Option<String>,
    pub distance: Option<String>,
    pub errors: Option<String>,
}

impl AnnotationEntry {
    /// Rank of the impact, -1 when the impact is missing or unrecognized.
    pub fn impact_rank(&self) -> i8 {
        self.impact.as_ref().map(Impact::rank).unwrap_or(-1)
    }

    pub fn is_protein_coding(&self) -> bool {
        self.transcript_biotype.as_deref() == Some("protein_coding")
    }

    pub fn field(&self, field: AnnotationField) -> Option<&str> {
        match field {
            AnnotationField::Allele => self.allele.as_deref(),
            AnnotationField::Consequence => self.consequence.as_deref(),
            AnnotationField::Impact => self.impact.as_ref().map(Impact::as_str),
            AnnotationField::GeneName => self.gene_name.as_deref(),
            AnnotationField::GeneId => self.gene_id.as_deref(),
            AnnotationField::FeatureType => self.feature_type.as_deref(),
            AnnotationField::FeatureId => self.feature_id.as_deref(),
            AnnotationField::TranscriptBiotype => self.transcript_biotype.as_deref(),
            AnnotationField::Rank => self.rank.as_deref(),
            AnnotationField::HgvsC => self.hgvs_c.as_deref(),
            AnnotationField::HgvsP => self.hgvs_p.as_deref(),
            AnnotationField::CdnaPosLen => self.cdna_pos_len.as_deref(),
            AnnotationField::CdsPosLen => self.cds_pos_len.as_deref(),
            AnnotationField::AaPosLen => self.aa_pos_len.as_deref(),
            AnnotationField::Distance => self.distance.as_deref(),
            AnnotationField::Errors => self.errors.as_deref(),
        }
    }
}

/// Names of the ANN subfields, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationField {
    Allele,
    Consequence,
    Impact,
    GeneName,
    GeneId,
    FeatureType,
    FeatureId,
    TranscriptBiotype,
    Rank,
    HgvsC,
    HgvsP,
    CdnaPosLen,
    CdsPosLen,
    AaPosLen,
    Distance,
    Errors,
}

/// An annotation entry together with the identity of the variant it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyedAnnotation {
    pub key: VariantKey,
    #[serde(flatten)]
    pub entry: AnnotationEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_key_display_and_parse() {
        let key = VariantKey::new("chrI", 100, "A", "T");
        assert_eq!(key.to_string(), "chrI:100:A:T");
        assert_eq!("chrI:100:A:T".parse::<VariantKey>().unwrap(), key);
        assert!("chrI:abc:A:T".parse::<VariantKey>().is_err());
        assert!("chrI:100:A".parse::<VariantKey>().is_err());
    }

    #[test]
    fn test_snv_and_biallelic_predicates() {
        assert!(is_snv("A", "T"));
        assert!(!is_snv("A", "A"));
        assert!(!is_snv("AT", "A"));
        assert!(is_biallelic("T"));
        assert!(!is_biallelic("T,G"));
    }

    #[test]
    fn test_info_field_round_trip_preserves_order() {
        let raw = "DP=20;DB;MQ=60;ANN=T|x";
        let info = InfoField::parse(raw);
        assert_eq!(info.len(), 4);
        assert_eq!(info.value("DP"), Some("20"));
        assert_eq!(info.get("DB"), Some(&InfoValue::Flag));
        assert_eq!(info.value("DB"), None);
        assert_eq!(info.to_string(), raw);
    }

    #[test]
    fn test_info_field_missing_column() {
        let info = InfoField::parse(".");
        assert!(info.is_empty());
        assert_eq!(info.to_string(), ".");
    }

    #[test]
    fn test_info_set_replaces_instead_of_appending() {
        let mut info = InfoField::parse("DP=20;FREQ=NOVEL;MQ=60");
        info.set("FREQ", "SEEN");
        info.set("FREQ", "SEEN");
        assert_eq!(info.to_string(), "DP=20;FREQ=SEEN;MQ=60");
        assert_eq!(info.occurrences("FREQ"), 1);
    }

    #[test]
    fn test_info_set_collapses_existing_duplicates() {
        let mut info = InfoField::parse("FREQ=NOVEL;DP=3;FREQ=SEEN");
        info.set("FREQ", "NOVEL");
        assert_eq!(info.to_string(), "FREQ=NOVEL;DP=3");
    }

    #[test]
    fn test_format_columns_first_sample() {
        let format = FormatColumns::parse("GT:DP:AD", &["0/1:25:10,15", "0/0:."]);
        assert_eq!(format.sample_count(), 2);
        assert_eq!(format.first_sample("DP"), Some("25"));
        assert_eq!(format.first_sample("GQ"), None);
        assert_eq!(format.values("DP"), Some(vec!["25", "."]));
        assert_eq!(format.values("AD"), Some(vec!["10,15", "."]));
    }

    #[test]
    fn test_impact_ranking() {
        assert_eq!("HIGH".parse::<Impact>().unwrap().rank(), 3);
        assert_eq!("MODIFIER".parse::<Impact>().unwrap().rank(), 0);
        let odd: Impact = "SEVERE".parse().unwrap();
        assert_eq!(odd, Impact::Other("SEVERE".to_string()));
        assert_eq!(odd.rank(), -1);
        assert_eq!(odd.to_string(), "SEVERE");
        assert_eq!(AnnotationEntry::default().impact_rank(), -1);
    }
}
