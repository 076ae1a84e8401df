//! Decoding of the functional annotation (`ANN`) INFO field.
//!
//! Each comma-separated entry holds 16 pipe-delimited positions:
//!
//! ```text
//! Allele | Annotation | Impact | Gene_Name | Gene_ID | Feature_Type | Feature_ID |
//! Transcript_BioType | Rank | HGVS.c | HGVS.p | cDNA.pos/len | CDS.pos/len |
//! AA.pos/len | Distance | Errors/Warnings/Info
//! ```
//!
//! Entries shorter than the schema are padded with `None`; extra positions are ignored.

use crate::types::{AnnotationEntry, Impact, InfoField, ANN_KEY};

/// Number of positions in one annotation entry.
pub const ANN_FIELD_COUNT: usize = 16;

/// Decode all annotation entries of a record's INFO field.
///
/// A record without `ANN` has no annotations; that is not an error.
pub fn decode_annotations(info: &InfoField) -> Vec<AnnotationEntry> {
    match info.value(ANN_KEY) {
        Some(raw) if !raw.is_empty() => raw.split(',').map(decode_entry).collect(),
        _ => Vec::new(),
    }
}

/// Decode a single pipe-delimited entry.
pub fn decode_entry(raw: &str) -> AnnotationEntry {
    let mut parts = raw.split('|');
    let mut fields: [Option<String>; ANN_FIELD_COUNT] = Default::default();

    for slot in fields.iter_mut() {
        *slot = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    let [allele, consequence, impact, gene_name, gene_id, feature_type, feature_id, transcript_biotype, rank, hgvs_c, hgvs_p, cdna_pos_len, cds_pos_len, aa_pos_len, distance, errors] =
        fields;

    AnnotationEntry {
        allele,
        consequence,
        impact: impact.as_deref().map(Impact::from),
        gene_name,
        gene_id,
        feature_type,
        feature_id,
        transcript_biotype,
        rank,
        hgvs_c,
        hgvs_p,
        cdna_pos_len,
        cds_pos_len,
        aa_pos_len,
        distance,
        errors,
    }
}
