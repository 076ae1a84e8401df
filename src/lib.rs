//! # VCF Triage
//!
//! Prioritization, technical QC and evidence tagging for variant calls carrying an
//! `ANN` functional annotation field.
//!
//! ## Features
//!
//! - Typed record model with lossless re-serialization of untouched lines
//! - Collapse of transcript-level annotations to the most severe call per variant
//! - Reliability classification from depth, allele balance, FILTER, strand bias and MQ
//! - `FREQ` and `PHENO_HIT` tagging against reference variant and gene sets
//! - SIFT4G score extraction, biallelic SNV and missense selection, QC stratification
//! - Transparent reading of gzip, bzip2 and xz compressed inputs
//! - JSON, CSV and TSV summary reports

pub mod analysis;
pub mod config;
pub mod error;
pub mod output;
pub mod parsers;
pub mod types;

// Re-export key types
pub use analysis::{
    FocusMode, FrequencyTagger, PhenotypeTagger, Prioritizer, ReliabilityClassifier, Tagger,
};
pub use config::TriageConfig;
pub use error::{MalformedRecordError, Result, TriageError};
pub use output::{ReportFormat, ReportGenerator};
pub use parsers::{decode_annotations, parse_record, ParseMode, RecordReader, VcfContents};
pub use types::*;
