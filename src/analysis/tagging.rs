//! Population-frequency and phenotype-association tags written into INFO.
//!
//! Tags are set with get-or-replace semantics, so re-tagging an already tagged
//! record leaves exactly one occurrence of each key.

use hashbrown::HashSet;
use std::fmt;

use crate::parsers::tables::{GeneNameMap, KnownVariants, PhenotypeGenes};
use crate::types::{AnnotationEntry, VariantRecord};

pub const FREQ_KEY: &str = "FREQ";
pub const PHENO_KEY: &str = "PHENO_HIT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyTag {
    Seen,
    Novel,
}

impl fmt::Display for FrequencyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrequencyTag::Seen => write!(f, "SEEN"),
            FrequencyTag::Novel => write!(f, "NOVEL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhenotypeTag {
    Yes,
    No,
}

impl fmt::Display for PhenotypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhenotypeTag::Yes => write!(f, "YES"),
            PhenotypeTag::No => write!(f, "NO"),
        }
    }
}

/// Something that writes one INFO tag onto a record.
pub trait Tagger: Sync {
    fn key(&self) -> &'static str;

    fn value(&self, record: &VariantRecord) -> String;

    fn tag(&self, record: &mut VariantRecord) {
        let value = self.value(record);
        record.info.set(self.key(), value);
    }
}

/// Marks variants present in a reference population set.
pub struct FrequencyTagger<'a> {
    known: &'a KnownVariants,
}

impl<'a> FrequencyTagger<'a> {
    pub fn new(known: &'a KnownVariants) -> Self {
        Self { known }
    }

    pub fn classify(&self, record: &VariantRecord) -> FrequencyTag {
        if self.known.contains(record.key()) {
            FrequencyTag::Seen
        } else {
            FrequencyTag::Novel
        }
    }
}

impl Tagger for FrequencyTagger<'_> {
    fn key(&self) -> &'static str {
        FREQ_KEY
    }

    fn value(&self, record: &VariantRecord) -> String {
        self.classify(record).to_string()
    }
}

/// Marks variants whose annotated genes include a phenotype-associated gene.
pub struct PhenotypeTagger<'a> {
    genes: &'a PhenotypeGenes,
    names: &'a GeneNameMap,
}

impl<'a> PhenotypeTagger<'a> {
    pub fn new(genes: &'a PhenotypeGenes, names: &'a GeneNameMap) -> Self {
        Self { genes, names }
    }

    /// Standard names of every annotated gene the name map can resolve.
    pub fn resolved_genes(&self, annotations: &[AnnotationEntry]) -> HashSet<&'a str> {
        let names: &'a GeneNameMap = self.names;
        annotations
            .iter()
            .filter_map(|a| a.gene_id.as_deref().or(a.gene_name.as_deref()))
            .filter_map(|id| names.resolve(id))
            .collect()
    }

    pub fn classify(&self, record: &VariantRecord) -> PhenotypeTag {
        let annotations = record.annotations();
        if self
            .resolved_genes(&annotations)
            .into_iter()
            .any(|g| self.genes.contains(g))
        {
            PhenotypeTag::Yes
        } else {
            PhenotypeTag::No
        }
    }
}

impl Tagger for PhenotypeTagger<'_> {
    fn key(&self) -> &'static str {
        PHENO_KEY
    }

    fn value(&self, record: &VariantRecord) -> String {
        self.classify(record).to_string()
    }
}
