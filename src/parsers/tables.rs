//! Loaders for the read-only reference structures used by the taggers.

use hashbrown::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{MalformedRecordError, Result, TriageError};
use crate::parsers::{decode_line, open_file, read_raw_line, ParseMode};
use crate::types::VariantKey;

/// Columns needed to key a reference variant: CHROM, POS, ID, REF, ALT.
const KEY_COLUMNS: usize = 5;

/// Minimum columns in a gene table row.
const GENE_TABLE_COLUMNS: usize = 4;

/// Identity keys of variants present in a reference population source.
#[derive(Debug, Clone, Default)]
pub struct KnownVariants {
    keys: HashSet<VariantKey>,
}

impl KnownVariants {
    pub fn from_path(path: &Path, mode: ParseMode) -> Result<Self> {
        let known = Self::from_reader(open_file(path)?, mode)?;
        if known.is_empty() {
            warn!(
                "Reference source {} holds no variants; every query will be NOVEL",
                path.display()
            );
        }
        info!(
            "Loaded {} reference variants from {}",
            known.len(),
            path.display()
        );
        Ok(known)
    }

    pub fn from_reader<R: BufRead>(mut reader: R, mode: ParseMode) -> Result<Self> {
        let mut keys = HashSet::new();
        let mut buf = Vec::new();
        let mut line_no = 0;

        while read_raw_line(&mut reader, &mut buf)? {
            line_no += 1;
            let parsed = decode_line(&buf).and_then(|line| {
                if line.starts_with('#') || line.trim().is_empty() {
                    Ok(None)
                } else {
                    key_from_line(line).map(Some)
                }
            });

            match parsed {
                Ok(Some(key)) => {
                    keys.insert(key);
                }
                Ok(None) => {}
                Err(source) => match mode {
                    ParseMode::FailFast => {
                        return Err(TriageError::MalformedRecord {
                            line: line_no,
                            source,
                        })
                    }
                    ParseMode::SkipAndLog => {
                        warn!("Skipping reference line {}: {}", line_no, source)
                    }
                },
            }
        }

        Ok(Self { keys })
    }

    pub fn contains(&self, key: &VariantKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<VariantKey> for KnownVariants {
    fn from_iter<I: IntoIterator<Item = VariantKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

fn key_from_line(line: &str) -> std::result::Result<VariantKey, MalformedRecordError> {
    let parts: Vec<&str> = line
        .trim_end_matches(&['\n', '\r'][..])
        .splitn(KEY_COLUMNS + 1, '\t')
        .collect();
    if parts.len() < KEY_COLUMNS {
        return Err(MalformedRecordError::TooFewColumns {
            expected: KEY_COLUMNS,
            found: parts.len(),
        });
    }
    let pos = parts[1]
        .parse()
        .map_err(|_| MalformedRecordError::InvalidPosition(parts[1].to_string()))?;
    Ok(VariantKey::new(parts[0], pos, parts[3], parts[4]))
}

/// Systematic gene identifier to standard gene name.
#[derive(Debug, Clone, Default)]
pub struct GeneNameMap {
    names: HashMap<String, String>,
}

impl GeneNameMap {
    pub fn from_path(path: &Path) -> Result<Self> {
        let map = Self::from_reader(open_file(path)?)?;
        info!("Loaded {} gene names from {}", map.len(), path.display());
        Ok(map)
    }

    /// Read a tab-separated gene table: column 1 systematic name, column 4 standard name.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut names = HashMap::new();
        for_each_gene_row(reader, |parts| {
            let standard = parts[3].trim();
            if !standard.is_empty() {
                names.insert(parts[0].trim().to_string(), standard.to_string());
            }
        })?;
        Ok(Self { names })
    }

    pub fn resolve(&self, systematic: &str) -> Option<&str> {
        self.names.get(systematic).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GeneNameMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Standard names of genes with a known phenotype association.
#[derive(Debug, Clone, Default)]
pub struct PhenotypeGenes {
    genes: HashSet<String>,
}

impl PhenotypeGenes {
    pub fn from_path(path: &Path) -> Result<Self> {
        let genes = Self::from_reader(open_file(path)?)?;
        if genes.is_empty() {
            warn!("Phenotype source {} holds no genes", path.display());
        }
        info!(
            "Loaded {} phenotype-associated genes from {}",
            genes.len(),
            path.display()
        );
        Ok(genes)
    }

    /// Read a tab-separated phenotype table; the gene name is the first column.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut genes = HashSet::new();
        for_each_gene_row(reader, |parts| {
            let gene = parts[0].trim();
            if !gene.is_empty() {
                genes.insert(gene.to_string());
            }
        })?;
        Ok(Self { genes })
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.genes.contains(gene)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PhenotypeGenes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            genes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Feed each data row of a gene table to `f`. Title rows beginning with `Feature`
/// and blank lines are skipped, as are rows with fewer than four columns.
fn for_each_gene_row<R, F>(mut reader: R, mut f: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&[&str]),
{
    let mut buf = Vec::new();
    let mut line_no = 0;

    while read_raw_line(&mut reader, &mut buf)? {
        line_no += 1;
        let line = match decode_line(&buf) {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping gene table line {}: {}", line_no, e);
                continue;
            }
        };
        if line.starts_with("Feature") || line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < GENE_TABLE_COLUMNS {
            warn!("Skipping malformed gene table line {}: {}", line_no, line.trim());
            continue;
        }
        f(&parts);
    }
    debug!("Finished reading gene table");
    Ok(())
}
