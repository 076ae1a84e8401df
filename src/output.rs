use anyhow::{Context, Result};
use chrono::Local;
use csv::{Writer, WriterBuilder};
use serde_json::to_string_pretty;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::qc::{DistributionSummary, QcReport};
use crate::analysis::{AnalysisResults, SiftScore};
use crate::types::KeyedAnnotation;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Csv,
    Json,
    Tsv,
    All,
}

/// Writes timestamped summary reports into one directory.
pub struct ReportGenerator {
    output_dir: PathBuf,
    timestamp: String,
}

impl ReportGenerator {
    pub fn new(output_dir: &Path) -> Result<Self> {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).with_context(|| {
                format!("Failed to create output directory {}", output_dir.display())
            })?;
        }

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            timestamp: Local::now().format("%Y-%m-%d_%H-%M-%S").to_string(),
        })
    }

    /// Generate reports in the requested format(s); returns the files written.
    pub fn generate(&self, results: &AnalysisResults, format: ReportFormat) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        match format {
            ReportFormat::Json => written.push(self.generate_json_report(results)?),
            ReportFormat::Csv => written.extend(self.generate_tables(results, b',', "csv")?),
            ReportFormat::Tsv => written.extend(self.generate_tables(results, b'\t', "tsv")?),
            ReportFormat::All => {
                written.push(self.generate_json_report(results)?);
                written.extend(self.generate_tables(results, b',', "csv")?);
                written.extend(self.generate_tables(results, b'\t', "tsv")?);
            }
        }

        for path in &written {
            info!("Wrote report {}", path.display());
        }
        Ok(written)
    }

    fn report_path(&self, name: &str, ext: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.{}", name, self.timestamp, ext))
    }

    fn generate_json_report(&self, results: &AnalysisResults) -> Result<PathBuf> {
        let filename = self.report_path("report", "json");
        let json_content =
            to_string_pretty(results).with_context(|| "Failed to serialize results to JSON")?;

        fs::write(&filename, json_content)
            .with_context(|| format!("Failed to write JSON report to {}", filename.display()))?;

        Ok(filename)
    }

    fn generate_tables(
        &self,
        results: &AnalysisResults,
        delimiter: u8,
        ext: &str,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        let counts = count_rows(results);
        if !counts.is_empty() {
            let filename = self.report_path("counts", ext);
            let mut wtr = delimited_writer(&filename, delimiter)?;
            wtr.write_record(["section", "key", "count"])?;
            for (section, key, count) in &counts {
                wtr.write_record([section.as_str(), key.as_str(), count.to_string().as_str()])?;
            }
            wtr.flush()?;
            written.push(filename);
        }

        if let Some(qc) = &results.qc {
            let filename = self.report_path("qc", ext);
            let mut wtr = delimited_writer(&filename, delimiter)?;
            wtr.write_record([
                "set", "stratum", "metric", "count", "min", "max", "mean", "median",
            ])?;
            write_qc_rows(&mut wtr, "raw", &qc.raw)?;
            write_qc_rows(&mut wtr, "reliable", &qc.reliable)?;
            wtr.flush()?;
            written.push(filename);
        }

        Ok(written)
    }
}

fn delimited_writer(path: &Path, delimiter: u8) -> Result<Writer<File>> {
    WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("Failed to create writer for {}", path.display()))
}

/// Flatten every count map of the results into `(section, key, count)` rows.
fn count_rows(results: &AnalysisResults) -> Vec<(String, String, usize)> {
    fn push<K: ToString>(
        rows: &mut Vec<(String, String, usize)>,
        section: &str,
        map: impl IntoIterator<Item = (K, usize)>,
    ) {
        rows.extend(
            map.into_iter()
                .map(|(k, v)| (section.to_string(), k.to_string(), v)),
        );
    }

    let mut rows = Vec::new();

    if let Some(summary) = &results.prioritization {
        push(&mut rows, "consequence", summary.consequence_counts.clone());
        push(&mut rows, "impact", summary.impact_counts.clone());
        push(
            &mut rows,
            "top_gene",
            summary.top_genes.iter().map(|g| (g.gene.clone(), g.count)),
        );
        push(&mut rows, "high_impact_gene", summary.high_impact_genes.clone());
        push(
            &mut rows,
            "protein_effect",
            summary
                .protein_effects
                .iter()
                .map(|(effect, count)| (effect.as_str(), *count)),
        );
        push(&mut rows, "aa_position_bin", summary.position_histogram.clone());
        push(
            &mut rows,
            "variants",
            [
                ("annotations", summary.annotation_count),
                ("collapsed", summary.variant_count),
                ("multi_transcript", summary.multi_transcript_variants),
            ],
        );
    }

    if let Some(reliability) = &results.reliability {
        push(
            &mut rows,
            "reliability",
            [("total", reliability.total), ("reliable", reliability.reliable)],
        );
        push(&mut rows, "primary_reason", reliability.primary_reasons.clone());
        push(&mut rows, "failed_check", reliability.failures.clone());
    }

    if let Some(sift) = &results.sift {
        push(
            &mut rows,
            "sift",
            [
                ("records", sift.records),
                ("scored", sift.scored),
                ("damaging", sift.damaging),
            ],
        );
    }

    for (key, values) in &results.tags {
        push(&mut rows, key, values.clone());
    }

    rows
}

fn write_qc_rows<W: Write>(wtr: &mut Writer<W>, set: &str, report: &QcReport) -> Result<()> {
    let mut strata: BTreeMap<&str, (&Option<DistributionSummary>, &Option<DistributionSummary>)> =
        BTreeMap::new();
    strata.insert("ALL", (&report.depth, &report.allele_balance));
    for (impact, summary) in &report.by_impact {
        strata.insert(impact.as_str(), (&summary.depth, &summary.allele_balance));
    }

    for (stratum, (depth, ab)) in strata {
        for (metric, summary) in [("depth", depth), ("allele_balance", ab)] {
            if let Some(s) = summary {
                wtr.write_record([
                    set,
                    stratum,
                    metric,
                    s.count.to_string().as_str(),
                    format!("{:.4}", s.min).as_str(),
                    format!("{:.4}", s.max).as_str(),
                    format!("{:.4}", s.mean).as_str(),
                    format!("{:.4}", s.median).as_str(),
                ])?;
            }
        }
    }
    Ok(())
}

/// One row per annotation: the variant key followed by the sixteen ANN fields.
pub fn write_annotation_table(path: &Path, annotations: &[KeyedAnnotation]) -> Result<()> {
    let mut wtr = delimited_writer(path, b'\t')?;
    wtr.write_record([
        "chrom",
        "pos",
        "ref",
        "alt",
        "allele",
        "consequence",
        "impact",
        "gene_name",
        "gene_id",
        "feature_type",
        "feature_id",
        "transcript_biotype",
        "rank",
        "hgvs_c",
        "hgvs_p",
        "cdna_pos_len",
        "cds_pos_len",
        "aa_pos_len",
        "distance",
        "errors",
    ])?;

    for ann in annotations {
        let e = &ann.entry;
        let impact = e.impact.as_ref().map(|i| i.as_str()).unwrap_or("");
        wtr.write_record([
            ann.key.chrom.as_str(),
            ann.key.pos.to_string().as_str(),
            ann.key.ref_allele.as_str(),
            ann.key.alt.as_str(),
            e.allele.as_deref().unwrap_or(""),
            e.consequence.as_deref().unwrap_or(""),
            impact,
            e.gene_name.as_deref().unwrap_or(""),
            e.gene_id.as_deref().unwrap_or(""),
            e.feature_type.as_deref().unwrap_or(""),
            e.feature_id.as_deref().unwrap_or(""),
            e.transcript_biotype.as_deref().unwrap_or(""),
            e.rank.as_deref().unwrap_or(""),
            e.hgvs_c.as_deref().unwrap_or(""),
            e.hgvs_p.as_deref().unwrap_or(""),
            e.cdna_pos_len.as_deref().unwrap_or(""),
            e.cds_pos_len.as_deref().unwrap_or(""),
            e.aa_pos_len.as_deref().unwrap_or(""),
            e.distance.as_deref().unwrap_or(""),
            e.errors.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Parsed SIFT4G scores, missing values left empty.
pub fn write_sift_scores(path: &Path, scores: &[SiftScore]) -> Result<()> {
    let mut wtr = delimited_writer(path, b'\t')?;
    wtr.write_record(["chrom", "pos", "ref", "alt", "sift_score", "sift_prediction"])?;

    for s in scores {
        wtr.write_record([
            s.key.chrom.as_str(),
            s.key.pos.to_string().as_str(),
            s.key.ref_allele.as_str(),
            s.key.alt.as_str(),
            s.score.map(|v| v.to_string()).unwrap_or_default().as_str(),
            s.prediction.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Sorted, de-duplicated gene names, one per line.
pub fn write_gene_list<'a, I>(path: &Path, genes: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut genes: Vec<&str> = genes.into_iter().collect();
    genes.sort_unstable();
    genes.dedup();

    let file = File::create(path)
        .with_context(|| format!("Failed to create gene list {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for gene in &genes {
        writeln!(out, "{}", gene)?;
    }
    out.flush()?;
    Ok(genes.len())
}
