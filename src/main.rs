use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use vcf_triage::analysis::prioritize::{self, Prioritizer};
use vcf_triage::analysis::sift::{self, SiftScore, SiftSummary};
use vcf_triage::analysis::tagging::{FrequencyTagger, PhenotypeTagger, Tagger};
use vcf_triage::analysis::{AnalysisResults, FocusMode, QcComparison, ReliabilityClassifier, ReliabilitySummary};
use vcf_triage::config::TriageConfig;
use vcf_triage::output::{self, ReportFormat, ReportGenerator};
use vcf_triage::parsers::tables::{GeneNameMap, KnownVariants, PhenotypeGenes};
use vcf_triage::parsers::vcf::VcfWriter;
use vcf_triage::parsers::{ParseMode, RecordReader, VcfContents, VcfLine};
use vcf_triage::types::{Impact, KeyedAnnotation};

/// Triage of functionally annotated variant calls
#[derive(Parser, Debug)]
#[command(
    name = "vcf-triage",
    version,
    about = "Prioritize, QC and tag functionally annotated variant calls",
    long_about = r#"
Works on VCF records carrying an ANN functional annotation field:
- Collapse transcript-level annotations to the most severe call per variant
- Classify technical reliability from depth, allele balance, FILTER, strand bias and MQ
- Tag variants with population frequency (FREQ) and phenotype association (PHENO_HIT)
- Extract SIFT4G scores and keep predicted damaging variants
- Select biallelic SNVs or missense variants

Inputs may be plain, gzip, bzip2 or xz compressed.
"#
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// TOML file with thresholds; flags given on the command line take precedence
    #[arg(short, long, global = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, global = true, default_value = "0")]
    threads: usize,

    /// Log and skip malformed lines instead of aborting
    #[arg(long, global = true)]
    skip_malformed: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collapse annotations per variant and summarize consequences, genes and protein effects
    Prioritize {
        #[command(flatten)]
        input: InputArgs,

        /// Drop non protein-coding transcripts before collapsing
        #[arg(long)]
        coding_only: bool,

        /// Window size for the amino-acid position histogram
        #[arg(long)]
        bin_size: Option<u64>,

        /// Number of genes in the top-genes table
        #[arg(long)]
        top_n: Option<usize>,

        /// Restrict to these impact levels before collapsing
        #[arg(long, value_delimiter = ',')]
        impact: Vec<String>,

        /// Keep only protein-altering consequences before collapsing
        #[arg(long)]
        protein_altering: bool,

        /// Write the collapsed annotations as TSV
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        collapsed: Option<PathBuf>,

        /// Write genes with HIGH impact variants, one per line
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        gene_list: Option<PathBuf>,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Keep technically reliable records
    Reliability {
        #[command(flatten)]
        input: InputArgs,

        /// Output VCF (.gz for gzip)
        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: PathBuf,

        #[arg(long)]
        min_dp: Option<u32>,

        #[arg(long)]
        min_ab: Option<f64>,

        #[arg(long)]
        min_mq: Option<f64>,

        /// Accepted FILTER values (replaces the configured set)
        #[arg(long = "allow-filter", value_delimiter = ',')]
        allowed_filters: Vec<String>,

        /// Add depth and allele balance distributions for raw and reliable records
        #[arg(long)]
        qc: bool,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Tag records FREQ=SEEN or FREQ=NOVEL against a reference variant set
    Frequency {
        #[command(flatten)]
        input: InputArgs,

        /// Reference population VCF
        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        reference: PathBuf,

        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: PathBuf,
    },
    /// Tag records PHENO_HIT=YES or PHENO_HIT=NO against phenotype-associated genes
    Phenotype {
        #[command(flatten)]
        input: InputArgs,

        /// Phenotype table, standard gene name in the first column
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        phenotypes: PathBuf,

        /// Gene table mapping systematic (column 1) to standard (column 4) names
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        gene_names: PathBuf,

        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: PathBuf,
    },
    /// Extract SIFT4G scores and keep predicted damaging variants
    Sift {
        #[command(flatten)]
        input: InputArgs,

        /// Scores at or above this are tolerated
        #[arg(long)]
        threshold: Option<f64>,

        /// Write all parsed scores as TSV
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        scores: Option<PathBuf>,

        /// Write damaging records as VCF
        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Keep `##SIFT_Threshold:` header lines in the VCF output
        #[arg(long)]
        keep_threshold_header: bool,

        #[command(flatten)]
        report: ReportArgs,
    },
    /// Select biallelic SNVs and/or missense variants
    Focus {
        #[command(flatten)]
        input: InputArgs,

        #[arg(short, long, value_enum, default_value = "biallelic-snv")]
        mode: FocusMode,

        #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: PathBuf,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Annotated input VCF
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Directory for summary reports
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    report_dir: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    format: ReportFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return Ok(());
    }

    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => TriageConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TriageConfig::default(),
    };
    if cli.skip_malformed {
        config.parse_mode = ParseMode::SkipAndLog;
    }

    init_thread_pool(cli.threads)?;
    info!("Using {} threads", rayon::current_num_threads());

    match cli.command {
        Commands::Prioritize {
            input,
            coding_only,
            bin_size,
            top_n,
            impact,
            protein_altering,
            collapsed,
            gene_list,
            report,
        } => {
            config.collapse_coding_only |= coding_only;
            if let Some(bin_size) = bin_size {
                config.bin_size = bin_size;
            }
            if let Some(top_n) = top_n {
                config.top_n = top_n;
            }
            config.validate()?;
            run_prioritize(
                &config,
                &input.input,
                &impact,
                protein_altering,
                collapsed.as_deref(),
                gene_list.as_deref(),
                &report,
            )
        }
        Commands::Reliability {
            input,
            output,
            min_dp,
            min_ab,
            min_mq,
            allowed_filters,
            qc,
            report,
        } => {
            if let Some(v) = min_dp {
                config.min_dp = v;
            }
            if let Some(v) = min_ab {
                config.min_ab = v;
            }
            if let Some(v) = min_mq {
                config.min_mq = v;
            }
            if !allowed_filters.is_empty() {
                config.allowed_filters = allowed_filters.into_iter().collect();
            }
            config.validate()?;
            run_reliability(&config, &input.input, &output, qc, &report)
        }
        Commands::Frequency {
            input,
            reference,
            output,
        } => {
            let known = KnownVariants::from_path(&reference, config.parse_mode)
                .with_context(|| format!("Failed to load reference {}", reference.display()))?;
            run_tagging(&config, &input.input, &output, &FrequencyTagger::new(&known))
        }
        Commands::Phenotype {
            input,
            phenotypes,
            gene_names,
            output,
        } => {
            let genes = PhenotypeGenes::from_path(&phenotypes)
                .with_context(|| format!("Failed to load phenotypes {}", phenotypes.display()))?;
            let names = GeneNameMap::from_path(&gene_names)
                .with_context(|| format!("Failed to load gene names {}", gene_names.display()))?;
            run_tagging(
                &config,
                &input.input,
                &output,
                &PhenotypeTagger::new(&genes, &names),
            )
        }
        Commands::Sift {
            input,
            threshold,
            scores,
            output,
            keep_threshold_header,
            report,
        } => {
            if let Some(t) = threshold {
                config.sift_threshold = t;
            }
            config.validate()?;
            run_sift(
                &config,
                &input.input,
                scores.as_deref(),
                output.as_deref(),
                !keep_threshold_header,
                &report,
            )
        }
        Commands::Focus {
            input,
            mode,
            output,
        } => run_focus(&config, &input.input, &output, mode),
        Commands::Completions { .. } => Ok(()),
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("vcf_triage={}", level))
        .with_writer(io::stderr)
        .init();
}

fn init_thread_pool(threads: usize) -> Result<()> {
    let num_threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow::anyhow!("Failed to initialize thread pool: {}", e))?;

    Ok(())
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message.to_string());
    Ok(pb)
}

fn load_vcf(path: &Path, mode: ParseMode) -> Result<VcfContents> {
    let pb = spinner(&format!("Reading {}...", path.display()))?;
    let contents = VcfContents::from_path(path, mode)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    pb.finish_and_clear();
    info!(
        "Read {} records from {} ({} skipped)",
        contents.records.len(),
        path.display(),
        contents.skipped
    );
    Ok(contents)
}

fn write_vcf<'a, I>(path: &Path, headers: &[String], records: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a vcf_triage::types::VariantRecord>,
{
    let mut writer =
        VcfWriter::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_headers(headers)?;
    for record in records {
        writer.write_record(record)?;
    }
    Ok(writer.finish()?)
}

fn write_reports(results: &AnalysisResults, report: &ReportArgs) -> Result<()> {
    if let Some(dir) = &report.report_dir {
        let generator = ReportGenerator::new(dir)?;
        generator.generate(results, report.format)?;
        println!(
            "{} Reports saved to: {}",
            style("✓").green().bold(),
            style(dir.display()).cyan()
        );
    }
    Ok(())
}

fn done(message: String) {
    println!("{} {}", style("✓").green().bold(), message);
}

fn run_prioritize(
    config: &TriageConfig,
    input: &Path,
    impacts: &[String],
    protein_altering: bool,
    collapsed_out: Option<&Path>,
    gene_list: Option<&Path>,
    report: &ReportArgs,
) -> Result<()> {
    let contents = load_vcf(input, config.parse_mode)?;

    let mut annotations: Vec<KeyedAnnotation> = contents
        .records
        .iter()
        .flat_map(|r| r.keyed_annotations())
        .collect();
    if !impacts.is_empty() {
        let impacts: Vec<Impact> = impacts.iter().map(|i| Impact::from(i.as_str())).collect();
        annotations = prioritize::filter_by_impact(&annotations, &impacts);
    }
    if protein_altering {
        annotations = prioritize::filter_protein_altering(&annotations);
    }

    let prioritizer = Prioritizer::from_config(config);
    let collapsed = prioritizer.collapse(&annotations);
    let summary = prioritizer.summarize(&annotations, &collapsed);

    if let Some(path) = collapsed_out {
        output::write_annotation_table(path, &collapsed)?;
        info!("Wrote {} collapsed annotations to {}", collapsed.len(), path.display());
    }
    if let Some(path) = gene_list {
        let n = output::write_gene_list(path, summary.high_impact_genes.keys().map(String::as_str))?;
        info!("Wrote {} HIGH impact genes to {}", n, path.display());
    }

    done(format!(
        "{} annotations collapsed to {} variants ({} on multiple transcripts)",
        style(summary.annotation_count).cyan(),
        style(summary.variant_count).cyan(),
        summary.multi_transcript_variants
    ));

    let mut results = AnalysisResults::new(
        input.display().to_string(),
        contents.records.len(),
        contents.skipped,
    );
    results.prioritization = Some(summary);
    write_reports(&results, report)
}

fn run_reliability(
    config: &TriageConfig,
    input: &Path,
    output: &Path,
    qc: bool,
    report: &ReportArgs,
) -> Result<()> {
    let contents = load_vcf(input, config.parse_mode)?;
    let classifier = ReliabilityClassifier::from_config(config);

    let verdicts = classifier.classify_all(&contents.records);
    let summary = ReliabilitySummary::from_verdicts(&verdicts);
    let reliable: Vec<_> = contents
        .records
        .iter()
        .zip(&verdicts)
        .filter(|(_, v)| v.reliable)
        .map(|(r, _)| r.clone())
        .collect();

    let written = write_vcf(output, &contents.headers, &reliable)?;
    done(format!(
        "{} of {} records reliable, written to {}",
        style(written).cyan(),
        summary.total,
        style(output.display()).cyan()
    ));

    let mut results = AnalysisResults::new(
        input.display().to_string(),
        contents.records.len(),
        contents.skipped,
    );
    if qc {
        results.qc = Some(QcComparison::new(&contents.records, &reliable));
    }
    results.reliability = Some(summary);
    write_reports(&results, report)
}

/// Stream records through `tagger`, passing headers through unchanged.
fn run_tagging(config: &TriageConfig, input: &Path, output: &Path, tagger: &dyn Tagger) -> Result<()> {
    let pb = spinner(&format!("Tagging {}...", input.display()))?;
    let mut reader = RecordReader::from_path(input, config.parse_mode)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut writer =
        VcfWriter::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut results = AnalysisResults::default();

    for line in reader.by_ref() {
        match line? {
            VcfLine::Header(header) => writer.write_headers(&[header])?,
            VcfLine::Record(mut record) => {
                tagger.tag(&mut record);
                if let Some(value) = record.info.value(tagger.key()) {
                    results.count_tag(tagger.key(), value);
                }
                writer.write_record(&record)?;
                if writer.records_written() % 10_000 == 0 {
                    pb.set_message(format!("Tagged {} records", writer.records_written()));
                }
            }
        }
    }

    let written = writer.finish()?;
    pb.finish_and_clear();
    if reader.skipped() > 0 {
        println!(
            "{} skipped {} malformed lines",
            style("!").yellow().bold(),
            reader.skipped()
        );
    }

    let counts = results
        .tags
        .get(tagger.key())
        .map(|values| {
            values
                .iter()
                .map(|(v, n)| format!("{}={}: {}", tagger.key(), v, n))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    done(format!(
        "Tagged {} records ({}) into {}",
        style(written).cyan(),
        counts,
        style(output.display()).cyan()
    ));
    Ok(())
}

fn run_sift(
    config: &TriageConfig,
    input: &Path,
    scores_out: Option<&Path>,
    output: Option<&Path>,
    strip_threshold_header: bool,
    report: &ReportArgs,
) -> Result<()> {
    let contents = load_vcf(input, config.parse_mode)?;
    let scores: Vec<SiftScore> = sift::parse_sift_scores(&contents.records);
    let damaging = sift::filter_damaging(&scores, config.sift_threshold);

    if let Some(path) = scores_out {
        output::write_sift_scores(path, &scores)?;
        info!("Wrote {} SIFT4G scores to {}", scores.len(), path.display());
    }
    if let Some(path) = output {
        let headers = if strip_threshold_header {
            sift::strip_sift_headers(&contents.headers)
        } else {
            contents.headers.clone()
        };
        let selected = sift::select_scored_records(&contents.records, &damaging);
        write_vcf(path, &headers, &selected)?;
    }

    let summary = SiftSummary::new(&scores, config.sift_threshold);
    done(format!(
        "{} of {} scored variants below {}",
        style(summary.damaging).cyan(),
        summary.scored,
        config.sift_threshold
    ));

    let mut results = AnalysisResults::new(
        input.display().to_string(),
        contents.records.len(),
        contents.skipped,
    );
    results.sift = Some(summary);
    write_reports(&results, report)
}

fn run_focus(config: &TriageConfig, input: &Path, output: &Path, mode: FocusMode) -> Result<()> {
    let pb = spinner(&format!("Selecting from {}...", input.display()))?;
    let mut reader = RecordReader::from_path(input, config.parse_mode)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let mut writer =
        VcfWriter::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut seen = 0usize;

    for line in reader.by_ref() {
        match line? {
            VcfLine::Header(header) => writer.write_headers(&[header])?,
            VcfLine::Record(record) => {
                seen += 1;
                if mode.matches(&record) {
                    writer.write_record(&record)?;
                }
            }
        }
    }

    let written = writer.finish()?;
    pb.finish_and_clear();
    done(format!(
        "Kept {} of {} records ({:?}) in {}",
        style(written).cyan(),
        seen,
        mode,
        style(output.display()).cyan()
    ));
    Ok(())
}
