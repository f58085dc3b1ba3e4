use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use xenergy_cleaner::app::CleanUseCase;
use xenergy_cleaner::infra::FsExportSink;
use xenergy_cleaner::logging;
use xenergy_cleaner::pipeline::export::RowFilter;
use xenergy_cleaner::pipeline::ingestion::InputFile;
use xenergy_cleaner::pipeline::processing::matching::ReferenceVocabulary;
use xenergy_cleaner::{CancelToken, PageRegistry, PipelineConfig};

#[derive(Parser)]
#[command(name = "xenergy_cleaner")]
#[command(about = "Clean, match and validate drilling and blasting exports")]
#[command(version = "0.1.0")]
struct Cli {
    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PageSelector {
    /// Built-in or registered page id (e.g. dgm_qaqc)
    #[arg(long)]
    page: Option<String>,
    /// Path to a page configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available pages
    Pages,
    /// Validate a page configuration without running it
    Check {
        #[command(flatten)]
        selector: PageSelector,
        /// Vocabulary file that will be supplied at run time
        #[arg(long)]
        vocabulary: Option<PathBuf>,
    },
    /// Clean one or more input files with a page
    Run {
        #[command(flatten)]
        selector: PageSelector,
        /// Input files (CSV, TXT, XLSX, ...); several are merged
        #[arg(short, long = "input", required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Extra name/code sheet for matching
        #[arg(long)]
        vocabulary: Option<PathBuf>,
        /// Output format (csv, xlsx or txt); overrides the page
        #[arg(long)]
        format: Option<String>,
        /// Directory the export is written to
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
        /// Columns to export, in order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
        /// Leave rejected rows out of the export
        #[arg(long)]
        exclude_rejected: bool,
    },
}

fn load_config(selector: &PageSelector) -> Result<PipelineConfig> {
    match (&selector.page, &selector.config) {
        (_, Some(path)) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load page configuration {}", path.display())),
        (Some(page), None) => PageRegistry::from_env()
            .context("failed to read page directory")?
            .load(page)
            .with_context(|| format!("failed to load page {page}")),
        (None, None) => anyhow::bail!("either --page or --config is required"),
    }
}

fn load_vocabulary(path: &Path) -> Result<Arc<ReferenceVocabulary>> {
    let vocabulary = ReferenceVocabulary::load(path)
        .with_context(|| format!("failed to load vocabulary {}", path.display()))?;
    Ok(Arc::new(vocabulary))
}

fn list_pages() -> Result<()> {
    let registry = PageRegistry::from_env().context("failed to read page directory")?;
    println!("📚 Available pages:");
    for id in registry.list() {
        match registry.load(id) {
            Ok(config) => println!("   {:<12} {}", id, config.display_title()),
            Err(e) => println!("   {:<12} ⚠️  {}", id, e),
        }
    }
    Ok(())
}

fn check_page(selector: &PageSelector, vocabulary: Option<&Path>) -> Result<()> {
    let config = load_config(selector)?;
    if let Some(path) = vocabulary {
        load_vocabulary(path)?;
    }
    let problems = config.check(vocabulary.is_some());
    if problems.is_empty() {
        println!("✅ Page {} is valid", config.page);
        return Ok(());
    }
    println!("❌ Page {} has {} problem(s):", config.page, problems.len());
    for (stage, problem) in &problems {
        println!("   - [{}] {}", stage, problem);
    }
    anyhow::bail!("page {} is invalid", config.page)
}

#[allow(clippy::too_many_arguments)]
async fn run_page(
    selector: &PageSelector,
    inputs: &[PathBuf],
    vocabulary: Option<&Path>,
    format: Option<String>,
    output_dir: PathBuf,
    report: Option<PathBuf>,
    columns: Option<Vec<String>>,
    exclude_rejected: bool,
) -> Result<()> {
    let mut config = load_config(selector)?;
    if let Some(format) = format {
        config.export.format = format;
    }
    if let Some(columns) = columns {
        config.export.columns = columns;
    }
    if exclude_rejected {
        config.export.rows = RowFilter::ExcludeRejected;
    }

    let files = inputs
        .iter()
        .map(|path| {
            InputFile::from_path(path)
                .with_context(|| format!("failed to read input {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sink = FsExportSink::new(output_dir);
    if let Some(path) = &report {
        sink = sink.with_report_path(path.clone());
    }
    let mut use_case = CleanUseCase::new(Arc::new(config), Box::new(sink));
    if let Some(path) = vocabulary {
        use_case = use_case.with_vocabulary(load_vocabulary(path)?);
    }
    if report.is_some() {
        use_case = use_case.with_report();
    }

    let cancel = CancelToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling run");
            watcher.cancel();
        }
    });

    let outcome = use_case.run(files, cancel).await?;
    let report = &outcome.output.report;

    println!("\n📊 Run {} ({})", report.run_id, report.page);
    println!("   Rows in: {} x {} columns", report.rows_in, report.columns_in);
    for summary in &report.matching {
        println!(
            "   Matched {}: {} accepted, {} review, {} empty",
            summary.column, summary.accepted, summary.review, summary.empty
        );
        for (name, code) in &summary.new_codes {
            println!("      🆕 {} → {}", name, code);
        }
    }
    println!(
        "   Validation: {} clean, {} flagged, {} rejected",
        report.validation.clean, report.validation.flagged, report.validation.rejected
    );
    for note in report.warnings() {
        println!("   ⚠️  [{}] {}", note.stage, note.message);
    }
    println!(
        "   Rows out: {} x {} columns",
        report.rows_out, report.columns_out
    );
    println!("   Output file: {}", outcome.export_path.display());
    for path in &outcome.extra_paths {
        println!("   Also written: {}", path.display());
    }
    if let Some(path) = &outcome.report_path {
        println!("   Report: {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(!cli.no_log_file);

    match cli.command {
        Commands::Pages => list_pages(),
        Commands::Check {
            selector,
            vocabulary,
        } => check_page(&selector, vocabulary.as_deref()),
        Commands::Run {
            selector,
            inputs,
            vocabulary,
            format,
            output_dir,
            report,
            columns,
            exclude_rejected,
        } => {
            info!("Starting run with {} input file(s)", inputs.len());
            run_page(
                &selector,
                &inputs,
                vocabulary.as_deref(),
                format,
                output_dir,
                report,
                columns,
                exclude_rejected,
            )
            .await
        }
    }
}
