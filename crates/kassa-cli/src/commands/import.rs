//! Import command - discover and store new documents.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use kassa_core::import::{FileOutcome, ImportOrchestrator, Summary};

use super::{load_categorizer, load_config, open_store};

/// Arguments for the import command.
#[derive(Args)]
pub struct ImportArgs {
    /// Invoice directory (overrides the config)
    #[arg(long)]
    invoices: Option<PathBuf>,

    /// Receipt directory (overrides the config)
    #[arg(long)]
    receipts: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Batch deadline in seconds (0 = none)
    #[arg(long)]
    timeout: Option<u64>,

    /// Write a per-file summary CSV
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,

    /// List every warning
    #[arg(long)]
    show_warnings: bool,
}

pub async fn run(args: ImportArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut config = load_config(config_path)?;

    if let Some(jobs) = args.jobs {
        config.import.workers = jobs.max(1);
    }
    if let Some(timeout) = args.timeout {
        config.import.batch_timeout_secs = timeout;
    }
    let invoice_dir = args.invoices.unwrap_or_else(|| config.paths.invoice_dir.clone());
    let receipt_dir = args.receipts.unwrap_or_else(|| config.paths.receipt_dir.clone());

    let store = open_store(&config)?;
    let categorizer = load_categorizer(&config)?;
    let orchestrator = ImportOrchestrator::new(store, categorizer, config.import.clone());

    let discovery = ImportOrchestrator::discover(&invoice_dir, &receipt_dir);
    for dir in &discovery.missing_directories {
        eprintln!(
            "{} Directory not found: {}",
            style("⚠").yellow(),
            dir.display()
        );
    }

    if !args.json {
        println!(
            "{} Found {} files to import",
            style("ℹ").blue(),
            discovery.files.len()
        );
    }

    let pb = if args.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(discovery.files.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let summary = orchestrator
        .import(discovery, |report| {
            pb.set_message(report.file_name());
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
        if !args.json {
            println!(
                "{} Summary written to {}",
                style("✓").green(),
                path.display()
            );
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&summary, args.show_warnings);
    println!("   Finished in {:?}", start.elapsed());
    Ok(())
}

fn print_summary(summary: &Summary, show_warnings: bool) {
    println!();
    println!(
        "{} Imported {} files ({} records)",
        style("✓").green(),
        summary.imported,
        summary.records
    );
    println!(
        "   {} skipped (already imported), {} failed, {} warnings",
        style(summary.skipped_duplicate).yellow(),
        style(summary.failed).red(),
        summary.warning_count()
    );

    let failed: Vec<_> = summary
        .files
        .iter()
        .filter_map(|f| match &f.outcome {
            FileOutcome::Failed { stage, error } => Some((f, stage, error)),
            _ => None,
        })
        .collect();
    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for (report, stage, error) in failed {
            println!("  - {} ({}): {}", report.path.display(), stage, error);
        }
    }

    if show_warnings && summary.warning_count() > 0 {
        println!();
        println!("{}", style("Warnings:").yellow());
        for report in summary.files.iter().filter(|f| !f.warnings.is_empty()) {
            println!("  {}", report.file_name());
            for warning in &report.warnings {
                println!("    - {}", warning);
            }
        }
    }
}

fn write_summary(path: &Path, summary: &Summary) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "kind",
        "status",
        "records",
        "purchase_date",
        "warnings",
        "content_hash",
        "processing_time_ms",
        "error",
    ])?;

    for report in &summary.files {
        let (status, records, error) = match &report.outcome {
            FileOutcome::Imported { records } => ("imported", records.to_string(), String::new()),
            FileOutcome::Duplicate => ("duplicate", String::new(), String::new()),
            FileOutcome::Failed { stage, error } => {
                ("failed", String::new(), format!("{}: {}", stage, error))
            }
        };

        wtr.write_record([
            report.file_name().as_str(),
            report.kind.as_str(),
            status,
            &records,
            &report
                .purchase_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            &report.warnings.len().to_string(),
            report.hash.as_ref().map(|h| h.as_str()).unwrap_or(""),
            &report.elapsed_ms.to_string(),
            &error,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
