//! Parse command - extract and categorize a single file without storing it.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use kassa_core::import::ImportWarning;
use kassa_core::parser::rules::format_euro;
use kassa_core::{
    ContentHash, DocumentHeader, DocumentKind, DocumentReader, LayoutParser, PdfExtractor,
    PlainTextReader, PurchaseRecord,
};

use super::{emit, load_categorizer, load_config, OutputFormat};

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Input file
    #[arg(required = true)]
    input: PathBuf,

    /// Document kind (receipt or invoice); guessed from the configured directories if omitted
    #[arg(short, long)]
    kind: Option<DocumentKind>,

    /// Treat the input as a plain text dump instead of a PDF
    #[arg(long)]
    text: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct ParseOutput {
    file: PathBuf,
    kind: DocumentKind,
    hash: ContentHash,
    header: DocumentHeader,
    records: Vec<PurchaseRecord>,
    warnings: Vec<ImportWarning>,
}

pub async fn run(args: ParseArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let kind = args.kind.unwrap_or_else(|| {
        if args.input.starts_with(&config.paths.invoice_dir) {
            DocumentKind::Invoice
        } else {
            DocumentKind::Receipt
        }
    });
    info!("Parsing {} as {}", args.input.display(), kind);

    let data = std::fs::read(&args.input)?;
    let hash = ContentHash::of(&data);
    let extracted = if args.text {
        PlainTextReader.read(&data)?
    } else {
        PdfExtractor::new().read(&data)?
    };

    let parser = LayoutParser::for_kind(kind, config.import.tolerance);
    let parsed = parser.parse(&extracted.lines, &hash)?;

    let categorizer = load_categorizer(&config)?;
    let mut warnings: Vec<ImportWarning> =
        parsed.errors.into_iter().map(ImportWarning::from).collect();
    if let Some(mismatch) = parsed.total_mismatch {
        warnings.push(ImportWarning::TotalMismatch(mismatch));
    }
    let mut records = parsed.records;
    for record in &mut records {
        if let Some(ambiguity) = categorizer.categorize(record) {
            warnings.push(ImportWarning::Ambiguity(ambiguity));
        }
    }

    let output = ParseOutput {
        file: args.input.clone(),
        kind,
        hash,
        header: parsed.header,
        records,
        warnings,
    };

    let content = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&output)? + "\n",
        OutputFormat::Csv => super::records::records_csv(&output.records)?,
        OutputFormat::Text => format_text(&output),
    };
    emit(args.output.as_deref(), &content)?;

    if let Some(path) = &args.output {
        println!(
            "{} Output written to {} in {:?}",
            style("✓").green(),
            path.display(),
            start.elapsed()
        );
    }
    Ok(())
}

fn format_text(output: &ParseOutput) -> String {
    let mut text = String::new();
    let header = &output.header;

    text.push_str(&format!("{} {}\n", output.kind, output.file.display()));
    if let Some(number) = &header.document_number {
        text.push_str(&format!("Number: {}\n", number));
    }
    if let Some(date) = header.purchase_date {
        text.push_str(&format!("Date:   {}\n", date));
    }
    text.push('\n');

    for record in &output.records {
        text.push_str(&format!(
            "{:>3}  {:<36} {:>7} {:>11}  {}{}\n",
            record.line_number,
            record.product,
            record.quantity.normalize(),
            format_euro(record.total),
            record.category,
            record
                .subcategory
                .as_ref()
                .map(|s| format!(" / {}", s))
                .unwrap_or_default()
        ));
    }

    let sum: rust_decimal::Decimal = output.records.iter().map(|r| r.total).sum();
    text.push('\n');
    text.push_str(&format!("Records: {}  Sum: {}\n", output.records.len(), format_euro(sum)));
    if let Some(total) = header.total {
        text.push_str(&format!("Stated total: {}\n", format_euro(total)));
    }

    if !output.warnings.is_empty() {
        text.push_str("\nWarnings:\n");
        for warning in &output.warnings {
            text.push_str(&format!("  - {}\n", warning));
        }
    }
    text
}
