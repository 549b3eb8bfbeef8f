//! Records, totals, recategorize and reparse commands - query and refresh the store.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Args;
use console::style;

use kassa_core::parser::rules::format_euro;
use kassa_core::store::CategoryTotal;
use kassa_core::{PurchaseRecord, RecordQuery};

use super::{emit, find_document, load_categorizer, load_config, open_store, OutputFormat};

/// Arguments for the records command.
#[derive(Args)]
pub struct RecordsArgs {
    /// First purchase date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last purchase date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Only this category
    #[arg(long)]
    category: Option<String>,

    /// Only records of this document (content hash or prefix)
    #[arg(long)]
    document: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

/// Arguments for the totals command.
#[derive(Args)]
pub struct TotalsArgs {
    /// First purchase date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last purchase date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn run(args: RecordsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let document = match &args.document {
        Some(prefix) => Some(find_document(&store, prefix)?),
        None => None,
    };
    let records = store.records(&RecordQuery {
        from: args.from,
        to: args.to,
        category: args.category.clone(),
        document,
    })?;

    let content = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&records)? + "\n",
        OutputFormat::Csv => records_csv(&records)?,
        OutputFormat::Text => records_text(&records),
    };
    emit(args.output.as_deref(), &content)
}

pub async fn totals(args: TotalsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let totals = store.category_totals(args.from, args.to)?;

    let content = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&totals)? + "\n",
        OutputFormat::Csv => totals_csv(&totals)?,
        OutputFormat::Text => totals_text(&totals),
    };
    emit(args.output.as_deref(), &content)
}

pub async fn recategorize(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let categorizer = load_categorizer(&config)?;

    let changed = store.recategorize(&categorizer)?;
    println!(
        "{} Recategorized {} of {} records (rules version {})",
        style("✓").green(),
        changed,
        store.record_count()?,
        categorizer.version()
    );
    Ok(())
}

pub async fn reparse(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let categorizer = load_categorizer(&config)?;

    let summary = store.reparse(&categorizer, config.import.tolerance)?;
    println!(
        "{} Reparsed {} documents ({} records, {} warnings)",
        style("✓").green(),
        summary.documents,
        summary.records,
        summary.warnings
    );
    for skipped in &summary.skipped {
        println!(
            "  {} {} kept as stored: {}",
            style("⚠").yellow(),
            skipped.hash.short(),
            skipped.reason
        );
    }
    Ok(())
}

pub fn records_csv(records: &[PurchaseRecord]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "purchase_date",
        "product",
        "quantity",
        "unit",
        "unit_price",
        "total",
        "category",
        "subcategory",
        "line_kind",
        "vat_rate",
        "document",
        "line",
    ])?;

    for record in records {
        wtr.write_record([
            record.purchase_date.to_string().as_str(),
            &record.product,
            &record.quantity.to_string(),
            record.unit.as_str(),
            &record.unit_price.to_string(),
            &record.total.to_string(),
            record.category.as_str(),
            record.subcategory.as_deref().unwrap_or(""),
            record.line_kind.as_str(),
            record.vat_rate.map(|v| v.display()).unwrap_or(""),
            record.document.short(),
            &record.line_number.to_string(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn records_text(records: &[PurchaseRecord]) -> String {
    let mut output = String::new();

    for record in records {
        output.push_str(&format!(
            "{}  {:<36} {:>7} {:>11}  {}\n",
            record.purchase_date,
            record.product,
            record.quantity.normalize(),
            format_euro(record.total),
            record.category
        ));
    }

    let sum: rust_decimal::Decimal = records.iter().map(|r| r.total).sum();
    output.push_str(&format!("\n{} records, {}\n", records.len(), format_euro(sum)));
    output
}

fn totals_csv(totals: &[CategoryTotal]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["category", "records", "total"])?;

    for total in totals {
        wtr.write_record([
            total.category.as_str(),
            &total.records.to_string(),
            &total.total.to_string(),
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn totals_text(totals: &[CategoryTotal]) -> String {
    let mut output = String::new();

    for total in totals {
        output.push_str(&format!(
            "{:<20} {:>5} {:>12}\n",
            total.category.as_str(),
            total.records,
            format_euro(total.total)
        ));
    }

    let sum: rust_decimal::Decimal = totals.iter().map(|t| t.total).sum();
    output.push_str(&format!("{:<20} {:>5} {:>12}\n", "Total", "", format_euro(sum)));
    output
}

/// Arguments for the documents command.
#[derive(Args)]
pub struct DocumentsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn documents(args: DocumentsArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let documents = store.documents()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&documents)?),
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record([
                "content_hash",
                "kind",
                "document_number",
                "purchase_date",
                "total",
                "records",
                "path",
            ])?;
            for document in &documents {
                wtr.write_record([
                    document.hash.as_str(),
                    document.kind.as_str(),
                    document.header.document_number.as_deref().unwrap_or(""),
                    &document
                        .header
                        .purchase_date
                        .map(|d| d.to_string())
                        .unwrap_or_default(),
                    &document
                        .header
                        .total
                        .map(|t| t.to_string())
                        .unwrap_or_default(),
                    &document.record_count.to_string(),
                    &document.path,
                ])?;
            }
            wtr.flush()?;
        }
        OutputFormat::Text => {
            for document in &documents {
                println!(
                    "{}  {:<8} {}  {:>3} records  {:>11}  {}",
                    style(document.hash.short()).dim(),
                    document.kind.as_str(),
                    document
                        .header
                        .purchase_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "----------".to_string()),
                    document.record_count,
                    document.header.total.map(format_euro).unwrap_or_default(),
                    document.path
                );
            }
        }
    }
    Ok(())
}
