//! Unknown command - products no category rule matched.

use clap::Args;
use console::style;

use super::{load_config, open_store, OutputFormat};

/// Arguments for the unknown command.
#[derive(Args)]
pub struct UnknownArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

pub async fn run(args: UnknownArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let unknown = store.unknown_products()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&unknown)?),
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["product_key", "occurrences", "first_seen"])?;
            for product in &unknown {
                wtr.write_record([
                    product.product_key.as_str(),
                    &product.occurrences.to_string(),
                    &product.first_seen.to_rfc3339(),
                ])?;
            }
            wtr.flush()?;
        }
        OutputFormat::Text => {
            if unknown.is_empty() {
                println!("{} Every stored product has a category.", style("✓").green());
                return Ok(());
            }
            for product in &unknown {
                println!(
                    "{:>4}x  {:<40} first seen {}",
                    product.occurrences,
                    product.product_key,
                    product.first_seen.format("%Y-%m-%d")
                );
            }
            println!();
            println!(
                "Assign one with: kassa rules set-product {} <category>",
                style("\"<product>\"").cyan()
            );
        }
    }
    Ok(())
}
