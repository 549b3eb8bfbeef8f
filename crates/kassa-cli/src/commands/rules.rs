//! Rules command - inspect and edit the category rule table.

use clap::{Args, Subcommand};
use console::style;

use kassa_core::models::record::product_key;
use kassa_core::MatchSource;

use super::{load_categorizer, load_config, rules_path};

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Show the active rule table
    Show {
        /// Print the full table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Map a product name to a category
    SetProduct {
        /// Product name as printed on the receipt
        product: String,
        /// Category label
        category: String,
    },

    /// Add a keyword to a category
    AddKeyword { category: String, keyword: String },

    /// Remove a keyword from a category
    RemoveKeyword { category: String, keyword: String },

    /// Teach the full name behind a receipt short name
    AddAbbreviation {
        /// Short name as printed on the receipt
        short: String,
        /// Full product name
        full: String,
    },

    /// Show which category a product name resolves to
    Resolve {
        /// Product name as printed on the receipt
        product: String,
    },

    /// Show rule file path
    Path,
}

pub async fn run(args: RulesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let path = rules_path(&config);
    let categorizer = load_categorizer(&config)?;

    let version = match args.command {
        RulesCommand::Show { json } => {
            let table = categorizer.table();
            if json {
                println!("{}", serde_json::to_string_pretty(&*table)?);
            } else {
                println!("Rule table version {}", table.version);
                println!(
                    "{} products, {} abbreviations, {} priority rules",
                    table.products.len(),
                    table.abbreviations.len(),
                    table.priority_rules.len()
                );
                println!();
                for (category, keywords) in table.keywords() {
                    println!("{}", style(category).bold());
                    println!("  {}", keywords.join(", "));
                }
            }
            return Ok(());
        }
        RulesCommand::SetProduct { product, category } => {
            categorizer.set_product(&product_key(&product), &category)?
        }
        RulesCommand::AddKeyword { category, keyword } => {
            categorizer.add_keyword(&category, &keyword)?
        }
        RulesCommand::RemoveKeyword { category, keyword } => {
            categorizer.remove_keyword(&category, &keyword)?
        }
        RulesCommand::AddAbbreviation { short, full } => {
            categorizer.add_abbreviation(&product_key(&short), &product_key(&full))?
        }
        RulesCommand::Resolve { product } => {
            let key = product_key(&product);
            let resolution = categorizer.resolve(&key);
            let via = match &resolution.matched_by {
                MatchSource::Exact => "product table".to_string(),
                MatchSource::Priority { keyword } => format!("priority keyword '{}'", keyword),
                MatchSource::Keyword { keyword } => format!("keyword '{}'", keyword),
                MatchSource::Fallback => "no rule matched".to_string(),
            };
            println!(
                "{} -> {}{} ({})",
                key,
                style(&resolution.category).green(),
                resolution
                    .subcategory
                    .as_ref()
                    .map(|s| format!(" / {}", s))
                    .unwrap_or_default(),
                via
            );
            if let Some(ambiguity) = resolution.ambiguity {
                println!("{} {}", style("⚠").yellow(), ambiguity);
            }
            return Ok(());
        }
        RulesCommand::Path => {
            println!("Rule file: {}", path.display());
            if path.exists() {
                println!("Status: {}", style("exists").green());
            } else {
                println!("Status: {}", style("not created (using embedded rules)").yellow());
            }
            return Ok(());
        }
    };

    categorizer.save(&path)?;
    println!(
        "{} Saved rules version {} to {}",
        style("✓").green(),
        version,
        path.display()
    );
    println!("Run 'kassa recategorize' to apply the change to stored records.");
    Ok(())
}
