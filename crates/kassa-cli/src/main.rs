//! CLI application for importing and categorizing supermarket receipts.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{config, delete, import, parse, records, rules, unknown};

/// Kassa - Import Albert Heijn receipts and invoices and track spending per category
#[derive(Parser)]
#[command(name = "kassa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import new receipts and invoices into the database
    Import(import::ImportArgs),

    /// Parse a single file without storing it
    Parse(parse::ParseArgs),

    /// List stored purchase records
    Records(records::RecordsArgs),

    /// List imported documents
    Documents(records::DocumentsArgs),

    /// Show spending per category
    Totals(records::TotalsArgs),

    /// Recompute categories of all stored records with the current rules
    Recategorize,

    /// Parse stored documents again and rebuild their records
    Reparse,

    /// List products no category rule matched
    Unknown(unknown::UnknownArgs),

    /// Manage category rules
    Rules(rules::RulesArgs),

    /// Manage configuration
    Config(config::ConfigArgs),

    /// Delete an imported document and its records
    Delete(delete::DeleteArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Import(args) => import::run(args, config_path).await,
        Commands::Parse(args) => parse::run(args, config_path).await,
        Commands::Records(args) => records::run(args, config_path).await,
        Commands::Documents(args) => records::documents(args, config_path).await,
        Commands::Totals(args) => records::totals(args, config_path).await,
        Commands::Recategorize => records::recategorize(config_path).await,
        Commands::Reparse => records::reparse(config_path).await,
        Commands::Unknown(args) => unknown::run(args, config_path).await,
        Commands::Rules(args) => rules::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
        Commands::Delete(args) => delete::run(args, config_path).await,
    }
}
