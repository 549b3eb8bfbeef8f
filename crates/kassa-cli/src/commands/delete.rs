//! Delete command - remove an imported document and its records.

use clap::Args;
use console::style;

use super::{find_document, load_config, open_store};

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Content hash of the document (or a unique prefix)
    hash: String,
}

pub async fn run(args: DeleteArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let hash = find_document(&store, &args.hash)?;
    let records = store.delete_document(&hash)?;

    println!(
        "{} Deleted document {} ({} records)",
        style("✓").green(),
        hash.short(),
        records
    );
    Ok(())
}
