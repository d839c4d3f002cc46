//! Initialize command.

use console::style;

use crate::cli::helpers::open_store;
use crate::config::Settings;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let (ctx, _store) = open_store(settings).await?;

    for table in ctx.list_tables().await? {
        println!("  {} {}", style("✓").green(), table);
    }

    println!(
        "{} Initialized ytacquire in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    if settings.api_key.is_none() {
        println!(
            "{} YT_API_KEY is not set; the metadata command will need it",
            style("!").yellow()
        );
    }

    Ok(())
}
