//! Status and failure reset commands.

use console::style;

use crate::cli::helpers::open_store;
use crate::config::Settings;
use crate::models::PendingStage;
use crate::repository::VideoStore;

/// Show how far each video has progressed.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let (_ctx, store) = open_store(settings).await?;
    let counts = store.counts().await?;

    println!("{}", style("ytacquire status").bold());
    println!("  Database:        {}", settings.database_url());
    println!("  Known ids:       {}", counts.ids);
    println!(
        "  With metadata:   {} ({} failed)",
        counts.with_metadata, counts.failed_metadata
    );
    println!(
        "  With file:       {} ({} failed)",
        counts.with_file, counts.failed_file
    );

    let pending_metadata = counts
        .ids
        .saturating_sub(counts.with_metadata + counts.failed_metadata);
    if pending_metadata > 0 {
        println!(
            "  {} {} ids pending metadata",
            style("→").dim(),
            pending_metadata
        );
    }
    Ok(())
}

/// Clear failed flags for one stage.
pub async fn cmd_reset_failed(settings: &Settings, stage: PendingStage) -> anyhow::Result<()> {
    let (_ctx, store) = open_store(settings).await?;
    let cleared = store.reset_failed(stage).await?;
    println!(
        "{} Cleared {} failed {} flags",
        style("✓").green(),
        cleared,
        stage.as_str()
    );
    Ok(())
}
