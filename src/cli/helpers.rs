//! Shared helper functions for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use console::style;

use crate::config::Settings;
use crate::repository::{DbContext, DieselVideoStore};
use crate::utils::{read_ids_from_file, split_list};
use crate::work_queue::PipelineError;

/// Gather seeds from inline lists and seed files, in that order.
pub async fn collect_seeds(inline: &[String], files: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    let mut seeds: Vec<String> = inline.iter().flat_map(|s| split_list(s)).collect();
    for path in files {
        let ids = read_ids_from_file(path)
            .await
            .with_context(|| format!("Failed to read ids from {}", path.display()))?;
        seeds.extend(ids);
    }
    Ok(seeds)
}

/// Open the database, creating directories and tables on first use.
pub async fn open_store(settings: &Settings) -> anyhow::Result<(DbContext, Arc<DieselVideoStore>)> {
    settings.ensure_directories()?;
    let ctx = settings.create_db_context();
    ctx.init_schema()
        .await
        .with_context(|| format!("Failed to open database {}", settings.database_url()))?;
    let store = Arc::new(ctx.videos());
    Ok((ctx, store))
}

/// Turn "nothing to do" into a friendly message; pass other setup errors on.
pub fn nothing_to_do(err: PipelineError, hint: &str) -> anyhow::Result<()> {
    match err {
        PipelineError::NoWork => {
            println!("{} Nothing to do", style("!").yellow());
            println!("  {} {}", style("→").dim(), hint);
            Ok(())
        }
        other => Err(other.into()),
    }
}
