//! Metadata resolution command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;

use crate::cli::helpers::{collect_seeds, nothing_to_do, open_store};
use crate::cli::progress::{print_report, spawn_progress};
use crate::config::Settings;
use crate::services::{ApiConfig, MetadataService, YouTubeApi};

/// Resolve metadata for explicit or pending ids.
pub async fn cmd_metadata(
    settings: &Settings,
    ids: &[String],
    ids_file: &[PathBuf],
    workers: Option<usize>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let api_key = settings
        .api_key
        .clone()
        .context("YT_API_KEY is not set (environment, .env or config file)")?;
    let api = YouTubeApi::new(ApiConfig {
        base_url: settings.api_base_url.clone(),
        api_key,
        timeout: Duration::from_secs(settings.request_timeout),
        proxy: settings.proxy.clone(),
    })?;

    let explicit = collect_seeds(ids, ids_file).await?;
    let (_ctx, store) = open_store(settings).await?;

    let service = MetadataService::new(Arc::new(api), store)
        .workers(workers.unwrap_or(settings.metadata_workers))
        .batch_size(settings.metadata_batch_size)
        .seed_limit(limit.unwrap_or(settings.metadata_seed_limit))
        .options(settings.engine_options());

    let (tx, progress) = spawn_progress("metadata");
    let result = service.run(&explicit, Some(tx)).await;
    let _ = progress.await;

    match result {
        Ok(report) => {
            print_report(&report);
            if let Some(save) = report.stage("save") {
                println!(
                    "{} Saved metadata for {} videos",
                    style("✓").green(),
                    save.stats.succeeded
                );
            }
            Ok(())
        }
        Err(e) => nothing_to_do(e, "Run 'yta ids' to discover videos, or pass --ids"),
    }
}
