//! Identifier discovery command.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;

use crate::cli::helpers::{collect_seeds, nothing_to_do, open_store};
use crate::cli::progress::{print_report, spawn_progress};
use crate::config::Settings;
use crate::repository::{DieselVideoStore, VideoStore};
use crate::services::{DiscoverySeeds, DiscoveryService, YtDlp};

/// Raw `ids` arguments before file expansion.
pub struct IdArgs {
    pub users: Vec<String>,
    pub users_file: Vec<PathBuf>,
    pub playlists: Vec<String>,
    pub playlists_file: Vec<PathBuf>,
    pub videos: Vec<String>,
    pub videos_file: Vec<PathBuf>,
}

impl IdArgs {
    async fn into_seeds(self) -> anyhow::Result<DiscoverySeeds> {
        Ok(DiscoverySeeds {
            users: collect_seeds(&self.users, &self.users_file).await?,
            playlists: collect_seeds(&self.playlists, &self.playlists_file).await?,
            videos: collect_seeds(&self.videos, &self.videos_file).await?,
        })
    }
}

/// Discover video ids and store them as pending.
pub async fn cmd_ids(settings: &Settings, args: IdArgs, workers: Option<usize>) -> anyhow::Result<()> {
    let seeds = args.into_seeds().await?;
    if seeds.is_empty() {
        println!(
            "{} Give at least one of --users, --playlists or --videos (or their -file forms)",
            style("!").yellow()
        );
        return Ok(());
    }

    let tool = YtDlp::locate(settings.yt_dlp_path.as_deref(), settings.proxy.clone())?;
    let (_ctx, store) = open_store(settings).await?;
    let before = store_ids(&store).await?;

    let service = DiscoveryService::new(Arc::new(tool), store.clone())
        .workers(workers.unwrap_or(settings.discovery_workers))
        .options(settings.engine_options());

    let (tx, progress) = spawn_progress("discovery");
    let result = service.run(seeds, Some(tx)).await;
    let _ = progress.await;

    let report = match result {
        Ok(report) => report,
        Err(e) => return nothing_to_do(e, "Check that the given handles and ids are valid"),
    };
    print_report(&report);

    let after = store_ids(&store).await?;
    println!(
        "{} {} new ids ({} known in total)",
        style("✓").green(),
        after.saturating_sub(before),
        after
    );
    Ok(())
}

async fn store_ids(store: &DieselVideoStore) -> anyhow::Result<u64> {
    Ok(store.counts().await?.ids)
}
