//! File download command.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tracing::debug;

use crate::cli::helpers::{collect_seeds, nothing_to_do, open_store};
use crate::cli::progress::{print_report, spawn_progress};
use crate::config::Settings;
use crate::services::{DownloadOptions, FileService, YtDlp, YtDlpFetcher};

/// Download media for explicit or pending ids.
pub async fn cmd_files(
    settings: &Settings,
    ids: &[String],
    ids_file: &[PathBuf],
    workers: Option<usize>,
    limit: Option<usize>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let tool = YtDlp::locate(settings.yt_dlp_path.as_deref(), settings.proxy.clone())?;
    let output_dir = output_dir.unwrap_or_else(|| settings.downloads_dir.clone());

    let options = DownloadOptions::new(&output_dir)
        .proxy(settings.proxy.clone())
        .on_progress(Arc::new(|id: &str, percent: f32| {
            debug!("{}: {:.1}%", id, percent);
        }));

    let explicit = collect_seeds(ids, ids_file).await?;
    let (_ctx, store) = open_store(settings).await?;

    let service = FileService::new(Arc::new(YtDlpFetcher::new(tool, options)), store)
        .workers(workers.unwrap_or(settings.file_workers))
        .seed_limit(limit.unwrap_or(settings.file_seed_limit))
        .options(settings.engine_options());

    println!(
        "{} Downloading to {}",
        style("→").cyan(),
        output_dir.display()
    );
    let (tx, progress) = spawn_progress("downloads");
    let result = service.run(&explicit, Some(tx)).await;
    let _ = progress.await;

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => nothing_to_do(e, "Run 'yta metadata' first; only videos with metadata are downloaded"),
    }
}
