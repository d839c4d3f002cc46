//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod files;
mod ids;
mod init;
mod metadata;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::logging;
use crate::models::PendingStage;

#[derive(Parser)]
#[command(name = "yta")]
#[command(about = "Discover YouTube videos, resolve their metadata and download their media")]
#[command(version)]
pub struct Cli {
    /// Target directory or database file (overrides config file).
    /// Can be a directory containing ytacquire.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Discover video ids from channels, playlists and videos
    Ids {
        /// Channel handles or URLs (comma or space separated)
        #[arg(long, num_args = 1..)]
        users: Vec<String>,
        /// Files with channel handles (.txt or .csv)
        #[arg(long, num_args = 1..)]
        users_file: Vec<PathBuf>,
        /// Playlist ids or URLs
        #[arg(long, num_args = 1..)]
        playlists: Vec<String>,
        /// Files with playlist ids (.txt or .csv)
        #[arg(long, num_args = 1..)]
        playlists_file: Vec<PathBuf>,
        /// Video ids or URLs
        #[arg(long, num_args = 1..)]
        videos: Vec<String>,
        /// Files with video ids (.txt or .csv)
        #[arg(long, num_args = 1..)]
        videos_file: Vec<PathBuf>,
        /// Workers per stage
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Resolve metadata for video ids through the YouTube Data API
    Metadata {
        /// Video ids or URLs (default: ids pending metadata)
        #[arg(long, num_args = 1..)]
        ids: Vec<String>,
        /// Files with video ids (.txt or .csv)
        #[arg(long, num_args = 1..)]
        ids_file: Vec<PathBuf>,
        /// Retrieve workers; save workers are derived from this
        #[arg(short, long)]
        workers: Option<usize>,
        /// Maximum pending ids to load from the database
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Download media files for videos with metadata
    Files {
        /// Video ids or URLs (default: ids pending a file)
        #[arg(long, num_args = 1..)]
        ids: Vec<String>,
        /// Files with video ids (.txt or .csv)
        #[arg(long, num_args = 1..)]
        ids_file: Vec<PathBuf>,
        /// Download workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Maximum pending ids to load from the database
        #[arg(short, long)]
        limit: Option<usize>,
        /// Directory for downloaded files (overrides YT_DLP_OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show database counts
    Status,

    /// Clear failed flags so the next run retries those ids
    ResetFailed {
        #[arg(value_enum)]
        stage: StageArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageArg {
    Metadata,
    File,
}

impl From<StageArg> for PendingStage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Metadata => PendingStage::Metadata,
            StageArg::File => PendingStage::File,
        }
    }
}

impl Commands {
    /// Name of the log file written for this command, if any.
    fn log_name(&self) -> Option<&'static str> {
        match self {
            Commands::Ids { .. } => Some("ids"),
            Commands::Metadata { .. } => Some("metadata"),
            Commands::Files { .. } => Some("files"),
            _ => None,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        target: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    let log_file = cli
        .command
        .log_name()
        .map(|name| logging::log_file_path(&settings.logs_dir(), name));
    logging::init(cli.verbose, log_file.as_deref())?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Ids {
            users,
            users_file,
            playlists,
            playlists_file,
            videos,
            videos_file,
            workers,
        } => {
            ids::cmd_ids(
                &settings,
                ids::IdArgs {
                    users,
                    users_file,
                    playlists,
                    playlists_file,
                    videos,
                    videos_file,
                },
                workers,
            )
            .await
        }
        Commands::Metadata {
            ids,
            ids_file,
            workers,
            limit,
        } => metadata::cmd_metadata(&settings, &ids, &ids_file, workers, limit).await,
        Commands::Files {
            ids,
            ids_file,
            workers,
            limit,
            output_dir,
        } => files::cmd_files(&settings, &ids, &ids_file, workers, limit, output_dir).await,
        Commands::Status => status::cmd_status(&settings).await,
        Commands::ResetFailed { stage } => status::cmd_reset_failed(&settings, stage.into()).await,
    }
}
