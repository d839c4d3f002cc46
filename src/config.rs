//! Configuration management for ytacquire using the prefer crate.
//!
//! Precedence, highest first: command-line flags, environment variables,
//! the config file, built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::DbContext;
use crate::work_queue::{EngineOptions, DEFAULT_MAX_WORKERS_PER_STAGE, DEFAULT_QUEUE_WARN_DEPTH};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "ytacquire.db";

/// Default remote metadata API base.
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Largest batch the metadata API accepts in one call.
pub const MAX_METADATA_BATCH: usize = 50;

/// Upper bound on metadata save workers.
pub const MAX_SAVE_WORKERS: usize = 150;

const DOWNLOADS_SUBDIR: &str = "downloads";
const LOGS_SUBDIR: &str = "logs";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Where downloaded media files go.
    pub downloads_dir: PathBuf,
    /// Key for the remote metadata API.
    pub api_key: Option<String>,
    pub api_base_url: String,
    /// Explicit media tool binary; located on PATH when unset.
    pub yt_dlp_path: Option<PathBuf>,
    /// Proxy passed to the media tool and the HTTP client.
    pub proxy: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub poll_interval_ms: u64,
    pub queue_warn_depth: usize,
    pub max_workers_per_stage: usize,
    pub discovery_workers: usize,
    pub metadata_workers: usize,
    pub file_workers: usize,
    pub metadata_batch_size: usize,
    pub metadata_seed_limit: usize,
    pub file_seed_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ytacquire");

        Self {
            downloads_dir: data_dir.join(DOWNLOADS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            yt_dlp_path: None,
            proxy: None,
            request_timeout: 30,
            poll_interval_ms: 250,
            queue_warn_depth: DEFAULT_QUEUE_WARN_DEPTH,
            max_workers_per_stage: DEFAULT_MAX_WORKERS_PER_STAGE,
            discovery_workers: 5,
            metadata_workers: 2,
            file_workers: 10,
            metadata_batch_size: MAX_METADATA_BATCH,
            metadata_seed_limit: 5000,
            file_seed_limit: 1000,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            downloads_dir: data_dir.join(DOWNLOADS_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_SUBDIR)
    }

    /// Engine options shared by every pipeline.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            queue_warn_depth: self.queue_warn_depth,
            max_workers_per_stage: self.max_workers_per_stage,
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (dir, label) in [
            (&self.data_dir, "data"),
            (&self.downloads_dir, "downloads"),
            (&self.logs_dir(), "logs"),
        ] {
            tracing::debug!("Ensuring {} directory exists: {}", label, dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(key) = get("YT_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(dir) = get("YT_DLP_OUTPUT_DIR") {
            self.downloads_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
        }
        if let Some(path) = get("YT_DLP_PATH") {
            self.yt_dlp_path = Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
        }
        if let Some(proxy) = get("YT_DLP_PROXY") {
            self.proxy = Some(proxy);
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yt_dlp_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_warn_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers_per_stage: Option<usize>,
    /// Per-pipeline worker counts.
    #[serde(default, skip_serializing_if = "WorkersConfig::is_default")]
    pub workers: WorkersConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_seed_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_seed_limit: Option<usize>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<usize>,
}

impl WorkersConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers ytacquire config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("ytacquire").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.downloads_dir = settings.data_dir.join(DOWNLOADS_SUBDIR);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref dir) = self.downloads_dir {
            settings.downloads_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref key) = self.api_key {
            settings.api_key = Some(key.clone());
        }
        if let Some(ref url) = self.api_base_url {
            settings.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ref path) = self.yt_dlp_path {
            settings.yt_dlp_path = Some(self.resolve_path(path, base_dir));
        }
        if let Some(ref proxy) = self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.poll_interval_ms = ms;
        }
        if let Some(depth) = self.queue_warn_depth {
            settings.queue_warn_depth = depth;
        }
        if let Some(max) = self.max_workers_per_stage {
            settings.max_workers_per_stage = max;
        }
        if let Some(n) = self.workers.discovery {
            settings.discovery_workers = n;
        }
        if let Some(n) = self.workers.metadata {
            settings.metadata_workers = n;
        }
        if let Some(n) = self.workers.files {
            settings.file_workers = n;
        }
        if let Some(size) = self.metadata_batch_size {
            settings.metadata_batch_size = size.clamp(1, MAX_METADATA_BATCH);
        }
        if let Some(limit) = self.metadata_seed_limit {
            settings.metadata_seed_limit = limit;
        }
        if let Some(limit) = self.file_seed_limit {
            settings.file_seed_limit = limit;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Target data directory or database file (overrides config).
    pub target: Option<PathBuf>,
}

/// Load settings from config file, environment and command-line target.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env();

    if let Some(ref target) = options.target {
        apply_target(&mut settings, target);
    }

    (settings, config)
}

/// Point settings at a target directory, or at a `.db` file directly.
fn apply_target(settings: &mut Settings, target: &Path) {
    let is_db_file = target
        .extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3");

    let data_dir = if is_db_file {
        if let Some(name) = target.file_name() {
            settings.database_filename = name.to_string_lossy().to_string();
        }
        target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        target.to_path_buf()
    };

    settings.downloads_dir = data_dir.join(DOWNLOADS_SUBDIR);
    settings.data_dir = data_dir;
    settings.database_url = None;
}
