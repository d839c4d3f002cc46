//! Tracing subscriber setup.
//!
//! Everything goes to stderr. Pipeline commands also get a plain-text log
//! file under `<data_dir>/logs/`; a previous file of the same name is kept
//! by renaming it with a timestamp.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::utils::sanitize_filename;

/// Default filter when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "ytacquire=info"
    } else {
        "ytacquire=warn"
    }
}

/// Log file path for a named run.
pub fn log_file_path(logs_dir: &Path, name: &str) -> PathBuf {
    logs_dir.join(format!("video_{}.log", sanitize_filename(name)))
}

/// Move an existing log out of the way. Returns the new name if one was moved.
pub fn rotate_existing(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let rotated = path.with_file_name(format!("{}_{}.log", stem, stamp));
    fs::rename(path, &rotated)?;
    Ok(Some(rotated))
}

/// Install the global subscriber. `log_file` adds a non-ANSI file layer.
pub fn init(verbose: bool, log_file: Option<&Path>) -> io::Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into())
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            rotate_existing(path)?;
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    // A second init (tests, repeated calls) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(filter()))
        .with(file_layer)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "ytacquire=info");
        assert_eq!(default_filter(false), "ytacquire=warn");
    }

    #[test]
    fn test_log_file_path() {
        let path = log_file_path(Path::new("/data/logs"), "metadata");
        assert_eq!(path, PathBuf::from("/data/logs/video_metadata.log"));
        let odd = log_file_path(Path::new("/data/logs"), "a/b");
        assert_eq!(odd, PathBuf::from("/data/logs/video_a_b.log"));
    }

    #[test]
    fn test_rotate_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("video_files.log");
        assert_eq!(rotate_existing(&path).unwrap(), None);

        fs::write(&path, "old run").unwrap();
        let rotated = rotate_existing(&path).unwrap().unwrap();
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(&rotated).unwrap(), "old run");
        let name = rotated.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("video_files_"));
        assert!(name.ends_with(".log"));
    }
}
