//! Media tool (yt-dlp) adapter.
//!
//! Two uses: flat listing of channel and playlist ids, and downloading a
//! single video with progress and completion lines parsed from stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::FileResult;
use crate::utils::video_url;
use crate::work_queue::DelegateError;

/// Default audio-first format chain.
pub const DEFAULT_FORMAT: &str = "bestaudio[ext=m4a][acodec^=mp4a][format_note!*=DRC]/bestaudio[ext=m4a][acodec^=mp4a]/bestaudio[acodec^=mp4a][format_note!*=DRC]/bestaudio[format_note!*=DRC]/bestaudio";

const PROGRESS_PREFIX: &str = "[progress]";
const COMPLETE_PREFIX: &str = "[complete]";

/// Lists the video or playlist ids behind a listing URL.
#[async_trait]
pub trait IdLister: Send + Sync {
    async fn list_ids(&self, url: &str) -> Result<Vec<String>, DelegateError>;
}

/// Downloads one video to local storage.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<FileResult, DelegateError>;
}

pub type ProgressCallback = Arc<dyn Fn(&str, f32) + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn(&str, &FileResult) + Send + Sync>;

/// Declarative download options, turned into tool arguments by [`DownloadOptions::to_args`].
#[derive(Clone)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    pub format: String,
    pub format_sort: Option<String>,
    pub write_info_json: bool,
    pub sub_langs: Vec<String>,
    pub sub_format: Option<String>,
    pub proxy: Option<String>,
    pub on_progress: Option<ProgressCallback>,
    pub on_complete: Option<CompleteCallback>,
}

impl std::fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("output_dir", &self.output_dir)
            .field("format", &self.format)
            .field("format_sort", &self.format_sort)
            .field("write_info_json", &self.write_info_json)
            .field("sub_langs", &self.sub_langs)
            .field("sub_format", &self.sub_format)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl DownloadOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: DEFAULT_FORMAT.to_string(),
            format_sort: Some("abr".to_string()),
            write_info_json: true,
            sub_langs: vec!["en".to_string(), "en-orig".to_string()],
            sub_format: Some("ttml".to_string()),
            proxy: None,
            on_progress: None,
            on_complete: None,
        }
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn on_complete(mut self, callback: CompleteCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    /// Tool arguments for downloading `url`.
    pub fn to_args(&self, url: &str) -> Vec<String> {
        let template = self.output_dir.join("%(id)s.%(ext)s");
        let mut args: Vec<String> = vec!["--no-playlist".into(), "-f".into(), self.format.clone()];

        if let Some(ref sort) = self.format_sort {
            args.extend(["-S".into(), sort.clone()]);
        }
        args.extend(["-o".into(), template.to_string_lossy().to_string()]);

        if self.write_info_json {
            args.push("--write-info-json".into());
        }
        if !self.sub_langs.is_empty() {
            args.extend([
                "--write-auto-subs".into(),
                "--sub-langs".into(),
                self.sub_langs.join(","),
            ]);
            if let Some(ref format) = self.sub_format {
                args.extend(["--sub-format".into(), format.clone()]);
            }
        }
        if let Some(ref proxy) = self.proxy {
            args.extend(["--proxy".into(), proxy.clone()]);
        }

        args.extend([
            "--progress".into(),
            "--newline".into(),
            "--progress-template".into(),
            format!("download:{}%(progress._percent_str)s", PROGRESS_PREFIX),
            "--print".into(),
            format!(
                "after_move:{}%(.{{id,format_id,filepath,filesize}})j",
                COMPLETE_PREFIX
            ),
            url.to_string(),
        ]);
        args
    }
}

/// JSON printed by the tool after the final move.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Completion {
    pub id: String,
    #[serde(default)]
    pub format_id: Option<String>,
    pub filepath: PathBuf,
    #[serde(default)]
    pub filesize: Option<u64>,
}

/// A line of tool output the adapter cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Progress(f32),
    Completed(Completion),
}

/// Parse one stdout line. Anything that is not a progress or completion line yields `None`.
pub fn parse_event(line: &str) -> Option<ToolEvent> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let percent = rest.trim().trim_end_matches('%').trim();
        return percent.parse::<f32>().ok().map(ToolEvent::Progress);
    }
    if let Some(rest) = line.strip_prefix(COMPLETE_PREFIX) {
        return match serde_json::from_str::<Completion>(rest.trim()) {
            Ok(done) => Some(ToolEvent::Completed(done)),
            Err(e) => {
                warn!("Unparseable completion line from media tool: {}", e);
                None
            }
        };
    }
    None
}

/// Map a failed tool run onto a delegate error.
pub fn classify_failure(stderr: &str) -> DelegateError {
    let lower = stderr.to_lowercase();
    let summary = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or_else(|| stderr.lines().last().unwrap_or("no output"))
        .trim()
        .to_string();

    // Every error line echoes the id, so status codes are matched in their
    // "HTTP Error NNN" form only.
    if lower.contains("does not exist")
        || lower.contains("video unavailable")
        || lower.contains("http error 404")
        || (lower.contains("does not have a") && lower.contains("tab"))
    {
        DelegateError::NotFound(summary)
    } else if lower.contains("http error 429") || lower.contains("too many requests") {
        DelegateError::RateLimited(summary)
    } else {
        DelegateError::ExternalTool(summary)
    }
}

/// Handle to the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    proxy: Option<String>,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>, proxy: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            proxy,
        }
    }

    /// Use `configured` if given, otherwise look for `yt-dlp` on PATH.
    pub fn locate(configured: Option<&Path>, proxy: Option<String>) -> Result<Self, DelegateError> {
        let binary = match configured {
            Some(path) => path.to_path_buf(),
            None => which::which("yt-dlp").map_err(|e| {
                DelegateError::ExternalTool(format!("yt-dlp not found on PATH: {}", e))
            })?,
        };
        debug!("Using media tool at {}", binary.display());
        Ok(Self::new(binary, proxy))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(ref proxy) = self.proxy {
            cmd.args(["--proxy", proxy]);
        }
        cmd
    }

    /// Download one video, reporting through the option callbacks.
    pub async fn download(
        &self,
        video_id: &str,
        options: &DownloadOptions,
    ) -> Result<FileResult, DelegateError> {
        tokio::fs::create_dir_all(&options.output_dir)
            .await
            .map_err(|e| {
                DelegateError::ExternalTool(format!(
                    "Cannot create {}: {}",
                    options.output_dir.display(),
                    e
                ))
            })?;

        let mut cmd = Command::new(&self.binary);
        let options = if options.proxy.is_none() && self.proxy.is_some() {
            options.clone().proxy(self.proxy.clone())
        } else {
            options.clone()
        };
        cmd.args(options.to_args(&video_url(video_id)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| DelegateError::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut completion = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_event(&line) {
                    Some(ToolEvent::Progress(percent)) => {
                        if let Some(ref cb) = options.on_progress {
                            cb(video_id, percent);
                        }
                    }
                    Some(ToolEvent::Completed(done)) => completion = Some(done),
                    None => {}
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DelegateError::ExternalTool(format!("yt-dlp did not exit: {}", e)))?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            debug!("yt-dlp stderr for {}: {}", video_id, stderr);
            return Err(classify_failure(&stderr));
        }

        let Some(done) = completion else {
            return Err(DelegateError::ExternalTool(format!(
                "yt-dlp exited without reporting a file for {}",
                video_id
            )));
        };

        let size = match done.filesize {
            Some(size) => size,
            None => tokio::fs::metadata(&done.filepath)
                .await
                .map(|m| m.len())
                .map_err(|e| {
                    DelegateError::ExternalTool(format!(
                        "Downloaded file {} is missing: {}",
                        done.filepath.display(),
                        e
                    ))
                })?,
        };

        let result = FileResult {
            path: done.filepath,
            size,
            format_id: done.format_id,
        };
        if let Some(ref cb) = options.on_complete {
            cb(video_id, &result);
        }
        Ok(result)
    }
}

#[async_trait]
impl IdLister for YtDlp {
    async fn list_ids(&self, url: &str) -> Result<Vec<String>, DelegateError> {
        let output = self
            .command()
            .args(["--flat-playlist", "--print", "id", url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DelegateError::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr for {}: {}", url, stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

/// [`YtDlp`] bound to a fixed set of download options.
pub struct YtDlpFetcher {
    tool: YtDlp,
    options: DownloadOptions,
}

impl YtDlpFetcher {
    pub fn new(tool: YtDlp, options: DownloadOptions) -> Self {
        Self { tool, options }
    }
}

#[async_trait]
impl FileFetcher for YtDlpFetcher {
    async fn fetch(&self, video_id: &str) -> Result<FileResult, DelegateError> {
        self.tool.download(video_id, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let options = DownloadOptions::new("/media");
        let args = options.to_args("https://www.youtube.com/watch?v=abc");

        let joined = args.join(" ");
        assert!(joined.starts_with("--no-playlist -f bestaudio[ext=m4a]"));
        assert!(joined.contains("-S abr"));
        assert!(joined.contains("-o /media/%(id)s.%(ext)s"));
        assert!(joined.contains("--write-info-json"));
        assert!(joined.contains("--write-auto-subs --sub-langs en,en-orig --sub-format ttml"));
        assert!(joined.contains("after_move:[complete]%(.{id,format_id,filepath,filesize})j"));
        assert!(!joined.contains("--proxy"));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_args_without_extras() {
        let mut options = DownloadOptions::new("out").proxy(Some("socks5://tor:9050".into()));
        options.write_info_json = false;
        options.sub_langs.clear();
        options.format_sort = None;

        let args = options.to_args("u");
        assert!(!args.contains(&"--write-info-json".to_string()));
        assert!(!args.contains(&"--write-auto-subs".to_string()));
        assert!(!args.contains(&"-S".to_string()));
        let proxy = args.iter().position(|a| a == "--proxy").unwrap();
        assert_eq!(args[proxy + 1], "socks5://tor:9050");
    }

    #[test]
    fn test_parse_progress_and_completion() {
        assert_eq!(
            parse_event("[progress] 42.5%"),
            Some(ToolEvent::Progress(42.5))
        );
        assert_eq!(
            parse_event("[progress]100.0%"),
            Some(ToolEvent::Progress(100.0))
        );
        assert_eq!(parse_event("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_event("[progress]  N/A"), None);

        let line = r#"[complete]{"id": "abc", "format_id": "140", "filepath": "/media/abc.m4a", "filesize": 1024}"#;
        match parse_event(line) {
            Some(ToolEvent::Completed(done)) => {
                assert_eq!(done.id, "abc");
                assert_eq!(done.format_id.as_deref(), Some("140"));
                assert_eq!(done.filepath, PathBuf::from("/media/abc.m4a"));
                assert_eq!(done.filesize, Some(1024));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let no_size = r#"[complete]{"id": "abc", "format_id": null, "filepath": "/m/abc.m4a", "filesize": null}"#;
        match parse_event(no_size) {
            Some(ToolEvent::Completed(done)) => assert_eq!(done.filesize, None),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: HTTP Error 429: Too Many Requests"),
            DelegateError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube:tab] @nobody: This channel does not exist."),
            DelegateError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure(
                "ERROR: [youtube:tab] @someone: This channel does not have a playlists tab"
            ),
            DelegateError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Video unavailable"),
            DelegateError::NotFound(_)
        ));
        match classify_failure(
            "WARNING: slow\nERROR: Postprocessing: ffprobe and ffmpeg not found\n",
        ) {
            DelegateError::ExternalTool(msg) => {
                assert_eq!(msg, "ERROR: Postprocessing: ffprobe and ffmpeg not found")
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            classify_failure("ERROR: Unable to extract player response"),
            DelegateError::ExternalTool(_)
        ));
    }

    #[test]
    fn test_classify_failure_ignores_status_digits_in_ids() {
        let private = classify_failure(
            "ERROR: [youtube] ab429cdefgh: Video unavailable. This video is private",
        );
        assert!(matches!(private, DelegateError::NotFound(_)));
        assert!(!private.is_fatal());

        assert!(matches!(
            classify_failure("ERROR: [youtube] x404y429zzz: Sign in to confirm your age"),
            DelegateError::ExternalTool(_)
        ));
        assert!(
            classify_failure("ERROR: [youtube] x429: HTTP Error 429: Too Many Requests").is_fatal()
        );
    }
}
