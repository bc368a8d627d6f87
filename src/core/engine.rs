//! Download engine: resolves URLs into entries and runs one task at a time
//! through yt-dlp, with an optional ffmpeg remux afterwards.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use vidqueue_core::core::cancel::CancellationFlag;
use vidqueue_core::core::events::ProgressEvent;
use vidqueue_core::models::media::{validate_url, OutputFormat, ResolutionResult, Task};
use vidqueue_core::models::settings::AppSettings;

use crate::core::error::{EngineError, EngineResult};
use crate::core::progress::ProgressHook;
use crate::core::{dependencies, disk, ffmpeg, process, ytdlp};

const STDERR_TAIL_LINES: usize = 20;

#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Lists the entries behind `url` without downloading. Never fails; problems
    /// come back as `ResolutionResult::Error`.
    async fn resolve(&self, url: &str) -> ResolutionResult;

    /// Runs `task` to completion. Always ends by sending exactly one terminal
    /// event (`Finished`, `Cancelled` or `Error`) on `progress`.
    async fn execute_task(
        &self,
        task: &Task,
        progress: mpsc::UnboundedSender<ProgressEvent>,
        cancel: &CancellationFlag,
    );

    fn output_path(&self) -> PathBuf;

    /// Points future downloads at `path`, creating it and its parents.
    fn set_output_path(&self, path: &Path) -> EngineResult<PathBuf>;
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Expands `~`, creates the directory and returns its canonical form.
pub fn prepare_output_dir(path: &Path) -> EngineResult<PathBuf> {
    let path = expand_home(path);
    std::fs::create_dir_all(&path)?;
    Ok(std::fs::canonicalize(&path)?)
}

pub struct YtdlpEngine {
    settings: Arc<AppSettings>,
    output_path: RwLock<PathBuf>,
    ytdlp_path: Option<PathBuf>,
}

impl YtdlpEngine {
    pub fn new(settings: Arc<AppSettings>) -> EngineResult<Self> {
        let output_path = prepare_output_dir(&settings.download.default_output_dir)?;
        Ok(Self {
            settings,
            output_path: RwLock::new(output_path),
            ytdlp_path: None,
        })
    }

    /// Uses a fixed yt-dlp executable instead of searching PATH and the managed bin dir.
    pub fn with_ytdlp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ytdlp_path = Some(path.into());
        self
    }

    pub async fn ytdlp(&self) -> EngineResult<PathBuf> {
        if let Some(path) = &self.ytdlp_path {
            return Ok(path.clone());
        }
        dependencies::ensure_ytdlp().await.map_err(|e| {
            tracing::warn!("yt-dlp unavailable: {}", e);
            EngineError::ToolMissing("yt-dlp".into())
        })
    }

    async fn try_resolve(&self, url: &str) -> EngineResult<ResolutionResult> {
        validate_url(url)?;
        let ytdlp = self.ytdlp().await?;
        let json = ytdlp::dump_metadata(&ytdlp, url).await?;
        Ok(ytdlp::parse_resolution(&json))
    }

    async fn run_task(
        &self,
        task: &Task,
        progress: &mpsc::UnboundedSender<ProgressEvent>,
        cancel: &CancellationFlag,
    ) -> EngineResult<PathBuf> {
        if cancel.is_set() {
            return Err(EngineError::Cancelled);
        }

        let output_dir = self.output_path();
        tokio::fs::create_dir_all(&output_dir).await?;
        let available =
            disk::ensure_free_space(&output_dir, self.settings.advanced.min_free_space_bytes)?;
        tracing::debug!("{} bytes free in {}", available, output_dir.display());

        let ytdlp = self.ytdlp().await?;
        let args = ytdlp::build_download_args(task, &output_dir, &self.settings);
        tracing::debug!("yt-dlp args for {}: {:?}", task.id(), args);

        let mut hook = ProgressHook::new(
            task.id(),
            progress.clone(),
            cancel.clone(),
            self.settings.advanced.progress_interval_ms,
        );

        let reported = run_ytdlp(&ytdlp, &args, &mut hook, cancel).await?;

        // Per-stream files are removed after merging, so the last finished tick
        // only counts if it is still on disk.
        let path = match reported.or_else(|| {
            hook.last_finished()
                .map(PathBuf::from)
                .filter(|p| p.is_file())
        }) {
            Some(p) => p,
            None => ytdlp::find_downloaded_file(&output_dir, task.id()).await?,
        };
        let path = ytdlp::final_path(path, task.format());

        if task.format() == OutputFormat::Mp4
            && path.extension().and_then(|e| e.to_str()) != Some("mp4")
        {
            return remux_to_mp4(task, path, progress, cancel).await;
        }

        Ok(path)
    }
}

async fn remux_to_mp4(
    task: &Task,
    source: PathBuf,
    progress: &mpsc::UnboundedSender<ProgressEvent>,
    cancel: &CancellationFlag,
) -> EngineResult<PathBuf> {
    // Last point where cancellation is honoured; the remux itself is not interruptible.
    if cancel.is_set() {
        return Err(EngineError::Cancelled);
    }

    let _ = progress.send(ProgressEvent::Converting {
        task_id: task.id().to_string(),
    });

    let target = ffmpeg::remux_target(&source, "mp4");
    tracing::info!("remuxing {} -> {}", source.display(), target.display());
    ffmpeg::remux(&source, &target).await?;

    if let Err(e) = tokio::fs::remove_file(&source).await {
        tracing::warn!("could not remove {}: {}", source.display(), e);
    }

    Ok(target)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    });
}

/// Spawns yt-dlp and pumps its output through `hook` until it exits. Returns
/// the final path yt-dlp printed, if any.
async fn run_ytdlp(
    ytdlp: &Path,
    args: &[String],
    hook: &mut ProgressHook,
    cancel: &CancellationFlag,
) -> EngineResult<Option<PathBuf>> {
    let mut child = process::detached(ytdlp)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ToolMissing("yt-dlp".into()),
            _ => EngineError::Process(format!("failed to start yt-dlp: {}", e)),
        })?;

    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, Stream::Stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, Stream::Stderr, line_tx.clone());
    }
    drop(line_tx);

    let mut reported = None;
    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    loop {
        let next = tokio::select! {
            line = line_rx.recv() => line,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(EngineError::Cancelled);
            }
        };

        let Some((stream, line)) = next else {
            break;
        };

        if let Some(path) = ytdlp::parse_file_line(&line) {
            reported = Some(path);
            continue;
        }

        match hook.on_line(&line) {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        }

        tracing::debug!("yt-dlp: {}", line);
        if stream == Stream::Stderr {
            if stderr_tail.len() == STDERR_TAIL_LINES {
                stderr_tail.pop_front();
            }
            stderr_tail.push_back(line);
        }
    }

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status?,
        None => {
            let _ = child.kill().await;
            return Err(EngineError::Cancelled);
        }
    };

    if !status.success() {
        if cancel.is_set() {
            return Err(EngineError::Cancelled);
        }
        let joined = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
        return Err(EngineError::Process(
            ytdlp::error_tail(&joined).unwrap_or_else(|| format!("yt-dlp exited with {}", status)),
        ));
    }

    Ok(reported)
}

#[async_trait]
impl DownloadEngine for YtdlpEngine {
    async fn resolve(&self, url: &str) -> ResolutionResult {
        tracing::info!("resolving {}", url);
        match self.try_resolve(url).await {
            Ok(result) => {
                tracing::info!("{} resolved to {} entries", url, result.entries().len());
                result
            }
            Err(e) => {
                tracing::error!("failed to resolve {}: {}", url, e);
                ResolutionResult::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn execute_task(
        &self,
        task: &Task,
        progress: mpsc::UnboundedSender<ProgressEvent>,
        cancel: &CancellationFlag,
    ) {
        let task_id = task.id().to_string();
        tracing::info!("starting {} ({}, {})", task_id, task.format(), task.quality());

        let event = match self.run_task(task, &progress, cancel).await {
            Ok(path) => {
                tracing::info!("finished {}: {}", task_id, path.display());
                ProgressEvent::Finished {
                    task_id,
                    filename: path.to_string_lossy().to_string(),
                }
            }
            Err(EngineError::Cancelled) => {
                tracing::info!("cancelled {}", task_id);
                ProgressEvent::Cancelled { task_id }
            }
            Err(e) => {
                tracing::error!("download error for {}: {}", task_id, e);
                ProgressEvent::Error {
                    task_id,
                    message: e.to_string(),
                }
            }
        };

        let _ = progress.send(event);
    }

    fn output_path(&self) -> PathBuf {
        self.output_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_output_path(&self, path: &Path) -> EngineResult<PathBuf> {
        let resolved = prepare_output_dir(path)?;
        tracing::info!("output directory set to {}", resolved.display());
        *self
            .output_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = resolved.clone();
        Ok(resolved)
    }
}
