//! Progress hook: turns yt-dlp's raw progress lines into rate-limited
//! [`ProgressEvent`]s and is the checkpoint where cancellation is observed.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use vidqueue_core::core::cancel::CancellationFlag;
use vidqueue_core::core::events::ProgressEvent;

use crate::core::error::{EngineError, EngineResult};

pub const PROGRESS_MARKER: &str = "vidqueue-progress|";

/// Passed to `--progress-template`. The filename goes last because it may contain the separator.
pub const PROGRESS_TEMPLATE: &str = "download:vidqueue-progress|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatus {
    Downloading,
    Finished,
    Error,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawProgress {
    pub status: RawStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<f64>,
    pub filename: Option<String>,
}

fn field_f64(s: &str) -> Option<f64> {
    match s.trim() {
        "" | "NA" | "None" | "null" => None,
        v => v.parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 0.0),
    }
}

fn field_u64(s: &str) -> Option<u64> {
    field_f64(s).map(|f| f as u64)
}

impl RawProgress {
    /// Parses one line printed with [`PROGRESS_TEMPLATE`]. Anything else yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let start = line.find(PROGRESS_MARKER)?;
        let rest = &line[start + PROGRESS_MARKER.len()..];
        let mut parts = rest.splitn(7, '|');

        let status = match parts.next()?.trim() {
            "downloading" => RawStatus::Downloading,
            "finished" => RawStatus::Finished,
            "error" => RawStatus::Error,
            _ => RawStatus::Other,
        };
        let downloaded_bytes = parts.next().and_then(field_u64);
        let total_bytes = parts.next().and_then(field_u64);
        let total_bytes_estimate = parts.next().and_then(field_u64);
        let speed = parts.next().and_then(field_f64);
        let eta = parts.next().and_then(field_f64);
        let filename = parts
            .next()
            .map(str::trim)
            .filter(|f| !f.is_empty() && *f != "NA")
            .map(str::to_string);

        Some(Self {
            status,
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
            speed,
            eta,
            filename,
        })
    }
}

/// Maps a raw progress record onto the normalized event for `task_id`.
pub fn normalize(raw: &RawProgress, task_id: &str) -> Option<ProgressEvent> {
    match raw.status {
        RawStatus::Downloading => {
            let downloaded = raw.downloaded_bytes.unwrap_or(0);
            let total = raw
                .total_bytes
                .filter(|t| *t > 0)
                .or(raw.total_bytes_estimate.filter(|t| *t > 0));
            let percentage =
                total.map(|t| (downloaded as f64 / t as f64 * 100.0).clamp(0.0, 100.0));
            Some(ProgressEvent::Downloading {
                task_id: task_id.to_string(),
                percentage,
                downloaded_bytes: downloaded,
                total_bytes: total,
                speed_bytes_per_sec: raw.speed,
                eta_seconds: raw.eta,
            })
        }
        RawStatus::Finished => raw.filename.as_ref().map(|f| ProgressEvent::Finished {
            task_id: task_id.to_string(),
            filename: f.clone(),
        }),
        RawStatus::Error | RawStatus::Other => None,
    }
}

pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_emit: None,
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

pub struct ProgressHook {
    task_id: String,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    cancel: CancellationFlag,
    throttle: ProgressThrottle,
    last_finished: Option<String>,
}

impl ProgressHook {
    pub fn new(
        task_id: impl Into<String>,
        tx: mpsc::UnboundedSender<ProgressEvent>,
        cancel: CancellationFlag,
        min_interval_ms: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            tx,
            cancel,
            throttle: ProgressThrottle::new(min_interval_ms),
            last_finished: None,
        }
    }

    /// Handles one raw progress tick. Returns `Err(Cancelled)` once the flag is set;
    /// every other problem is swallowed so a bad tick never fails the download.
    ///
    /// yt-dlp reports `finished` once per downloaded stream, before merging and
    /// post-processing, so those are recorded rather than forwarded. The engine
    /// emits the single terminal event.
    pub fn on_progress(&mut self, raw: &RawProgress) -> EngineResult<()> {
        if self.cancel.is_set() {
            return Err(EngineError::Cancelled);
        }

        match normalize(raw, &self.task_id) {
            Some(ProgressEvent::Finished { filename, .. }) => {
                self.last_finished = Some(filename);
            }
            Some(event) => {
                if self.throttle.should_emit() {
                    let _ = self.tx.send(event);
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Feeds a line of engine output. Returns `Ok(false)` for lines that are not
    /// progress records.
    pub fn on_line(&mut self, line: &str) -> EngineResult<bool> {
        match RawProgress::parse_line(line) {
            Some(raw) => self.on_progress(&raw).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn last_finished(&self) -> Option<&str> {
        self.last_finished.as_deref()
    }
}
