use std::io::Write;

use vidqueue_core::core::events::{EventEmitter, ProgressEvent, QueueSnapshot, QueueStatus};

/// Prints progress to stderr for the command-line front-end.
#[derive(Clone, Default)]
pub struct ConsoleEmitter {
    quiet_progress: bool,
}

impl ConsoleEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses the per-tick progress line; terminal events are still printed.
    pub fn quiet(mut self) -> Self {
        self.quiet_progress = true;
        self
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn progress_line(progress: &ProgressEvent) -> String {
    match progress {
        ProgressEvent::Downloading {
            task_id,
            percentage,
            downloaded_bytes,
            total_bytes,
            speed_bytes_per_sec,
            eta_seconds,
        } => {
            let pct = percentage
                .map(|p| format!("{:5.1}%", p))
                .unwrap_or_else(|| "  ?  %".to_string());
            let size = match total_bytes {
                Some(total) => format!("{} / {}", format_bytes(*downloaded_bytes), format_bytes(*total)),
                None => format_bytes(*downloaded_bytes),
            };
            let speed = speed_bytes_per_sec
                .map(|s| format!(" at {}/s", format_bytes(s as u64)))
                .unwrap_or_default();
            let eta = eta_seconds
                .map(|e| format!(" ETA {}s", e.round() as u64))
                .unwrap_or_default();
            format!("[{}] {} {}{}{}", task_id, pct, size, speed, eta)
        }
        ProgressEvent::Converting { task_id } => format!("[{}] converting to mp4", task_id),
        ProgressEvent::Finished { task_id, filename } => format!("[{}] saved {}", task_id, filename),
        ProgressEvent::Cancelled { task_id } => format!("[{}] cancelled", task_id),
        ProgressEvent::Error { task_id, message } => format!("[{}] error: {}", task_id, message),
    }
}

impl EventEmitter for ConsoleEmitter {
    fn emit_queue_state(&self, snapshot: &QueueSnapshot) {
        if snapshot.status == QueueStatus::Idle {
            eprintln!(
                "done: {} completed, {} failed, {} cancelled",
                snapshot.completed, snapshot.failed, snapshot.cancelled
            );
        } else if let Some(id) = &snapshot.in_flight {
            eprintln!(
                "downloading {} ({} queued, ~{}s of media left)",
                id,
                snapshot.pending,
                snapshot.remaining_duration_seconds.round() as u64
            );
        }
    }

    fn emit_progress(&self, progress: &ProgressEvent) {
        match progress {
            ProgressEvent::Downloading { .. } => {
                if !self.quiet_progress {
                    let mut err = std::io::stderr().lock();
                    let _ = write!(err, "\r{:<100}", progress_line(progress));
                    let _ = err.flush();
                }
            }
            _ => eprintln!("\r{:<100}", progress_line(progress)),
        }
    }
}
