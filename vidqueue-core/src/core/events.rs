use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Downloading {
        task_id: String,
        /// `None` while the total size is unknown.
        percentage: Option<f64>,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        speed_bytes_per_sec: Option<f64>,
        eta_seconds: Option<f64>,
    },
    Converting {
        task_id: String,
    },
    Finished {
        task_id: String,
        filename: String,
    },
    Cancelled {
        task_id: String,
    },
    Error {
        task_id: String,
        message: String,
    },
}

impl ProgressEvent {
    pub fn task_id(&self) -> &str {
        match self {
            ProgressEvent::Downloading { task_id, .. }
            | ProgressEvent::Converting { task_id }
            | ProgressEvent::Finished { task_id, .. }
            | ProgressEvent::Cancelled { task_id }
            | ProgressEvent::Error { task_id, .. } => task_id,
        }
    }

    /// Terminal events are the last event a task ever produces.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Finished { .. }
                | ProgressEvent::Cancelled { .. }
                | ProgressEvent::Error { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct QueueSnapshot {
    pub status: QueueStatus,
    pub pending: usize,
    pub in_flight: Option<String>,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub remaining_duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum QueueEvent {
    Progress(ProgressEvent),
    State(QueueSnapshot),
}

pub trait EventEmitter: Send + Sync + Clone + 'static {
    fn emit_queue_state(&self, snapshot: &QueueSnapshot);
    fn emit_progress(&self, progress: &ProgressEvent);
}

/// Forwards every event into an unbounded channel for the front-end to drain.
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit_queue_state(&self, snapshot: &QueueSnapshot) {
        let _ = self.tx.send(QueueEvent::State(snapshot.clone()));
    }

    fn emit_progress(&self, progress: &ProgressEvent) {
        let _ = self.tx.send(QueueEvent::Progress(progress.clone()));
    }
}
