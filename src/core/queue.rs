use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use vidqueue_core::core::cancel::CancellationFlag;
use vidqueue_core::core::events::{EventEmitter, ProgressEvent, QueueSnapshot, QueueStatus};
use vidqueue_core::models::media::Task;

use crate::core::engine::DownloadEngine;

/// Pending tasks plus the aggregate counters for one run.
#[derive(Debug, Default)]
pub struct TaskQueue {
    status: QueueStatus,
    pending: VecDeque<Task>,
    in_flight: Option<Task>,
    completed: usize,
    failed: usize,
    cancelled: usize,
}

impl TaskQueue {
    fn begin(&mut self, tasks: Vec<Task>) {
        self.status = QueueStatus::Running;
        self.pending = tasks.into();
        self.in_flight = None;
        self.completed = 0;
        self.failed = 0;
        self.cancelled = 0;
    }

    fn next(&mut self) -> Option<Task> {
        let task = self.pending.pop_front()?;
        self.in_flight = Some(task.clone());
        Some(task)
    }

    fn mark_complete(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Finished { .. } => self.completed += 1,
            ProgressEvent::Cancelled { .. } => self.cancelled += 1,
            ProgressEvent::Error { .. } => self.failed += 1,
            _ => return,
        }
        if self
            .in_flight
            .as_ref()
            .is_some_and(|t| t.id() == event.task_id())
        {
            self.in_flight = None;
        }
    }

    fn discard_pending(&mut self) -> Vec<Task> {
        self.pending.drain(..).collect()
    }

    pub fn remaining_duration(&self) -> f64 {
        self.in_flight
            .iter()
            .chain(self.pending.iter())
            .map(Task::duration_seconds)
            .sum()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            status: self.status,
            pending: self.pending.len(),
            in_flight: self.in_flight.as_ref().map(|t| t.id().to_string()),
            completed: self.completed,
            failed: self.failed,
            cancelled: self.cancelled,
            remaining_duration_seconds: self.remaining_duration(),
        }
    }
}

/// Runs tasks strictly one after another on a background tokio task.
pub struct QueueWorker<E: EventEmitter> {
    engine: Arc<dyn DownloadEngine>,
    emitter: E,
    cancel: CancellationFlag,
    queue: Arc<Mutex<TaskQueue>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<E: EventEmitter> QueueWorker<E> {
    pub fn new(engine: Arc<dyn DownloadEngine>, emitter: E) -> Self {
        Self::with_cancel_flag(engine, emitter, CancellationFlag::new())
    }

    /// Shares an existing flag, e.g. one already wired to Ctrl-C.
    pub fn with_cancel_flag(
        engine: Arc<dyn DownloadEngine>,
        emitter: E,
        cancel: CancellationFlag,
    ) -> Self {
        Self {
            engine,
            emitter,
            cancel,
            queue: Arc::new(Mutex::new(TaskQueue::default())),
            handle: Mutex::new(None),
        }
    }

    /// Starts a run over `tasks`. Returns `false` without doing anything when a
    /// run is already in progress or `tasks` is empty.
    pub async fn start(&self, tasks: Vec<Task>) -> bool {
        if tasks.is_empty() {
            tracing::debug!("queue start ignored: no tasks");
            return false;
        }

        {
            let mut q = self.queue.lock().await;
            if q.status == QueueStatus::Running {
                tracing::warn!("queue start ignored: already running");
                return false;
            }
            self.cancel.clear();
            tracing::info!("queue started with {} tasks", tasks.len());
            q.begin(tasks);
            self.emitter.emit_queue_state(&q.snapshot());
        }

        let run = run_queue(
            self.engine.clone(),
            self.emitter.clone(),
            self.cancel.clone(),
            self.queue.clone(),
        );
        *self.handle.lock().await = Some(tokio::spawn(run));
        true
    }

    pub fn cancel(&self) {
        tracing::info!("queue cancellation requested");
        self.cancel.set();
    }

    pub fn cancel_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.queue.lock().await.snapshot()
    }

    pub async fn status(&self) -> QueueStatus {
        self.queue.lock().await.status
    }

    pub async fn is_running(&self) -> bool {
        self.status().await == QueueStatus::Running
    }

    /// Waits for the current run, if any, to reach `Idle`.
    pub async fn wait(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("queue worker task failed: {}", e);
                let mut q = self.queue.lock().await;
                q.in_flight = None;
                q.discard_pending();
                q.status = QueueStatus::Idle;
            }
        }
    }
}

async fn run_queue<E: EventEmitter>(
    engine: Arc<dyn DownloadEngine>,
    emitter: E,
    cancel: CancellationFlag,
    queue: Arc<Mutex<TaskQueue>>,
) {
    loop {
        let task = {
            let mut q = queue.lock().await;
            if cancel.is_set() {
                for task in q.discard_pending() {
                    tracing::info!("discarding queued task {} ({})", task.id(), task.title());
                    let event = ProgressEvent::Cancelled {
                        task_id: task.id().to_string(),
                    };
                    q.mark_complete(&event);
                    emitter.emit_progress(&event);
                }
            }
            match q.next() {
                Some(task) => {
                    emitter.emit_queue_state(&q.snapshot());
                    task
                }
                None => {
                    q.status = QueueStatus::Idle;
                    let snapshot = q.snapshot();
                    tracing::info!(
                        "queue idle: {} completed, {} failed, {} cancelled",
                        snapshot.completed,
                        snapshot.failed,
                        snapshot.cancelled
                    );
                    emitter.emit_queue_state(&snapshot);
                    break;
                }
            }
        };

        let terminal = run_one(engine.as_ref(), &emitter, &task, &cancel).await;

        let mut q = queue.lock().await;
        q.mark_complete(&terminal);
        emitter.emit_queue_state(&q.snapshot());
    }
}

/// Executes one task, forwarding its progress to `emitter`, and returns the
/// terminal event. Events arriving after the terminal one are dropped.
async fn run_one<E: EventEmitter>(
    engine: &dyn DownloadEngine,
    emitter: &E,
    task: &Task,
    cancel: &CancellationFlag,
) -> ProgressEvent {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let forward = async {
        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            if terminal.is_some() || event.task_id() != task.id() {
                tracing::debug!("dropping stray event {:?}", event);
                continue;
            }
            emitter.emit_progress(&event);
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        terminal
    };

    let ((), terminal) = tokio::join!(engine.execute_task(task, tx, cancel), forward);

    terminal.unwrap_or_else(|| {
        let event = ProgressEvent::Error {
            task_id: task.id().to_string(),
            message: "download ended without a result".into(),
        };
        tracing::error!("{} ended without a terminal event", task.id());
        emitter.emit_progress(&event);
        event
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use vidqueue_core::core::events::{ChannelEmitter, QueueEvent};
    use vidqueue_core::models::media::{OutputFormat, Quality, ResolutionResult};

    use crate::core::error::EngineResult;

    /// Task ids starting with `fail` error out, `hang` waits for cancellation,
    /// everything else finishes after one progress tick.
    struct FakeEngine {
        started: std::sync::Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DownloadEngine for FakeEngine {
        async fn resolve(&self, _url: &str) -> ResolutionResult {
            ResolutionResult::Error {
                message: "not supported".into(),
            }
        }

        async fn execute_task(
            &self,
            task: &Task,
            progress: mpsc::UnboundedSender<ProgressEvent>,
            cancel: &CancellationFlag,
        ) {
            self.started.lock().unwrap().push(task.id().to_string());
            let task_id = task.id().to_string();

            if cancel.is_set() {
                let _ = progress.send(ProgressEvent::Cancelled { task_id });
                return;
            }

            let _ = progress.send(ProgressEvent::Downloading {
                task_id: task_id.clone(),
                percentage: Some(50.0),
                downloaded_bytes: 50,
                total_bytes: Some(100),
                speed_bytes_per_sec: None,
                eta_seconds: None,
            });

            let event = if task_id.starts_with("fail") {
                ProgressEvent::Error {
                    task_id,
                    message: "boom".into(),
                }
            } else if task_id.starts_with("hang") {
                cancel.cancelled().await;
                ProgressEvent::Cancelled { task_id }
            } else {
                ProgressEvent::Finished {
                    filename: format!("/out/{}.mp4", task_id),
                    task_id,
                }
            };
            let _ = progress.send(event);
        }

        fn output_path(&self) -> PathBuf {
            PathBuf::from("/out")
        }

        fn set_output_path(&self, path: &Path) -> EngineResult<PathBuf> {
            Ok(path.to_path_buf())
        }
    }

    fn task(id: &str) -> Task {
        Task::new(
            id,
            format!("https://example.com/watch?v={}", id),
            OutputFormat::Mp4,
            Quality::Best,
        )
        .unwrap()
        .with_duration(60.0)
    }

    fn terminals(events: &[QueueEvent]) -> Vec<ProgressEvent> {
        events
            .iter()
            .filter_map(|e| match e {
                QueueEvent::Progress(p) if p.is_terminal() => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn runs_all_tasks_in_order() {
        let engine = FakeEngine::new();
        let (emitter, mut rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(engine.clone(), emitter);

        assert!(worker.start(vec![task("a"), task("b"), task("c")]).await);
        worker.wait().await;

        let events = drain(&mut rx);
        let ids: Vec<String> = terminals(&events)
            .iter()
            .map(|e| e.task_id().to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(engine.started(), ["a", "b", "c"]);

        let snapshot = worker.snapshot().await;
        assert_eq!(snapshot.status, QueueStatus::Idle);
        assert_eq!(snapshot.completed, 3);
        assert_eq!(snapshot.remaining_duration_seconds, 0.0);
        assert!(matches!(
            events.last(),
            Some(QueueEvent::State(QueueSnapshot { status: QueueStatus::Idle, .. }))
        ));
    }

    #[tokio::test]
    async fn terminal_event_is_last_for_each_task() {
        let (emitter, mut rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(FakeEngine::new(), emitter);
        worker.start(vec![task("a"), task("b")]).await;
        worker.wait().await;

        let mut seen_terminal: Vec<String> = Vec::new();
        for event in drain(&mut rx) {
            if let QueueEvent::Progress(p) = event {
                assert!(!seen_terminal.contains(&p.task_id().to_string()));
                if p.is_terminal() {
                    seen_terminal.push(p.task_id().to_string());
                }
            }
        }
        assert_eq!(seen_terminal.len(), 2);
    }

    #[tokio::test]
    async fn cancel_after_first_finished_cancels_second() {
        let engine = FakeEngine::new();
        let (emitter, mut rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(engine.clone(), emitter);
        worker.start(vec![task("a"), task("hang-b")]).await;

        while let Some(event) = rx.recv().await {
            if matches!(event, QueueEvent::Progress(ProgressEvent::Finished { .. })) {
                worker.cancel();
                break;
            }
        }
        worker.wait().await;

        let mut events = vec![QueueEvent::Progress(ProgressEvent::Finished {
            task_id: "a".into(),
            filename: "/out/a.mp4".into(),
        })];
        events.extend(drain(&mut rx));
        let terminal = terminals(&events);
        assert_eq!(terminal.len(), 2);
        assert_eq!(
            terminal[1],
            ProgressEvent::Cancelled {
                task_id: "hang-b".into()
            }
        );
        assert!(!worker.is_running().await);
    }

    #[tokio::test]
    async fn cancel_stops_later_tasks_from_starting() {
        let engine = FakeEngine::new();
        let (emitter, mut rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(engine.clone(), emitter);
        worker
            .start(vec![task("a"), task("hang-b"), task("c"), task("d")])
            .await;

        while let Some(event) = rx.recv().await {
            if matches!(
                event,
                QueueEvent::Progress(ProgressEvent::Downloading { ref task_id, .. }) if task_id == "hang-b"
            ) {
                worker.cancel();
                break;
            }
        }
        worker.wait().await;

        assert_eq!(engine.started(), ["a", "hang-b"]);
        let snapshot = worker.snapshot().await;
        assert_eq!(snapshot.status, QueueStatus::Idle);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.cancelled, 3);
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test]
    async fn start_is_noop_when_empty_or_running() {
        let engine = FakeEngine::new();
        let (emitter, mut rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(engine.clone(), emitter);

        assert!(!worker.start(Vec::new()).await);
        assert!(!worker.is_running().await);

        assert!(worker.start(vec![task("hang-a")]).await);
        assert!(worker.is_running().await);
        assert!(!worker.start(vec![task("b")]).await);

        while let Some(event) = rx.recv().await {
            if matches!(event, QueueEvent::Progress(ProgressEvent::Downloading { .. })) {
                break;
            }
        }
        worker.cancel();
        worker.wait().await;
        assert_eq!(engine.started(), ["hang-a"]);
    }

    #[tokio::test]
    async fn failed_task_does_not_block_queue() {
        let (emitter, mut rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(FakeEngine::new(), emitter);
        worker.start(vec![task("fail-a"), task("b")]).await;
        worker.wait().await;

        let terminal = terminals(&drain(&mut rx));
        assert!(matches!(terminal[0], ProgressEvent::Error { .. }));
        assert!(matches!(terminal[1], ProgressEvent::Finished { .. }));
        let snapshot = worker.snapshot().await;
        assert_eq!((snapshot.completed, snapshot.failed), (1, 1));
    }

    #[tokio::test]
    async fn restart_clears_previous_cancellation() {
        let engine = FakeEngine::new();
        let (emitter, _rx) = ChannelEmitter::new();
        let worker = QueueWorker::new(engine.clone(), emitter);
        worker.cancel();
        assert!(worker.cancel_flag().is_set());

        worker.start(vec![task("a")]).await;
        worker.wait().await;
        assert_eq!(worker.snapshot().await.completed, 1);
    }

    #[test]
    fn snapshot_tracks_remaining_duration() {
        let mut q = TaskQueue::default();
        q.begin(vec![task("a"), task("b")]);
        assert_eq!(q.snapshot().remaining_duration_seconds, 120.0);
        let current = q.next().unwrap();
        q.mark_complete(&ProgressEvent::Finished {
            task_id: current.id().to_string(),
            filename: "x".into(),
        });
        let snapshot = q.snapshot();
        assert_eq!(snapshot.remaining_duration_seconds, 60.0);
        assert_eq!(snapshot.pending, 1);
        assert_eq!(snapshot.in_flight, None);
    }
}
