//! Per-key run dispatcher.
//!
//! Each (project, asset-class) key gets one queue and one task, so runs for
//! the same key execute strictly one after another while different keys run
//! concurrently. Runs are blocking and execute on `spawn_blocking`.
//!
//! A key worker that sees no job for the idle timeout closes its queue,
//! finishes anything already queued and removes itself. A submitter that
//! races with that sees a closed queue and retries once on a fresh worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use rendition_core::SnapshotKey;
use rendition_sync::{Coordinator, ReconcileRequest, ReconciliationResult};

use crate::error::WorkerError;

const DEFAULT_QUEUE_DEPTH: usize = 32;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

type WorkerMap = Arc<Mutex<HashMap<SnapshotKey, KeyWorker>>>;

struct RunJob {
    request: ReconcileRequest,
    respond_to: oneshot::Sender<Result<ReconciliationResult, WorkerError>>,
}

struct KeyWorker {
    generation: u64,
    sender: mpsc::Sender<RunJob>,
    handle: JoinHandle<()>,
}

/// Snapshot of dispatcher state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DispatcherStatus {
    pub started_at_unix: u64,
    pub keys: Vec<String>,
    pub shut_down: bool,
}

impl DispatcherStatus {
    pub fn to_json(&self) -> Result<String, WorkerError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serializes runs per [`SnapshotKey`].
pub struct Dispatcher {
    coordinator: Arc<Coordinator>,
    workers: WorkerMap,
    shutdown_tx: broadcast::Sender<()>,
    shut_down: AtomicBool,
    queue_depth: usize,
    idle_timeout: Duration,
    next_generation: AtomicU64,
    started_at_unix: u64,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self::with_queue_depth(coordinator, DEFAULT_QUEUE_DEPTH)
    }

    /// `queue_depth` bounds pending runs per key; submitters wait when full.
    pub fn with_queue_depth(coordinator: Arc<Coordinator>, queue_depth: usize) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            coordinator,
            workers: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
            shut_down: AtomicBool::new(false),
            queue_depth: queue_depth.max(1),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            next_generation: AtomicU64::new(0),
            started_at_unix: unix_seconds_now(),
        }
    }

    /// How long a key worker waits for a job before retiring.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Queue a run and wait for its result.
    ///
    /// Requests without a usable key fail in the coordinator's first state
    /// and are run directly.
    pub async fn submit(&self, request: ReconcileRequest) -> Result<ReconciliationResult, WorkerError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(WorkerError::Shutdown);
        }
        let Ok(key) = request.key() else {
            let coordinator = self.coordinator.clone();
            return Ok(tokio::task::spawn_blocking(move || coordinator.run(&request)).await?);
        };

        let (respond_to, response) = oneshot::channel();
        let mut job = RunJob {
            request,
            respond_to,
        };
        let mut retired = false;
        loop {
            let sender = self.worker_for(&key).await?;
            match sender.send(job).await {
                Ok(()) => break,
                // Retired between lookup and send: its sender is now closed,
                // so the next lookup spawns a fresh worker.
                Err(mpsc::error::SendError(returned)) if !retired => {
                    retired = true;
                    job = returned;
                }
                Err(_) => return Err(WorkerError::ChannelClosed("key queue")),
            }
        }
        response
            .await
            .map_err(|_| WorkerError::ChannelClosed("run result"))?
    }

    async fn worker_for(&self, key: &SnapshotKey) -> Result<mpsc::Sender<RunJob>, WorkerError> {
        let mut workers = self.workers.lock().await;
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(WorkerError::Shutdown);
        }
        if let Some(worker) = workers.get(key) {
            if !worker.sender.is_closed() {
                return Ok(worker.sender.clone());
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_depth);
        let handle = tokio::spawn(key_worker(
            KeyTask {
                key: key.clone(),
                generation,
                coordinator: self.coordinator.clone(),
                workers: self.workers.clone(),
                idle_timeout: self.idle_timeout,
            },
            receiver,
            self.shutdown_tx.subscribe(),
        ));
        tracing::debug!(key = %key, generation, "spawned key worker");
        workers.insert(
            key.clone(),
            KeyWorker {
                generation,
                sender: sender.clone(),
                handle,
            },
        );
        Ok(sender)
    }

    /// Stop every key worker. A run already executing finishes first;
    /// queued runs are dropped and their submitters see `ChannelClosed`.
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        self.shut_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let workers: Vec<(SnapshotKey, KeyWorker)> = self.workers.lock().await.drain().collect();
        let mut first_err = None;
        for (key, worker) in workers {
            drop(worker.sender);
            if let Err(err) = worker.handle.await {
                tracing::error!(key = %key, error = %err, "key worker join failure");
                first_err.get_or_insert(WorkerError::from(err));
            }
        }
        tracing::info!("dispatcher stopped");
        first_err.map_or(Ok(()), Err)
    }

    pub async fn status(&self) -> DispatcherStatus {
        let workers = self.workers.lock().await;
        let mut keys: Vec<String> = workers.keys().map(|k| k.to_string()).collect();
        keys.sort();
        DispatcherStatus {
            started_at_unix: self.started_at_unix,
            keys,
            shut_down: self.shut_down.load(Ordering::SeqCst),
        }
    }
}

/// What a key worker needs besides its channels.
struct KeyTask {
    key: SnapshotKey,
    generation: u64,
    coordinator: Arc<Coordinator>,
    workers: WorkerMap,
    idle_timeout: Duration,
}

impl KeyTask {
    async fn execute(&self, job: RunJob) {
        let started = Instant::now();
        let coordinator = self.coordinator.clone();
        let request = job.request;
        let outcome = tokio::task::spawn_blocking(move || coordinator.run(&request))
            .await
            .map_err(WorkerError::from);

        match &outcome {
            Ok(result) => tracing::info!(
                key = %self.key,
                success = result.success,
                changed = result.changed,
                warnings = result.warning_log.len(),
                errors = result.error_log.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "run finished"
            ),
            Err(err) => tracing::error!(key = %self.key, error = %err, "run aborted"),
        }
        let _ = job.respond_to.send(outcome);
    }
}

async fn key_worker(
    task: KeyTask,
    mut jobs: mpsc::Receiver<RunJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = jobs.recv() => {
                let Some(job) = maybe_job else { break };
                task.execute(job).await;
            }
            _ = tokio::time::sleep(task.idle_timeout) => {
                jobs.close();
                while let Some(job) = jobs.recv().await {
                    task.execute(job).await;
                }
                let mut workers = task.workers.lock().await;
                if workers
                    .get(&task.key)
                    .is_some_and(|worker| worker.generation == task.generation)
                {
                    workers.remove(&task.key);
                }
                tracing::debug!(key = %task.key, "key worker retired after idle timeout");
                return;
            }
        }
    }
    tracing::debug!(key = %task.key, "key worker exiting");
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
