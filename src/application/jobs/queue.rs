//! In-process background task queue.
//!
//! Handlers submit work without waiting on it; a single worker drains the
//! bounded channel and runs up to `concurrency` tasks at once. Recompute
//! requests coalesce: while one is waiting in the queue further requests are
//! absorbed, and runs are serialized so at most one executes at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::application::recommendations::{RecomputeOutcome, RecommendationService};
use crate::domain::entities::UserRecommendationSet;

const METRIC_TASK_DROPPED: &str = "trendline_task_dropped_total";
const METRIC_TASK_COALESCED: &str = "trendline_task_coalesced_total";
const METRIC_TASK_COMPLETED: &str = "trendline_task_completed_total";

/// Why a recompute was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeTrigger {
    Api,
    Schedule,
}

impl RecomputeTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RecomputeTrigger::Api => "api",
            RecomputeTrigger::Schedule => "schedule",
        }
    }
}

#[derive(Debug, Clone)]
pub enum BackgroundTask {
    /// Persist and cache a user's full list.
    SaveRecommendations(UserRecommendationSet),
    RecalculateAll { trigger: RecomputeTrigger },
}

impl BackgroundTask {
    pub fn kind(&self) -> &'static str {
        match self {
            BackgroundTask::SaveRecommendations(_) => "save_recommendations",
            BackgroundTask::RecalculateAll { .. } => "recalculate_all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// A recompute is already waiting; this request was absorbed by it.
    Coalesced,
    /// The queue was full.
    Dropped,
    /// The worker has shut down.
    Closed,
}

/// Cloneable submission handle.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<BackgroundTask>,
    recompute_pending: Arc<AtomicBool>,
}

/// Receiving half, consumed by [`spawn_task_worker`].
pub struct TaskReceiver {
    receiver: mpsc::Receiver<BackgroundTask>,
    recompute_pending: Arc<AtomicBool>,
}

/// Create a queue holding at most `capacity` pending tasks.
pub fn task_queue(capacity: usize) -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let recompute_pending = Arc::new(AtomicBool::new(false));
    (
        TaskQueue {
            sender,
            recompute_pending: recompute_pending.clone(),
        },
        TaskReceiver {
            receiver,
            recompute_pending,
        },
    )
}

impl TaskQueue {
    /// Enqueue without waiting. Never blocks the caller.
    pub fn submit(&self, task: BackgroundTask) -> SubmitOutcome {
        let kind = task.kind();
        let is_recompute = matches!(task, BackgroundTask::RecalculateAll { .. });

        if is_recompute && self.recompute_pending.swap(true, Ordering::AcqRel) {
            counter!(METRIC_TASK_COALESCED, "kind" => kind).increment(1);
            info!(
                target = "trendline::jobs",
                kind, "Recompute already pending; request coalesced"
            );
            return SubmitOutcome::Coalesced;
        }

        match self.sender.try_send(task) {
            Ok(()) => SubmitOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                if is_recompute {
                    self.recompute_pending.store(false, Ordering::Release);
                }
                counter!(METRIC_TASK_DROPPED, "kind" => kind).increment(1);
                warn!(
                    target = "trendline::jobs",
                    kind, "Background task queue full; task dropped"
                );
                SubmitOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                if is_recompute {
                    self.recompute_pending.store(false, Ordering::Release);
                }
                warn!(
                    target = "trendline::jobs",
                    kind, "Background task queue closed; task discarded"
                );
                SubmitOutcome::Closed
            }
        }
    }
}

/// Running worker. Dropping the handle leaves the worker running until every
/// [`TaskQueue`] clone is gone.
pub struct TaskWorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskWorkerHandle {
    /// Stop accepting tasks, run what is already queued, and wait for
    /// in-flight tasks up to `grace`. Returns `false` when the grace period
    /// elapsed or the worker panicked.
    pub async fn shutdown(self, grace: Duration) -> bool {
        let _ = self.shutdown.send(true);
        match tokio::time::timeout(grace, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                error!(target = "trendline::jobs", error = %err, "Task worker failed");
                false
            }
            Err(_) => {
                warn!(
                    target = "trendline::jobs",
                    grace_secs = grace.as_secs(),
                    "Task worker did not drain before the shutdown deadline"
                );
                false
            }
        }
    }
}

pub fn spawn_task_worker(
    receiver: TaskReceiver,
    service: Arc<RecommendationService>,
    concurrency: usize,
) -> TaskWorkerHandle {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let worker = TaskWorker {
        receiver: receiver.receiver,
        recompute_pending: receiver.recompute_pending,
        recompute_lock: Arc::new(Mutex::new(())),
        service,
        permits: Arc::new(Semaphore::new(concurrency.max(1))),
        in_flight: JoinSet::new(),
    };
    let join = tokio::spawn(worker.run(shutdown_rx));
    TaskWorkerHandle { shutdown, join }
}

struct TaskWorker {
    receiver: mpsc::Receiver<BackgroundTask>,
    recompute_pending: Arc<AtomicBool>,
    recompute_lock: Arc<Mutex<()>>,
    service: Arc<RecommendationService>,
    permits: Arc<Semaphore>,
    in_flight: JoinSet<()>,
}

impl TaskWorker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut watching = true;
        loop {
            tokio::select! {
                changed = shutdown.changed(), if watching => {
                    if changed.is_ok() {
                        self.receiver.close();
                        break;
                    }
                    // Handle dropped without a shutdown request.
                    watching = false;
                }
                task = self.receiver.recv() => match task {
                    Some(task) => self.dispatch(task).await,
                    None => break,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    log_join(joined);
                }
            }
        }

        while let Some(task) = self.receiver.recv().await {
            self.dispatch(task).await;
        }
        while let Some(joined) = self.in_flight.join_next().await {
            log_join(joined);
        }
        info!(target = "trendline::jobs", "Task worker drained");
    }

    async fn dispatch(&mut self, task: BackgroundTask) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        let service = self.service.clone();
        let pending = self.recompute_pending.clone();
        let lock = self.recompute_lock.clone();

        self.in_flight.spawn(async move {
            let _permit = permit;
            let kind = task.kind();
            match task {
                BackgroundTask::SaveRecommendations(set) => {
                    service.save_user_recommendations(&set).await;
                }
                BackgroundTask::RecalculateAll { trigger } => {
                    let _running = lock.lock().await;
                    pending.store(false, Ordering::Release);
                    let report = service.recalculate_all_users().await;
                    if report.outcome != RecomputeOutcome::Completed {
                        warn!(
                            target = "trendline::jobs",
                            trigger = trigger.as_str(),
                            outcome = ?report.outcome,
                            "Recompute did not complete"
                        );
                    }
                }
            }
            counter!(METRIC_TASK_COMPLETED, "kind" => kind).increment(1);
        });
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        error!(target = "trendline::jobs", error = %err, "Background task panicked");
    }
}
