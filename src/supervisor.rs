//! Periodic task supervisor.
//!
//! Keeps a typed registry of `task_id -> TaskHandle`. Each active handle owns
//! one tokio loop that runs a pass on a fixed cadence until its cancellation
//! token fires. Cancellation is observed at tick boundaries only; a pass that
//! is already running is allowed to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::remote::{PassError, PassSummary, RemoteTracker};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Work a supervised loop runs once per tick.
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    async fn run_pass(&self) -> Result<PassSummary, PassError>;
}

#[async_trait]
impl PeriodicJob for RemoteTracker {
    async fn run_pass(&self) -> Result<PassSummary, PassError> {
        RemoteTracker::run_pass(self).await
    }
}

/// Pass counters for one task id.
#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    pub passes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub emitted: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub needs_reauth: bool,
}

impl TaskStats {
    fn record(&mut self, result: &Result<PassSummary, PassError>) {
        self.passes += 1;
        match result {
            Ok(summary) => {
                self.consecutive_failures = 0;
                self.emitted += summary.emitted as u64;
                self.last_success = Some(Utc::now());
                self.last_error = None;
                self.needs_reauth = false;
            }
            Err(e) => {
                self.failures += 1;
                self.consecutive_failures += 1;
                self.last_error = Some(e.to_string());
                self.needs_reauth = e.requires_reauth();
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub task_id: String,
    pub active: bool,
    pub stats: TaskStats,
}

/// Registry entry for one supervised loop.
struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
    stats: Arc<Mutex<TaskStats>>,
    /// Shared across restarts of the same id so passes never overlap.
    pass_gate: Arc<tokio::sync::Mutex<()>>,
}

impl TaskHandle {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.join.is_finished()
    }
}

pub struct TaskSupervisor {
    tasks: Mutex<HashMap<String, TaskHandle>>,
    interval: Duration,
    grace: Duration,
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, DEFAULT_SHUTDOWN_GRACE)
    }
}

impl TaskSupervisor {
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            interval,
            grace,
        }
    }

    /// Start a loop for `task_id` unless one is already active.
    ///
    /// Returns `true` if a loop was started. A stopped id may be started
    /// again; its counters carry over.
    pub fn start(&self, task_id: &str, job: Arc<dyn PeriodicJob>) -> bool {
        let mut tasks = self.tasks.lock();
        let (stats, pass_gate) = match tasks.get(task_id) {
            Some(existing) if existing.is_active() => {
                tracing::debug!("supervisor: task {task_id} already running");
                return false;
            }
            Some(existing) => (Arc::clone(&existing.stats), Arc::clone(&existing.pass_gate)),
            None => (
                Arc::new(Mutex::new(TaskStats::default())),
                Arc::new(tokio::sync::Mutex::new(())),
            ),
        };

        let token = CancellationToken::new();
        let join = tokio::spawn(run_loop(
            task_id.to_string(),
            job,
            self.interval,
            token.clone(),
            Arc::clone(&stats),
            Arc::clone(&pass_gate),
        ));
        tasks.insert(
            task_id.to_string(),
            TaskHandle {
                token,
                join,
                stats,
                pass_gate,
            },
        );
        tracing::info!(
            "supervisor: started task {task_id} (every {}ms)",
            self.interval.as_millis()
        );
        true
    }

    /// Mark `task_id` inactive. Returns `true` if it was active.
    pub fn stop(&self, task_id: &str) -> bool {
        let tasks = self.tasks.lock();
        match tasks.get(task_id) {
            Some(handle) if handle.is_active() => {
                handle.token.cancel();
                tracing::info!("supervisor: stopping task {task_id}");
                true
            }
            _ => false,
        }
    }

    /// Stop every task and wait up to the grace period for their loops to exit.
    ///
    /// Returns `true` if all loops exited in time.
    pub async fn stop_all(&self) -> bool {
        let handles: Vec<(String, TaskHandle)> = self.tasks.lock().drain().collect();
        if handles.is_empty() {
            return true;
        }
        for (_, handle) in &handles {
            handle.token.cancel();
        }
        let count = handles.len();
        let joins = handles.into_iter().map(|(_, h)| h.join);
        match tokio::time::timeout(self.grace, join_all(joins)).await {
            Ok(_) => {
                tracing::info!("supervisor: {count} task(s) stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    "supervisor: tasks still running after {}ms grace, leaving them",
                    self.grace.as_millis()
                );
                false
            }
        }
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.tasks
            .lock()
            .get(task_id)
            .is_some_and(TaskHandle::is_active)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.lock().values().filter(|h| h.is_active()).count()
    }

    pub fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.lock().get(task_id).map(|h| TaskStatus {
            task_id: task_id.to_string(),
            active: h.is_active(),
            stats: h.stats.lock().clone(),
        })
    }
}

async fn run_loop(
    task_id: String,
    job: Arc<dyn PeriodicJob>,
    interval: Duration,
    token: CancellationToken,
    stats: Arc<Mutex<TaskStats>>,
    pass_gate: Arc<tokio::sync::Mutex<()>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if token.is_cancelled() {
            break;
        }

        // A previous loop for this id may still be finishing its pass.
        let gate = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            gate = pass_gate.lock() => gate,
        };
        let result = job.run_pass().await;
        drop(gate);
        stats.lock().record(&result);

        match result {
            Ok(summary) => {
                tracing::debug!(
                    "supervisor: task {task_id} pass ok ({} emitted, {} tracked)",
                    summary.emitted,
                    summary.tracked
                );
            }
            Err(e) if e.requires_reauth() => {
                tracing::error!("supervisor: task {task_id} needs re-authentication: {e}");
            }
            Err(e) => {
                tracing::warn!("supervisor: task {task_id} pass failed: {e}");
                if let Some(wait) = e.retry_after().filter(|w| *w > interval) {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                    ticker.reset();
                }
            }
        }
    }
    tracing::debug!("supervisor: task {task_id} loop exited");
}
