//! Per-path debounce of raw filesystem notifications.
//!
//! Every raw event for a path cancels that path's pending timer and arms a
//! new one `settle_window` out, carrying the latest event kind. When a timer
//! runs to its deadline the path is settled: a [`ChangeRecord`] is emitted if
//! the path carries the tracked suffix, and the timer is discarded either way.
//!
//! Timers are lightweight tokio tasks. The pending map lock is held only to
//! swap entries, never across an await, so unrelated paths do not contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::changes::{ChangeKind, ChangeRecord};

/// Only paths ending in `suffix` are significant. An empty suffix admits all.
#[derive(Debug, Clone)]
pub struct SuffixFilter {
    suffix: String,
}

impl SuffixFilter {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(&self.suffix)
    }
}

struct PendingTimer {
    generation: u64,
    scheduled_fire: Instant,
    last_kind: ChangeKind,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<PathBuf, PendingTimer>>>;

/// Collapses bursts of raw events into one record per path per settle window.
pub struct DebounceCoalescer {
    settle_window: Duration,
    filter: SuffixFilter,
    pending: PendingMap,
    generation: AtomicU64,
    runtime: Handle,
    out: UnboundedSender<ChangeRecord>,
}

impl DebounceCoalescer {
    /// Must be called from within a tokio runtime; timers are spawned on it
    /// even when `record` is later called from a foreign thread.
    pub fn new(
        settle_window: Duration,
        filter: SuffixFilter,
        out: UnboundedSender<ChangeRecord>,
    ) -> Self {
        Self::with_runtime(settle_window, filter, out, Handle::current())
    }

    pub fn with_runtime(
        settle_window: Duration,
        filter: SuffixFilter,
        out: UnboundedSender<ChangeRecord>,
        runtime: Handle,
    ) -> Self {
        Self {
            settle_window,
            filter,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            runtime,
            out,
        }
    }

    /// Register one raw notification for `path`.
    pub fn record(&self, path: impl Into<PathBuf>, kind: ChangeKind) {
        let path = path.into();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        // Read the clock of the runtime the timers live on.
        let _ctx = self.runtime.enter();
        let deadline = Instant::now() + self.settle_window;

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.remove(&path) {
            previous.handle.abort();
        }
        let handle = self.runtime.spawn(settle(
            Arc::clone(&self.pending),
            path.clone(),
            generation,
            deadline,
            self.filter.clone(),
            self.out.clone(),
        ));
        pending.insert(
            path,
            PendingTimer {
                generation,
                scheduled_fire: deadline,
                last_kind: kind,
                handle,
            },
        );
    }

    /// Number of paths with an armed timer.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Kind and deadline of the pending timer for `path`, if any.
    pub fn pending_for(&self, path: &Path) -> Option<(ChangeKind, Instant)> {
        self.pending
            .lock()
            .get(path)
            .map(|t| (t.last_kind, t.scheduled_fire))
    }

    /// Cancel every pending timer without emitting.
    pub fn cancel_all(&self) {
        let drained: Vec<PendingTimer> = self.pending.lock().drain().map(|(_, t)| t).collect();
        if !drained.is_empty() {
            tracing::debug!("local_watch: dropped {} pending timers", drained.len());
        }
        for timer in drained {
            timer.handle.abort();
        }
    }
}

impl Drop for DebounceCoalescer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn settle(
    pending: PendingMap,
    path: PathBuf,
    generation: u64,
    deadline: Instant,
    filter: SuffixFilter,
    out: UnboundedSender<ChangeRecord>,
) {
    tokio::time::sleep_until(deadline).await;

    let kind = {
        let mut map = pending.lock();
        // A newer event may have replaced us between wake-up and lock.
        if map.get(&path).map(|t| t.generation) != Some(generation) {
            return;
        }
        match map.remove(&path) {
            Some(timer) => timer.last_kind,
            None => return,
        }
    };

    if !filter.matches(&path) {
        tracing::trace!("local_watch: settled {} (untracked)", path.display());
        return;
    }
    tracing::debug!("local_watch: settled {} as {kind}", path.display());
    let record = ChangeRecord::local(kind, path.to_string_lossy());
    if out.send(record).is_err() {
        tracing::warn!(
            "local_watch: change consumer is gone, dropping {kind} {}",
            path.display()
        );
    }
}
