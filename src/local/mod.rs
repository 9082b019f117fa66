//! Local folder tracking: notify watcher, per-path debounce, change sink.

pub mod debounce;
pub mod watcher;

pub use debounce::{DebounceCoalescer, SuffixFilter};
pub use watcher::LocalWatcher;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::changes::ChangeSink;
use crate::config::LocalWatchConfig;

const CONSUMER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running local tracker. Dropping it stops the watcher and discards any
/// bursts that have not settled yet.
pub struct LocalTracker {
    watcher: LocalWatcher,
    coalescer: Arc<DebounceCoalescer>,
    consumer: JoinHandle<()>,
}

impl LocalTracker {
    /// Start watching `config.folder`. Must be called inside a tokio runtime.
    pub fn start(config: &LocalWatchConfig, sink: &ChangeSink) -> Result<Self> {
        let folder = config
            .folder
            .as_deref()
            .context("[local].folder is not set")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let coalescer = Arc::new(DebounceCoalescer::new(
            config.settle_window(),
            SuffixFilter::new(config.tracked_extension.clone()),
            tx,
        ));
        let watcher = LocalWatcher::watch(folder, Arc::clone(&coalescer))?;
        let consumer = sink.spawn_consumer(rx);

        Ok(Self {
            watcher,
            coalescer,
            consumer,
        })
    }

    pub fn pending(&self) -> usize {
        self.coalescer.pending_count()
    }

    /// Stop watching. Unsettled bursts are dropped; records already settled
    /// are drained into the sink before this returns.
    pub async fn shutdown(self) {
        let Self {
            watcher,
            coalescer,
            consumer,
        } = self;
        tracing::info!("local_watch: stopping watch on {}", watcher.root().display());
        drop(watcher);
        coalescer.cancel_all();
        // The watcher closure holds the other coalescer clone; once both are
        // gone the channel closes and the consumer finishes.
        drop(coalescer);
        match tokio::time::timeout(CONSUMER_DRAIN_TIMEOUT, consumer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("local_watch: consumer task failed: {e}"),
            Err(_) => tracing::warn!("local_watch: consumer did not drain in time"),
        }
    }
}
