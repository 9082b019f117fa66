use std::sync::Arc;
use std::time::Duration;

use changewatch_delta::{DeltaFeed, FeedError, FeedErrorKind};
use thiserror::Error;

use super::context::SyncContext;
use super::reconcile::Reconciler;
use super::record::SyncState;
use crate::changes::ChangeSink;

/// Why a reconciliation pass did not commit.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("delta feed: {0}")]
    Feed(#[from] FeedError),
    #[error("commit failed: {0:#}")]
    Persist(anyhow::Error),
}

impl PassError {
    /// The feed rejected our credentials; retrying will not help.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Feed(e) if e.requires_reauth())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Feed(FeedError::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Feed(e) => e.kind() == FeedErrorKind::Transient,
            Self::Persist(_) => true,
        }
    }
}

/// Outcome of a committed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Records handed to the sink.
    pub emitted: usize,
    pub skipped: usize,
    /// The pass seeded the store instead of classifying.
    pub baseline: bool,
    /// Items in the store after the pass.
    pub tracked: usize,
}

/// One tracked remote folder: feed, committed state, classifier, sink.
pub struct RemoteTracker {
    feed: Arc<dyn DeltaFeed>,
    ctx: Arc<SyncContext>,
    reconciler: Reconciler,
    sink: ChangeSink,
    baseline_on_first_run: bool,
}

impl RemoteTracker {
    pub fn new(
        feed: Arc<dyn DeltaFeed>,
        ctx: Arc<SyncContext>,
        reconciler: Reconciler,
        sink: ChangeSink,
    ) -> Self {
        Self {
            feed,
            ctx,
            reconciler,
            sink,
            baseline_on_first_run: true,
        }
    }

    pub fn with_baseline_on_first_run(mut self, enabled: bool) -> Self {
        self.baseline_on_first_run = enabled;
        self
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Fetch, classify, commit, then emit.
    ///
    /// Nothing is emitted and nothing changes unless the new cursor and store
    /// were committed together.
    pub async fn run_pass(&self) -> Result<PassSummary, PassError> {
        let current = self.ctx.snapshot().await;
        let page = self.feed.fetch(current.cursor.as_ref()).await?;

        if current.cursor.is_none() && self.baseline_on_first_run {
            let record = self.reconciler.baseline(&page);
            let tracked = record.len();
            self.ctx
                .commit(SyncState {
                    cursor: Some(page.next_cursor),
                    record,
                })
                .await
                .map_err(PassError::Persist)?;
            tracing::info!(
                "remote_sync: baseline of {} taken, tracking {tracked} items",
                self.feed.folder()
            );
            return Ok(PassSummary {
                baseline: true,
                tracked,
                ..PassSummary::default()
            });
        }

        let outcome = self.reconciler.reconcile(&page, &current.record);
        let tracked = outcome.record.len();
        self.ctx
            .commit(SyncState {
                cursor: Some(outcome.cursor),
                record: outcome.record,
            })
            .await
            .map_err(PassError::Persist)?;

        let emitted = outcome.changes.len();
        for change in outcome.changes {
            self.sink.emit(change).await;
        }
        if emitted > 0 {
            tracing::info!(
                "remote_sync: {emitted} changes in {} ({} skipped)",
                self.feed.folder(),
                outcome.skipped
            );
        } else {
            tracing::debug!("remote_sync: no changes in {}", self.feed.folder());
        }

        Ok(PassSummary {
            emitted,
            skipped: outcome.skipped,
            baseline: false,
            tracked,
        })
    }
}
