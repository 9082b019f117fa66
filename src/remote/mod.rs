//! Remote folder tracking over a cursor-based delta feed.
//!
//! A pass fetches everything since the committed cursor, classifies it
//! against the record store, commits the new cursor and store together, and
//! only then emits the classified changes.

pub mod context;
pub mod reconcile;
pub mod record;
pub mod tracker;

pub use context::SyncContext;
pub use reconcile::{Reconciler, Reconciliation, UNKNOWN_SUBJECT};
pub use record::{RecordFile, RecordStore, SyncState};
pub use tracker::{PassError, PassSummary, RemoteTracker};

use std::sync::Arc;

use anyhow::{Context, Result};
use changewatch_delta::GraphDeltaClient;

use crate::changes::ChangeSink;
use crate::config::{Config, ACCESS_TOKEN_ENV};

/// Build a Graph client for `[remote]`, with the configured token installed.
pub async fn graph_client(config: &Config) -> Result<GraphDeltaClient> {
    let remote = &config.remote;
    let token = remote.access_token.clone().with_context(|| {
        format!("no access token: set {ACCESS_TOKEN_ENV} or [remote].access_token")
    })?;
    let client = GraphDeltaClient::new(remote.folder.clone(), remote.drive_user.clone())
        .with_base_url(remote.graph_base_url.clone());
    client.set_access_token(token).await;
    Ok(client)
}

/// Wire up a tracker for `[remote]`: Graph client, committed state, sink.
pub async fn connect(config: &Config, sink: ChangeSink) -> Result<RemoteTracker> {
    let client = graph_client(config).await?;
    let ctx = SyncContext::open(RecordFile::new(config.record_file_path())).await?;
    let reconciler = Reconciler::new(config.remote.effective_skip_prefix());
    tracing::info!(
        "remote_sync: tracking {} (skip prefix: {})",
        config.remote.folder,
        reconciler.skip_prefix().unwrap_or("none")
    );
    Ok(
        RemoteTracker::new(Arc::new(client), Arc::new(ctx), reconciler, sink)
            .with_baseline_on_first_run(config.remote.baseline_on_first_run),
    )
}
