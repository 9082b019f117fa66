use anyhow::Result;
use changewatch_delta::SyncCursor;
use tokio::sync::RwLock;

use super::record::{RecordFile, RecordStore, SyncState};

/// Owner of the committed cursor and record store for one tracked folder.
///
/// Created once at startup and shared by reference with the tracker and the
/// supervisor. The only way to change state is [`SyncContext::commit`], which
/// persists first and swaps the in-memory copy only once the write landed.
pub struct SyncContext {
    state: RwLock<SyncState>,
    file: RecordFile,
}

impl SyncContext {
    /// Load committed state from `file`, or start empty if none exists.
    pub async fn open(file: RecordFile) -> Result<Self> {
        let state = match file.load().await? {
            Some(state) => {
                tracing::info!(
                    "remote_sync: resumed {} tracked items from {}{}",
                    state.record.len(),
                    file.path().display(),
                    if state.cursor.is_some() { "" } else { " (no cursor)" }
                );
                state
            }
            None => SyncState::default(),
        };
        Ok(Self {
            state: RwLock::new(state),
            file,
        })
    }

    pub async fn snapshot(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn cursor(&self) -> Option<SyncCursor> {
        self.state.read().await.cursor.clone()
    }

    pub async fn record(&self) -> RecordStore {
        self.state.read().await.record.clone()
    }

    /// Persist `next` and make it current. On error nothing changes.
    pub async fn commit(&self, next: SyncState) -> Result<()> {
        let mut state = self.state.write().await;
        self.file.save(&next).await?;
        *state = next;
        Ok(())
    }

    /// Forget the cursor so the next pass starts from a full snapshot.
    pub async fn reset_cursor(&self) -> Result<()> {
        let record = self.record().await;
        self.commit(SyncState {
            cursor: None,
            record,
        })
        .await
    }
}
