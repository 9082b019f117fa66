//! Last-known `id -> name` view of the remote folder, and its on-disk file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use changewatch_delta::SyncCursor;
use serde::{Deserialize, Serialize};

/// Snapshot of what the remote folder contained after the last committed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordStore {
    items: HashMap<String, String>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.items.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.items.insert(id.into(), name.into());
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.items.remove(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for RecordStore {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Everything a pass commits: the cursor to resume from and the record
/// store it was derived with. Always persisted and swapped as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<SyncCursor>,
    #[serde(default)]
    pub record: RecordStore,
}

/// JSON file holding the committed [`SyncState`]. Saves are atomic: write a
/// sibling temp file, then rename over the target.
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the committed state. Returns `None` if nothing was committed yet.
    pub async fn load(&self) -> Result<Option<SyncState>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read record file {}", self.path.display()))
            }
        };
        if content.trim().is_empty() {
            return Ok(Some(SyncState::default()));
        }
        let state = serde_json::from_str(&content)
            .with_context(|| format!("corrupt record file {}", self.path.display()))?;
        Ok(Some(state))
    }

    pub async fn save(&self, state: &SyncState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
