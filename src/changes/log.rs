use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::ChangeRecord;

/// Append-only JSON-lines log of change records.
///
/// Appends are serialized through an internal lock so records from the
/// local and remote producers land whole and in emission order.
#[derive(Debug)]
pub struct ChangeLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ChangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the log file (and parent directories) if it does not exist.
    pub async fn ensure_exists(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to create change log {}", self.path.display()))?;
        Ok(())
    }

    pub async fn append(&self, record: &ChangeRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open change log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Read every record in append order. A missing log reads as empty;
    /// unparseable lines are skipped with a warning.
    pub async fn load(&self) -> Result<Vec<ChangeRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read change log {}", self.path.display()))
            }
        };

        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChangeRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "change_log: skipping corrupt line {} in {}: {e}",
                    idx + 1,
                    self.path.display()
                ),
            }
        }
        Ok(records)
    }
}
