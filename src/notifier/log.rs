use anyhow::Result;
use async_trait::async_trait;

use super::Notifier;
use crate::changes::ChangeRecord;

/// Reports each change as a structured `info` event.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, record: &ChangeRecord) -> Result<()> {
        tracing::info!(
            kind = %record.kind,
            source = %record.source,
            at = %record.timestamp.to_rfc3339(),
            "notifier: {} {}",
            record.kind,
            record.subject
        );
        Ok(())
    }
}
