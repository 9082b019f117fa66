use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ChangeLog, ChangeRecord};
use crate::notifier::Notifier;

/// Where every classified change goes: the log first, then the notifier.
///
/// Append failures are logged and never propagate; a notification is
/// dispatched in the background so a slow or failing backend never stalls
/// the producer.
#[derive(Clone)]
pub struct ChangeSink {
    log: Arc<ChangeLog>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ChangeSink {
    pub fn new(log: Arc<ChangeLog>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self { log, notifier }
    }

    pub fn log(&self) -> &Arc<ChangeLog> {
        &self.log
    }

    /// Append `record` and fire the notification. Returns whether the
    /// append succeeded.
    pub async fn emit(&self, record: ChangeRecord) -> bool {
        let appended = match self.log.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    "change_log: failed to append {} {} ({}): {e:#}",
                    record.kind,
                    record.subject,
                    record.source
                );
                false
            }
        };

        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&record).await {
                    tracing::warn!(
                        "notifier: {} failed for {} {}: {e:#}",
                        notifier.name(),
                        record.kind,
                        record.subject
                    );
                }
            });
        }

        appended
    }

    /// Drain `rx` into this sink until every sender is dropped.
    pub fn spawn_consumer(&self, mut rx: mpsc::UnboundedReceiver<ChangeRecord>) -> JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                sink.emit(record).await;
            }
            tracing::debug!("change_log: producer channel closed");
        })
    }
}
