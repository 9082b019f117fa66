//! Notification backends for emitted change records.
//!
//! A notifier is told about each record after it has been appended to the
//! change log. Failures are the caller's to log; they never undo the append.

pub mod email;
pub mod log;

pub use email::EmailNotifier;
pub use log::LogNotifier;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::changes::ChangeRecord;
use crate::config::{NotifierBackend, NotifierConfig};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    async fn notify(&self, record: &ChangeRecord) -> Result<()>;
}

/// Build the configured backend. `None` means notifications are off.
pub fn from_config(config: &NotifierConfig) -> Result<Option<Arc<dyn Notifier>>> {
    match config.backend {
        NotifierBackend::None => Ok(None),
        NotifierBackend::Log => Ok(Some(Arc::new(LogNotifier))),
        NotifierBackend::Email => {
            let smtp = config
                .smtp
                .as_ref()
                .context("email notifier requires a [notifier.smtp] section")?;
            let notifier = EmailNotifier::from_config(smtp)?;
            Ok(Some(Arc::new(notifier)))
        }
    }
}
