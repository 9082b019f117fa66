//! Classified change records and the append-only log they land in.
//!
//! Both the local coalescer and the remote reconciler produce
//! [`ChangeRecord`]s; [`ChangeSink`] appends each one to the shared
//! [`ChangeLog`] and hands it to the notifier.

pub mod log;
pub mod sink;

pub use log::ChangeLog;
pub use sink::ChangeSink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a subject.
///
/// Local filesystem events use `Created`/`Modified`/`Deleted`; remote
/// classification uses `Created`/`Updated`/`Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Which subsystem produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Local,
    Remote,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// One net change. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    /// Local path or remote item name.
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    pub source: ChangeSource,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, subject: impl Into<String>, source: ChangeSource) -> Self {
        Self {
            kind,
            subject: subject.into(),
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn local(kind: ChangeKind, subject: impl Into<String>) -> Self {
        Self::new(kind, subject, ChangeSource::Local)
    }

    pub fn remote(kind: ChangeKind, subject: impl Into<String>) -> Self {
        Self::new(kind, subject, ChangeSource::Remote)
    }
}
