//! Recursive folder watcher feeding the debounce coalescer.
//!
//! Wraps `notify::RecommendedWatcher`. Raw events are mapped onto
//! created/modified/deleted and handed to the coalescer from the notify
//! thread; nothing is filtered here beyond event kinds we do not track.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::debounce::DebounceCoalescer;
use crate::changes::ChangeKind;

/// Keeps the underlying watcher alive; dropping it stops delivery.
pub struct LocalWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl LocalWatcher {
    pub fn watch(root: &Path, coalescer: Arc<DebounceCoalescer>) -> Result<Self> {
        if !root.is_dir() {
            anyhow::bail!("local_watch: {} is not a directory", root.display());
        }

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<notify::Event, _>| {
                let event = match res {
                    Ok(e) => e,
                    Err(err) => {
                        tracing::warn!("local_watch: watcher error: {err}");
                        return;
                    }
                };
                for (path, kind) in classify(&event.kind, &event.paths) {
                    coalescer.record(path, kind);
                }
            })
            .context("failed to create filesystem watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        tracing::info!("local_watch: watching {}", root.display());

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Map one raw notify event onto per-path change kinds.
///
/// A rename is treated as a delete of the old path and a create of the new
/// one. Access events and unknown kinds are dropped.
pub fn classify(kind: &EventKind, paths: &[PathBuf]) -> Vec<(PathBuf, ChangeKind)> {
    let all = |k: ChangeKind| paths.iter().map(|p| (p.clone(), k)).collect::<Vec<_>>();
    match kind {
        EventKind::Create(_) => all(ChangeKind::Created),
        EventKind::Remove(_) => all(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(ChangeKind::Deleted),
            RenameMode::To => all(ChangeKind::Created),
            RenameMode::Both => {
                let mut out = Vec::with_capacity(paths.len());
                if let Some(from) = paths.first() {
                    out.push((from.clone(), ChangeKind::Deleted));
                }
                out.extend(paths.iter().skip(1).map(|p| (p.clone(), ChangeKind::Created)));
                out
            }
            // Backends that cannot tell the halves apart: decide by existence.
            _ => paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => all(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
