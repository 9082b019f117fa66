use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod changes;
pub mod cli;
pub mod config;
pub mod local;
pub mod notifier;
pub mod remote;
pub mod supervisor;

pub use changes::{ChangeKind, ChangeLog, ChangeRecord, ChangeSink, ChangeSource};
pub use config::Config;
pub use supervisor::{PeriodicJob, TaskSupervisor};

/// Task id of the remote tracking loop.
pub const REMOTE_TASK_ID: &str = "remote-sync";

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch the local folder and log settled changes
    Watch {
        /// Folder to watch (overrides [local].folder)
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Poll the remote folder's delta feed and log changes
    Track {
        /// Drop the stored cursor and start from a fresh snapshot
        #[arg(long)]
        resync: bool,
    },
    /// Run local watching and remote tracking together
    Run {
        #[arg(long)]
        resync: bool,
    },
    /// Run a single remote reconciliation pass and exit
    PollOnce {
        #[arg(long)]
        resync: bool,
    },
    /// Upload a file into the tracked remote folder
    Upload {
        file: PathBuf,
        /// Remote file name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Show recorded changes
    Log {
        #[arg(long, value_enum)]
        source: Option<SourceFilter>,
        /// Show at most this many of the most recent records
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print counts per source and kind instead of records
        #[arg(long)]
        summary: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    Local,
    Remote,
}

impl SourceFilter {
    pub fn matches(self, source: ChangeSource) -> bool {
        matches!(
            (self, source),
            (Self::Local, ChangeSource::Local) | (Self::Remote, ChangeSource::Remote)
        )
    }
}
