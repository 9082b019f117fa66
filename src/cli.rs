use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::changes::{ChangeLog, ChangeRecord, ChangeSink};
use crate::config::Config;
use crate::local::LocalTracker;
use crate::remote::{self, PassError};
use crate::supervisor::TaskSupervisor;
use crate::{notifier, Commands, SourceFilter, REMOTE_TASK_ID};

/// Handle every `changewatch <subcommand>`.
pub async fn handle_command(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Watch { folder } => {
            if let Some(folder) = folder {
                config.local.folder = Some(folder);
            }
            handle_run(&config, true, false, false).await
        }
        Commands::Track { resync } => handle_run(&config, false, true, resync).await,
        Commands::Run { resync } => {
            if config.local.enabled && config.local.folder.is_none() {
                tracing::warn!("config: [local].folder is not set, local watching skipped");
            }
            handle_run(&config, config.local.is_active(), config.remote.enabled, resync).await
        }
        Commands::PollOnce { resync } => handle_poll_once(&config, resync).await,
        Commands::Upload { file, name } => handle_upload(&config, &file, name).await,
        Commands::Log {
            source,
            limit,
            summary,
        } => handle_log(&config, source, limit, summary).await,
    }
}

async fn build_sink(config: &Config) -> Result<ChangeSink> {
    let log = ChangeLog::new(config.change_log_path());
    log.ensure_exists().await?;
    let notifier = notifier::from_config(&config.notifier)?;
    Ok(ChangeSink::new(Arc::new(log), notifier))
}

/// Long-running mode: local watcher and/or remote loop until Ctrl-C.
async fn handle_run(config: &Config, local: bool, remote_on: bool, resync: bool) -> Result<()> {
    if !local && !remote_on {
        bail!(
            "nothing to run: set [local].folder or enable [remote] in {}",
            config.config_path.display()
        );
    }
    let sink = build_sink(config).await?;

    let local_tracker = if local {
        Some(LocalTracker::start(&config.local, &sink)?)
    } else {
        None
    };

    let supervisor = TaskSupervisor::new(
        config.remote.poll_interval(),
        config.supervisor.shutdown_grace(),
    );
    if remote_on {
        let tracker = remote::connect(config, sink.clone()).await?;
        if resync {
            tracker.context().reset_cursor().await?;
        }
        supervisor.start(REMOTE_TASK_ID, Arc::new(tracker));
    }

    println!("changewatch running, change log: {}", config.change_log_path().display());
    println!("Press Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    if let Some(status) = supervisor.status(REMOTE_TASK_ID) {
        tracing::info!(
            "supervisor: {} ran {} passes ({} failed, {} changes)",
            status.task_id,
            status.stats.passes,
            status.stats.failures,
            status.stats.emitted
        );
    }
    supervisor.stop_all().await;
    if let Some(tracker) = local_tracker {
        tracker.shutdown().await;
    }
    Ok(())
}

async fn handle_poll_once(config: &Config, resync: bool) -> Result<()> {
    let sink = build_sink(config).await?;
    let tracker = remote::connect(config, sink).await?;
    if resync {
        tracker.context().reset_cursor().await?;
    }
    match tracker.run_pass().await {
        Ok(summary) if summary.baseline => {
            println!("Baseline taken: tracking {} items.", summary.tracked);
            Ok(())
        }
        Ok(summary) => {
            println!(
                "{} change(s) recorded, {} skipped, {} items tracked.",
                summary.emitted, summary.skipped, summary.tracked
            );
            Ok(())
        }
        Err(e) if e.requires_reauth() => {
            bail!("{e}\nThe access token was rejected; refresh it and retry.")
        }
        Err(PassError::Feed(e)) => Err(e).context("reconciliation pass failed"),
        Err(e) => Err(e.into()),
    }
}

async fn handle_upload(config: &Config, file: &Path, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(n) => n,
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", file.display()))?,
    };
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let client = remote::graph_client(config).await?;
    client
        .upload(&name, content)
        .await
        .with_context(|| format!("failed to upload {name}"))?;
    println!("Uploaded {} to {}/{name}", file.display(), config.remote.folder);
    Ok(())
}

async fn handle_log(
    config: &Config,
    source: Option<SourceFilter>,
    limit: usize,
    summary: bool,
) -> Result<()> {
    let path: PathBuf = config.change_log_path();
    let records: Vec<ChangeRecord> = ChangeLog::new(&path)
        .load()
        .await?
        .into_iter()
        .filter(|r| source.is_none_or(|s| s.matches(r.source)))
        .collect();

    if records.is_empty() {
        println!("No changes recorded in {}", path.display());
        return Ok(());
    }

    if summary {
        print_summary(&records);
        return Ok(());
    }

    let start = records.len().saturating_sub(limit);
    println!("  {:<20} {:<8} {:<9} SUBJECT", "TIMESTAMP", "SOURCE", "KIND");
    println!("  {}", "-".repeat(65));
    for r in &records[start..] {
        println!(
            "  {:<20} {:<8} {:<9} {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.source.to_string(),
            r.kind.to_string(),
            r.subject
        );
    }
    if start > 0 {
        println!("  ({start} older record(s) not shown)");
    }
    Ok(())
}

fn summarize(records: &[ChangeRecord]) -> BTreeMap<(String, String), usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts
            .entry((r.source.to_string(), r.kind.to_string()))
            .or_insert(0) += 1;
    }
    counts
}

fn print_summary(records: &[ChangeRecord]) {
    println!("  {:<8} {:<9} {:>6}", "SOURCE", "KIND", "COUNT");
    println!("  {}", "-".repeat(25));
    for ((source, kind), count) in summarize(records) {
        println!("  {source:<8} {kind:<9} {count:>6}");
    }
    println!("  {} record(s) total", records.len());
}
