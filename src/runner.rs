use crate::artifact::RunArtifact;
use crate::config::Config;
use crate::engine::ResolutionEngine;
use crate::gateway::{MailboxGateway, SimulatedGateway};
use crate::pagination::PageWalker;
use crate::usage;
use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides the configured limit.
    pub limit: Option<usize>,
    /// Walk every page and evaluate everything fetched.
    pub fetch_all: bool,
    pub dry_run: bool,
    pub data_dir: PathBuf,
}

#[derive(Debug)]
pub struct RunSummary {
    pub artifact: RunArtifact,
    pub artifact_path: PathBuf,
    pub usage_updates: usize,
}

impl RunOptions {
    fn effective_limit(&self, config: &Config) -> Option<usize> {
        if self.fetch_all {
            None
        } else {
            Some(self.limit.unwrap_or(config.limit))
        }
    }
}

/// Run against `gateway`, wrapping it so nothing is changed when
/// `options.dry_run` is set.
pub async fn execute<G: MailboxGateway>(
    config: &Config,
    gateway: G,
    options: &RunOptions,
) -> Result<RunSummary> {
    if options.dry_run {
        let simulated = SimulatedGateway::new(gateway);
        let summary = run(config, &simulated, options).await?;
        log::info!(
            "[dry-run] suppressed {} mailbox change(s)",
            simulated.suppressed_calls()
        );
        Ok(summary)
    } else {
        run(config, &gateway, options).await
    }
}

/// Walk, resolve and persist one batch.
pub async fn run<G: MailboxGateway + ?Sized>(
    config: &Config,
    gateway: &G,
    options: &RunOptions,
) -> Result<RunSummary> {
    let started_at = Local::now();
    let limit = options.effective_limit(config);

    log::info!(
        "Loaded {} enabled rule(s){}",
        config.rules.len(),
        if config.disabled_rules > 0 {
            format!(", {} disabled", config.disabled_rules)
        } else {
            String::new()
        }
    );
    match limit {
        Some(limit) => log::info!("Processing limit: {limit} emails"),
        None => log::info!("Processing every email under {}", config.required_label),
    }

    let walker = PageWalker::new(
        gateway,
        &config.required_label,
        config.page_size,
        config.fetch_timeout,
    );
    let (emails, walk) = walker.walk(limit, options.fetch_all).await;
    log::info!(
        "Fetched {} emails from {} (estimated total: {})",
        walk.total_fetched,
        config.required_label,
        walk.estimated_total
    );
    if walk.more_available {
        log::warn!("More pages available in {}, stopped at the limit", config.required_label);
    }

    let engine = ResolutionEngine::new(config, gateway);
    let outcome = engine.run(&emails, limit).await;

    let artifact = RunArtifact::new(started_at, limit, options.dry_run, &walk, outcome);
    let artifact_path = artifact.save(&options.data_dir)?;
    log::info!("Wrote {}", artifact_path.display());

    let usage_updates = if options.dry_run {
        0
    } else {
        let path = usage::usage_path(&options.data_dir);
        let mut history = usage::load(&path);
        let updates = usage::apply_artifact(&mut history, &artifact);
        usage::save(&history, &path)?;
        updates
    };

    Ok(RunSummary {
        artifact,
        artifact_path,
        usage_updates,
    })
}
