use crate::engine::{ActionRecord, EngineOutcome, FailedAction};
use crate::pagination::WalkSummary;
use crate::statistics::{RuleStat, RunTotals};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-rule counters as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStatRecord {
    pub name: String,
    #[serde(default)]
    pub filter: String,
    pub emails_found: u64,
    pub emails_processed: u64,
    pub emails_labeled: u64,
    pub emails_marked_important: u64,
    pub emails_archived: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<RuleStat> for RuleStatRecord {
    fn from(stat: RuleStat) -> Self {
        Self {
            name: stat.name,
            filter: stat.filter.unwrap_or_default(),
            emails_found: stat.found,
            emails_processed: stat.processed,
            emails_labeled: stat.labeled,
            emails_marked_important: stat.marked_important,
            emails_archived: stat.archived,
            errors: stat.errors,
        }
    }
}

/// The JSON document written at the end of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub started_at: DateTime<Local>,
    pub completed_at: DateTime<Local>,
    /// `None` when every page was fetched.
    pub limit: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    pub emails_fetched: usize,
    #[serde(default)]
    pub pages_walked: usize,
    pub more_pages_available: bool,
    pub total_estimated_in_inbox: u64,
    pub emails_evaluated: usize,
    pub emails_matched: usize,
    pub emails_unmatched: usize,
    pub total_rule_matches: u64,
    pub total_actions_taken: u64,
    pub rule_statistics: Vec<RuleStatRecord>,
    pub emails: Vec<ActionRecord>,
    #[serde(default)]
    pub failed_emails: Vec<FailedAction>,
}

impl RunArtifact {
    pub fn new(
        started_at: DateTime<Local>,
        limit: Option<usize>,
        dry_run: bool,
        walk: &WalkSummary,
        outcome: EngineOutcome,
    ) -> Self {
        let totals = outcome.totals();
        let emails_matched = outcome.matched();

        Self {
            started_at,
            completed_at: Local::now(),
            limit,
            dry_run,
            emails_fetched: walk.total_fetched,
            pages_walked: walk.pages_walked,
            more_pages_available: walk.more_available,
            total_estimated_in_inbox: walk.estimated_total,
            emails_evaluated: outcome.evaluated,
            emails_matched,
            emails_unmatched: outcome.unmatched.len(),
            total_rule_matches: totals.found,
            total_actions_taken: totals.processed,
            rule_statistics: outcome.rule_stats.into_iter().map(Into::into).collect(),
            emails: outcome.actions,
            failed_emails: outcome.failed,
        }
    }

    /// `processed_<YYYY-MM-DD_HHMM>.json`, named after the run start. Dry runs
    /// get a `_dry-run` suffix so they never replace a live run's artifact.
    pub fn file_name(&self) -> String {
        let stamp = self.started_at.format("%Y-%m-%d_%H%M");
        if self.dry_run {
            format!("processed_{stamp}_dry-run.json")
        } else {
            format!("processed_{stamp}.json")
        }
    }

    /// Totals recomputed from the per-rule records.
    pub fn rule_totals(&self) -> RunTotals {
        self.rule_statistics
            .iter()
            .fold(RunTotals::default(), |mut totals, stat| {
                totals.found += stat.emails_found;
                totals.processed += stat.emails_processed;
                totals.labeled += stat.emails_labeled;
                totals.marked_important += stat.emails_marked_important;
                totals.archived += stat.emails_archived;
                totals
            })
    }

    /// Write into `dir`, creating it if needed. Returns the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        let path = dir.join(self.file_name());
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write run artifact: {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run artifact: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run artifact: {}", path.display()))
    }
}
