//! Rule usage history: the date of the most recent email each rule matched,
//! kept across runs in `rules_usage.json`.

use crate::artifact::RunArtifact;
use crate::dates::{parse_email_date, to_iso};
use anyhow::{Context, Result};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const USAGE_FILE: &str = "rules_usage.json";

/// Rule name to ISO date, sorted by name.
pub type RulesUsage = BTreeMap<String, String>;

pub fn usage_path(data_dir: &Path) -> PathBuf {
    data_dir.join(USAGE_FILE)
}

/// Load the history, treating a missing or unreadable file as empty.
pub fn load(path: &Path) -> RulesUsage {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return RulesUsage::new(),
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::warn!("Ignoring unreadable usage history {}: {e}", path.display());
        RulesUsage::new()
    })
}

pub fn save(usage: &RulesUsage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(usage)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write usage history: {}", path.display()))
}

fn is_newer(candidate: &str, current: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(candidate),
        DateTime::parse_from_rfc3339(current),
    ) {
        (Ok(candidate), Ok(current)) => candidate > current,
        _ => candidate > current,
    }
}

/// Record that `rule` matched an email dated `raw_date`. Returns true if the
/// stored date changed.
pub fn record(usage: &mut RulesUsage, rule: &str, raw_date: &str) -> bool {
    if rule.is_empty() || raw_date.is_empty() {
        return false;
    }
    let iso = to_iso(raw_date);
    if parse_email_date(raw_date).is_none() {
        log::debug!("Storing unparsed date '{raw_date}' for rule '{rule}'");
    }

    let changed = usage
        .get(rule)
        .map_or(true, |current| is_newer(&iso, current));
    if changed {
        usage.insert(rule.to_string(), iso);
    }
    changed
}

/// Fold every action record of an artifact into the history.
pub fn apply_artifact(usage: &mut RulesUsage, artifact: &RunArtifact) -> usize {
    artifact
        .emails
        .iter()
        .filter(|email| record(usage, &email.rule_name, &email.date))
        .count()
}

/// Load, update from `artifact_path` and save. Returns the number of updates.
/// Dry-run artifacts describe actions that never happened and are skipped.
pub fn update_from_artifact(artifact_path: &Path, usage_path: &Path) -> Result<usize> {
    let artifact = RunArtifact::load(artifact_path)?;
    if artifact.dry_run {
        log::warn!(
            "Not updating rule usage from dry-run artifact {}",
            artifact_path.display()
        );
        return Ok(0);
    }
    let mut usage = load(usage_path);
    let updates = apply_artifact(&mut usage, &artifact);
    save(&usage, usage_path)?;
    Ok(updates)
}
