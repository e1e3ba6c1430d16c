use crate::artifact::{RuleStatRecord, RunArtifact};
use crate::statistics::RunTotals;
use std::fmt::Write;

const RULE_WIDTH: usize = 36;
const SUBJECT_WIDTH: usize = 40;

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Rules with matches first (most matches first), then the idle ones in
/// configuration order.
fn sorted_rules(rules: &[RuleStatRecord]) -> Vec<&RuleStatRecord> {
    let mut sorted: Vec<_> = rules.iter().collect();
    sorted.sort_by(|a, b| {
        let idle = |r: &RuleStatRecord| r.emails_found == 0;
        idle(a)
            .cmp(&idle(b))
            .then(b.emails_found.cmp(&a.emails_found))
    });
    sorted
}

/// Render a saved run as the plain-text report printed at the end of a run.
pub fn render_report(artifact: &RunArtifact) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_summary(&mut out, artifact);
    let _ = write_rule_table(&mut out, artifact);
    let _ = write_email_table(&mut out, artifact);
    let _ = write_failures(&mut out, artifact);
    out
}

fn write_summary(out: &mut String, artifact: &RunArtifact) -> std::fmt::Result {
    writeln!(out, "📊 Processing Summary")?;
    writeln!(out, "═══════════════════════════════════════")?;
    writeln!(out, "  Started:            {}", artifact.started_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "  Completed:          {}", artifact.completed_at.format("%Y-%m-%d %H:%M:%S"))?;
    match artifact.limit {
        Some(limit) => writeln!(out, "  Limit:              {limit} emails")?,
        None => writeln!(out, "  Limit:              none (all pages)")?,
    }
    if artifact.dry_run {
        writeln!(out, "  Mode:               dry run (no changes made)")?;
    }
    writeln!(
        out,
        "  Emails Fetched:     {} of ~{} ({} page(s))",
        artifact.emails_fetched, artifact.total_estimated_in_inbox, artifact.pages_walked
    )?;
    if artifact.more_pages_available {
        writeln!(out, "  ⚠️  More pages available beyond this run")?;
    }
    writeln!(out, "  Emails Evaluated:   {}", artifact.emails_evaluated)?;
    writeln!(out, "  Emails Matched:     {} (matched 1+ rules)", artifact.emails_matched)?;
    writeln!(out, "  Emails Unmatched:   {}", artifact.emails_unmatched)?;
    writeln!(out, "  Total Rule Matches: {}", artifact.total_rule_matches)?;
    writeln!(out, "  Total Actions:      {}", artifact.total_actions_taken)?;
    writeln!(out)
}

fn write_rule_table(out: &mut String, artifact: &RunArtifact) -> std::fmt::Result {
    if artifact.rule_statistics.is_empty() {
        return writeln!(out, "📭 No rules in this run");
    }

    let border = "─".repeat(RULE_WIDTH + 2);
    let cell = "─".repeat(9);
    writeln!(out, "🎯 Rule Summary")?;
    writeln!(out, "┌{border}┬{cell}┬{cell}┬{cell}┬{cell}┬{cell}┐")?;
    writeln!(
        out,
        "│ {:<RULE_WIDTH$} │ {:>7} │ {:>7} │ {:>7} │ {:>7} │ {:>7} │",
        "Rule Name", "Found", "Proc.", "Label", "Import.", "Archive"
    )?;
    writeln!(out, "├{border}┼{cell}┼{cell}┼{cell}┼{cell}┼{cell}┤")?;

    for rule in sorted_rules(&artifact.rule_statistics) {
        writeln!(
            out,
            "│ {:<RULE_WIDTH$} │ {:>7} │ {:>7} │ {:>7} │ {:>7} │ {:>7} │",
            truncate_string(&rule.name, RULE_WIDTH),
            rule.emails_found,
            rule.emails_processed,
            rule.emails_labeled,
            rule.emails_marked_important,
            rule.emails_archived
        )?;
    }

    let totals: RunTotals = artifact.rule_totals();
    writeln!(out, "├{border}┼{cell}┼{cell}┼{cell}┼{cell}┼{cell}┤")?;
    writeln!(
        out,
        "│ {:<RULE_WIDTH$} │ {:>7} │ {:>7} │ {:>7} │ {:>7} │ {:>7} │",
        "TOTAL", totals.found, totals.processed, totals.labeled, totals.marked_important, totals.archived
    )?;
    writeln!(out, "└{border}┴{cell}┴{cell}┴{cell}┴{cell}┴{cell}┘")?;

    for rule in &artifact.rule_statistics {
        for error in &rule.errors {
            writeln!(out, "  ❌ {}: {error}", rule.name)?;
        }
    }
    writeln!(out)
}

fn write_email_table(out: &mut String, artifact: &RunArtifact) -> std::fmt::Result {
    if artifact.emails.is_empty() {
        return writeln!(out, "📭 No emails matched any rule");
    }

    writeln!(out, "📬 Email Details")?;
    writeln!(out, "═══════════════════════════════════════")?;
    writeln!(
        out,
        "{:<RULE_WIDTH$} {:<SUBJECT_WIDTH$} {:<7} {:<18}",
        "Rule", "Subject", "Labeled", "Action"
    )?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH + SUBJECT_WIDTH + 28))?;
    for email in &artifact.emails {
        writeln!(
            out,
            "{:<RULE_WIDTH$} {:<SUBJECT_WIDTH$} {:<7} {:<18}",
            truncate_string(&email.rule_name, RULE_WIDTH),
            truncate_string(&email.subject, SUBJECT_WIDTH),
            if email.labeled { "yes" } else { "" },
            email.action.as_str()
        )?;
    }
    writeln!(out)
}

fn write_failures(out: &mut String, artifact: &RunArtifact) -> std::fmt::Result {
    if artifact.failed_emails.is_empty() {
        return Ok(());
    }

    writeln!(out, "❌ Failed Emails ({})", artifact.failed_emails.len())?;
    writeln!(out, "═══════════════════════════════════════")?;
    for failed in &artifact.failed_emails {
        writeln!(
            out,
            "  • {} [{}] {}",
            failed.email_id,
            failed.rule,
            truncate_string(&failed.subject, SUBJECT_WIDTH)
        )?;
        writeln!(out, "    {}", failed.error)?;
    }
    Ok(())
}
