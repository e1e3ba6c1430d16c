use crate::config::{Config, Retention, Rule};
use crate::dates::is_archivable;
use crate::email::Email;
use crate::gateway::MailboxGateway;
use crate::matcher::{PatternDiagnostic, RuleMatcher};
use crate::statistics::{RuleStat, RunTotals, StatEvent, StatsAccumulator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome recorded for one (email, rule) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionTag {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "marked_important")]
    MarkedImportant,
    #[serde(rename = "archived")]
    Archived,
    #[serde(rename = "will_archive_later")]
    WillArchiveLater,
    #[serde(rename = "won't_archive")]
    WontArchive,
    #[serde(rename = "failed")]
    Failed,
}

impl ActionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTag::None => "none",
            ActionTag::MarkedImportant => "marked_important",
            ActionTag::Archived => "archived",
            ActionTag::WillArchiveLater => "will_archive_later",
            ActionTag::WontArchive => "won't_archive",
            ActionTag::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub email_id: String,
    pub rule_name: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    /// The rule's own label was applied in this run.
    #[serde(default)]
    pub labeled: bool,
    pub action: ActionTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAction {
    pub email_id: String,
    pub subject: String,
    pub error: String,
    pub rule: String,
}

/// Final inbox_days across every matched rule: -1 beats everything,
/// otherwise the longest retention wins.
pub fn resolve_retention(values: &[Retention]) -> Option<Retention> {
    if values.contains(&Retention::Never) {
        return Some(Retention::Never);
    }
    values
        .iter()
        .filter_map(|value| match value {
            Retention::Days(days) => Some(*days),
            Retention::Never => None,
        })
        .max()
        .map(Retention::Days)
}

/// Pass 1 result for one email.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Indices into the rule list, in configuration order.
    pub matched: Vec<usize>,
    /// Labels to apply with the index of the first rule that asked for each.
    pub pending_labels: Vec<(String, usize)>,
    pub mark_important: bool,
    pub retention: Option<Retention>,
}

impl Decision {
    fn take_label(&mut self, label: &str) -> bool {
        match self.pending_labels.iter().position(|(l, _)| l == label) {
            Some(position) => {
                self.pending_labels.remove(position);
                true
            }
            None => false,
        }
    }

    /// First matched rule whose own inbox_days equals the resolved value.
    fn archive_owner(&self, rules: &[Rule]) -> Option<usize> {
        let resolved = self.retention?;
        self.matched
            .iter()
            .copied()
            .find(|&i| rules[i].retention == Some(resolved))
    }
}

/// Everything the engine produced for one run.
#[derive(Debug, Default)]
pub struct EngineOutcome {
    pub evaluated: usize,
    pub actions: Vec<ActionRecord>,
    pub failed: Vec<FailedAction>,
    pub unmatched: Vec<String>,
    pub rule_stats: Vec<RuleStat>,
}

impl EngineOutcome {
    pub fn matched(&self) -> usize {
        self.evaluated - self.unmatched.len()
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals::from_stats(&self.rule_stats)
    }
}

/// Archive decision made once per email and shared by every rule that has
/// its own inbox_days.
#[derive(Debug, Clone)]
struct ArchiveToken {
    tag: ActionTag,
    archived: bool,
}

pub struct ResolutionEngine<'a, G: ?Sized> {
    config: &'a Config,
    gateway: &'a G,
    matcher: RuleMatcher,
    now: DateTime<Utc>,
}

impl<'a, G: MailboxGateway + ?Sized> ResolutionEngine<'a, G> {
    pub fn new(config: &'a Config, gateway: &'a G) -> Self {
        Self {
            config,
            gateway,
            matcher: RuleMatcher::new(&config.rules),
            now: Utc::now(),
        }
    }

    /// Evaluate ages against a fixed clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn diagnostics(&self) -> &[PatternDiagnostic] {
        self.matcher.diagnostics()
    }

    /// Pass 1: evaluate every rule and merge their requests.
    pub fn aggregate(&self, email: &Email) -> Option<Decision> {
        let rules = &self.config.rules;
        let matched: Vec<usize> = rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| self.matcher.matches(email, rule))
            .map(|(i, _)| i)
            .collect();
        if matched.is_empty() {
            return None;
        }

        let mut decision = Decision {
            matched,
            pending_labels: Vec::new(),
            mark_important: false,
            retention: None,
        };
        let mut retentions = Vec::new();

        for &i in &decision.matched {
            let rule = &rules[i];
            if let Some(label) = &rule.label {
                push_label(&mut decision.pending_labels, label, i);
            }
            decision.mark_important |= rule.mark_important;
            if let Some(retention) = rule.retention {
                retentions.push(retention);
                if matches!(retention, Retention::Days(days) if days > 0) {
                    push_label(&mut decision.pending_labels, &self.config.auto_archive_label, i);
                }
            }
        }

        decision.retention = resolve_retention(&retentions);
        Some(decision)
    }

    /// Evaluate up to `limit` emails in order and execute their actions.
    pub async fn run(&self, emails: &[Email], limit: Option<usize>) -> EngineOutcome {
        let mut stats = StatsAccumulator::new();
        for rule in &self.config.rules {
            let filter = Some(rule.filter.clone()).filter(|f| !f.is_empty());
            stats.register(&rule.name, filter);
        }
        for diagnostic in self.matcher.diagnostics() {
            stats.record_error(
                &diagnostic.rule,
                format!("Invalid pattern '{}': {}", diagnostic.pattern, diagnostic.error),
            );
        }

        let mut outcome = EngineOutcome::default();
        for email in emails {
            if email.id.is_empty() {
                log::debug!("Skipping email without an id");
                continue;
            }
            if limit.is_some_and(|limit| outcome.evaluated >= limit) {
                log::info!("Reached limit of {} emails", outcome.evaluated);
                break;
            }
            outcome.evaluated += 1;

            match self.aggregate(email) {
                Some(decision) => {
                    for &i in &decision.matched {
                        stats.record(&self.config.rules[i].name, StatEvent::Found);
                    }
                    self.execute(email, decision, &mut stats, &mut outcome).await;
                }
                None => {
                    log::debug!("Email {} matched no rules", email.id);
                    outcome.unmatched.push(email.id.clone());
                }
            }
        }

        let totals = stats.totals();
        log::info!(
            "Evaluated {} emails: {} rule matches, {} processed, {} archived, {} failures",
            outcome.evaluated,
            totals.found,
            totals.processed,
            totals.archived,
            outcome.failed.len()
        );

        outcome.rule_stats = stats.into_stats();
        outcome
    }

    /// Pass 2: run the gateway calls for one matched email.
    async fn execute(
        &self,
        email: &Email,
        mut decision: Decision,
        stats: &mut StatsAccumulator,
        outcome: &mut EngineOutcome,
    ) {
        let rules = &self.config.rules;
        let owner = decision.archive_owner(rules);
        let mut token: Option<ArchiveToken> = None;

        for &i in &decision.matched.clone() {
            let rule = &rules[i];
            let mut tag = ActionTag::None;
            let mut confirmed = false;
            let mut labeled = false;

            if rule.mark_important {
                tag = ActionTag::MarkedImportant;
            }
            if rule.mark_important && std::mem::take(&mut decision.mark_important) {
                match self.gateway.mark_important(&email.id).await {
                    Ok(()) => {
                        stats.record(&rule.name, StatEvent::MarkedImportant);
                        confirmed = true;
                    }
                    Err(e) => {
                        let error = format!("Mark important failed: {e}");
                        self.record_failure(email, &rule.name, error, stats, outcome);
                    }
                }
            }

            if let Some(label) = &rule.label {
                if decision.take_label(label) {
                    match self.gateway.label(&email.id, label, false).await {
                        Ok(()) => {
                            stats.record(&rule.name, StatEvent::Labeled);
                            confirmed = true;
                            labeled = true;
                        }
                        Err(e) => {
                            let error = format!("Applying label '{label}' failed: {e}");
                            self.record_failure(email, &rule.name, error, stats, outcome);
                        }
                    }
                }
            }

            if rule.retention.is_some() {
                let archive_owner = owner.map(|o| rules[o].name.as_str());
                if token.is_none() {
                    token = Some(
                        self.decide_archive(email, decision.retention, archive_owner, stats, outcome)
                            .await,
                    );
                }
                if let Some(token) = &token {
                    tag = token.tag;
                    if token.archived && owner == Some(i) {
                        stats.record(&rule.name, StatEvent::Archived);
                        confirmed = true;
                    }
                }
            }

            if confirmed {
                stats.record(&rule.name, StatEvent::Processed);
            }
            log::debug!("Email {} (rule: {}): {}", email.id, rule.name, tag.as_str());
            outcome.actions.push(ActionRecord {
                email_id: email.id.clone(),
                rule_name: rule.name.clone(),
                subject: email.subject.clone(),
                sender: email.sender.clone(),
                date: email.date.clone(),
                labeled,
                action: tag,
            });
        }

        for (label, contributor) in std::mem::take(&mut decision.pending_labels) {
            if let Err(e) = self.gateway.label(&email.id, &label, false).await {
                let error = format!("Applying label '{label}' failed: {e}");
                self.record_failure(email, &rules[contributor].name, error, stats, outcome);
            }
        }
    }

    async fn decide_archive(
        &self,
        email: &Email,
        resolved: Option<Retention>,
        owner: Option<&str>,
        stats: &mut StatsAccumulator,
        outcome: &mut EngineOutcome,
    ) -> ArchiveToken {
        let days = match resolved {
            None => {
                return ArchiveToken {
                    tag: ActionTag::None,
                    archived: false,
                }
            }
            Some(Retention::Never) => {
                return ArchiveToken {
                    tag: ActionTag::WontArchive,
                    archived: false,
                }
            }
            Some(Retention::Days(days)) => days,
        };

        if !is_archivable(&email.date, days, self.now) {
            return ArchiveToken {
                tag: ActionTag::WillArchiveLater,
                archived: false,
            };
        }

        let config = self.config;
        match self
            .gateway
            .archive(&email.id, &config.required_label, &config.final_archive_label)
            .await
        {
            Ok(()) => ArchiveToken {
                tag: ActionTag::Archived,
                archived: true,
            },
            Err(e) => {
                let rule = owner.unwrap_or_default();
                self.record_failure(email, rule, format!("Archive failed: {e}"), stats, outcome);
                ArchiveToken {
                    tag: ActionTag::Failed,
                    archived: false,
                }
            }
        }
    }

    fn record_failure(
        &self,
        email: &Email,
        rule: &str,
        error: String,
        stats: &mut StatsAccumulator,
        outcome: &mut EngineOutcome,
    ) {
        log::error!("Email {} (rule: {rule}): {error}", email.id);
        stats.record_error(rule, format!("{}: {error}", email.id));
        outcome.failed.push(FailedAction {
            email_id: email.id.clone(),
            subject: email.subject.clone(),
            error,
            rule: rule.to_string(),
        });
    }
}

fn push_label(pending: &mut Vec<(String, usize)>, label: &str, rule: usize) {
    if !pending.iter().any(|(l, _)| l == label) {
        pending.push((label.to_string(), rule));
    }
}
