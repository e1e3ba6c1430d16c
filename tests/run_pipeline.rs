use inbox_triage::artifact::RunArtifact;
use inbox_triage::config::Config;
use inbox_triage::gateway::MemoryGateway;
use inbox_triage::runner::{self, RunOptions};
use inbox_triage::usage;
use inbox_triage::{ActionTag, Email};
use std::path::Path;

const RULES: &str = r#"
required_label: INBOX
page_size: 2
limit: 10
rules:
  - name: Receipts
    match:
      subject: "receipt|invoice"
    label: Receipts
    inbox_days: 0
  - name: Newsletters
    match:
      body: "unsubscribe"
    exclude:
      any: "urgent"
    label: Newsletters
    inbox_days: 3
  - name: Boss
    match:
      sender: "boss@work\\.example"
    mark_important: true
    inbox_days: -1
  - name: Broken
    match:
      subject: "(unclosed"
  - name: Retired
    enabled: false
    match:
      subject: ".*"
"#;

fn email(id: &str, from: &str, subject: &str, body: &str, date: &str) -> Email {
    Email {
        id: id.to_string(),
        sender: from.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        date: date.to_string(),
        label_ids: vec!["INBOX".to_string()],
        ..Default::default()
    }
}

fn mailbox() -> Vec<Email> {
    vec![
        email("r1", "shop@store.example", "Your receipt", "", "Mon, 01 Dec 2025 10:00:00 +0000"),
        email("n1", "news@list.example", "Weekly news", "Click to unsubscribe", "Tue, 02 Dec 2025 10:00:00 +0000"),
        email("n2", "news@list.example", "URGENT update", "unsubscribe here", "Tue, 02 Dec 2025 11:00:00 +0000"),
        email("b1", "boss@work.example", "Invoice question", "", "Wed, 03 Dec 2025 09:30:00 -0500"),
        email("x1", "friend@home.example", "Dinner?", "", "Wed, 03 Dec 2025 19:00:00 +0000"),
        // Already archived, so never under the required label.
        Email {
            label_ids: vec!["Archived".to_string()],
            ..email("z1", "shop@store.example", "Old receipt", "", "Mon, 01 Sep 2025 10:00:00 +0000")
        },
    ]
}

fn options(data_dir: &Path, dry_run: bool) -> RunOptions {
    RunOptions {
        limit: None,
        fetch_all: false,
        dry_run,
        data_dir: data_dir.to_path_buf(),
    }
}

#[tokio::test]
async fn test_live_run_writes_artifact_and_usage() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_yaml(RULES).unwrap();
    assert_eq!(config.disabled_rules, 1);

    let summary = runner::execute(&config, MemoryGateway::new(mailbox()), &options(dir.path(), false))
        .await
        .unwrap();
    let artifact = &summary.artifact;

    assert_eq!(artifact.emails_fetched, 5);
    assert!(artifact.emails.iter().all(|e| e.email_id != "z1"));
    assert_eq!(artifact.pages_walked, 3);
    assert!(!artifact.more_pages_available);
    assert_eq!(artifact.emails_evaluated, 5);
    assert_eq!(artifact.emails_unmatched, 2);
    assert_eq!(artifact.emails_matched, 3);

    // b1 matches Receipts (archive now) and Boss (never): never wins.
    let b1: Vec<_> = artifact
        .emails
        .iter()
        .filter(|e| e.email_id == "b1")
        .map(|e| (e.rule_name.as_str(), e.action))
        .collect();
    assert_eq!(
        b1,
        vec![("Receipts", ActionTag::WontArchive), ("Boss", ActionTag::WontArchive)]
    );

    let r1 = artifact.emails.iter().find(|e| e.email_id == "r1").unwrap();
    assert_eq!(r1.action, ActionTag::Archived);
    assert!(r1.labeled);

    let broken = artifact
        .rule_statistics
        .iter()
        .find(|s| s.name == "Broken")
        .unwrap();
    assert_eq!(broken.emails_found, 0);
    assert_eq!(broken.errors.len(), 1);

    let totals = artifact.rule_totals();
    assert_eq!(totals.found, artifact.total_rule_matches);
    assert_eq!(totals.processed, artifact.total_actions_taken);

    let reloaded = RunArtifact::load(&summary.artifact_path).unwrap();
    assert_eq!(&reloaded, artifact);

    let history = usage::load(&usage::usage_path(dir.path()));
    assert_eq!(history["Receipts"], "2025-12-03T09:30:00-05:00");
    assert_eq!(history["Boss"], "2025-12-03T09:30:00-05:00");
    assert!(!history.contains_key("Broken"));
    assert_eq!(summary.usage_updates, 4);
}

#[tokio::test]
async fn test_dry_run_records_same_decisions() {
    let config = Config::from_yaml(RULES).unwrap();

    let live_dir = tempfile::tempdir().unwrap();
    let live = runner::execute(&config, MemoryGateway::new(mailbox()), &options(live_dir.path(), false))
        .await
        .unwrap();

    let dry_dir = tempfile::tempdir().unwrap();
    let dry = runner::execute(&config, MemoryGateway::new(mailbox()), &options(dry_dir.path(), true))
        .await
        .unwrap();

    assert!(dry.artifact.dry_run);
    assert_eq!(dry.artifact.emails, live.artifact.emails);
    assert_eq!(dry.artifact.rule_statistics, live.artifact.rule_statistics);
    assert_eq!(dry.usage_updates, 0);
    assert!(!usage::usage_path(dry_dir.path()).exists());
}

#[tokio::test]
async fn test_limit_caps_fetch_and_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_yaml(RULES).unwrap();
    let mut options = options(dir.path(), false);
    options.limit = Some(3);

    let summary = runner::execute(&config, MemoryGateway::new(mailbox()), &options)
        .await
        .unwrap();

    // Pages of two: the walk stops once four emails are in hand.
    assert_eq!(summary.artifact.emails_fetched, 4);
    assert_eq!(summary.artifact.pages_walked, 2);
    assert!(summary.artifact.more_pages_available);
    assert_eq!(summary.artifact.emails_evaluated, 3);
    assert_eq!(summary.artifact.limit, Some(3));
}

#[tokio::test]
async fn test_usage_rebuilt_from_saved_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_yaml(RULES).unwrap();
    let summary = runner::execute(&config, MemoryGateway::new(mailbox()), &options(dir.path(), false))
        .await
        .unwrap();

    let usage_path = dir.path().join("elsewhere").join(usage::USAGE_FILE);
    let updates = usage::update_from_artifact(&summary.artifact_path, &usage_path).unwrap();
    assert_eq!(updates, 4);

    // Folding the same run twice changes nothing.
    let again = usage::update_from_artifact(&summary.artifact_path, &usage_path).unwrap();
    assert_eq!(again, 0);
}
