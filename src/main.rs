use clap::{Arg, ArgAction, Command};
use inbox_triage::artifact::RunArtifact;
use inbox_triage::config::{self, Config, ConfigFile};
use inbox_triage::report::render_report;
use inbox_triage::runner::{self, RunOptions};
use inbox_triage::usage;
use inbox_triage::{Email, GwsaGateway, MemoryGateway, RuleMatcher};
use log::LevelFilter;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("inbox-triage")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Label, flag and archive inbox email according to an ordered rule set")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Rule configuration file (default: $INBOX_TRIAGE_CONFIG or ~/.config/inbox-triage/config.yaml)"),
        )
        .arg(
            Arg::new("limit")
                .short('l')
                .long("limit")
                .value_name("N")
                .help("Maximum number of emails to evaluate (overrides the configured limit)")
                .value_parser(clap::value_parser!(usize))
                .conflicts_with("all"),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .help("Fetch every page and evaluate every email")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .help("Show what would be done without changing the mailbox")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("FILE")
                .help("Evaluate a JSON list of emails instead of querying the mailbox"),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and report invalid patterns")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a sample configuration file"),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .value_name("FILE")
                .help("Print the report for a saved run"),
        )
        .arg(
            Arg::new("update-usage")
                .long("update-usage")
                .value_name("FILE")
                .help("Fold a saved run into the rule usage history"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        generate_default_config(path);
        return;
    }

    if let Some(path) = matches.get_one::<String>("report") {
        match RunArtifact::load(Path::new(path)) {
            Ok(artifact) => print!("{}", render_report(&artifact)),
            Err(e) => {
                eprintln!("❌ {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let data_dir = config::data_dir();

    if let Some(path) = matches.get_one::<String>("update-usage") {
        let usage_path = usage::usage_path(&data_dir);
        match usage::update_from_artifact(Path::new(path), &usage_path) {
            Ok(updates) => println!("✅ Updated {updates} rule(s) in {}", usage_path.display()),
            Err(e) => {
                eprintln!("❌ {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let config_path = config::config_path(matches.get_one::<String>("config").map(String::as_str));
    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        test_config(&config, &config_path);
        return;
    }

    let options = RunOptions {
        limit: matches.get_one::<usize>("limit").copied(),
        fetch_all: matches.get_flag("all"),
        dry_run: matches.get_flag("dry-run"),
        data_dir,
    };

    let result = match matches.get_one::<String>("input") {
        Some(path) => match load_emails(Path::new(path)) {
            Ok(emails) => runner::execute(&config, MemoryGateway::new(emails), &options).await,
            Err(e) => Err(e),
        },
        None => {
            let gateway = GwsaGateway::new(&config.gateway_command, config.fetch_timeout);
            runner::execute(&config, gateway, &options).await
        }
    };

    match result {
        Ok(summary) => {
            print!("{}", render_report(&summary.artifact));
            println!();
            println!("✓ Report generated from {}", summary.artifact_path.display());
            if summary.usage_updates > 0 {
                println!("✓ Rule usage updated for {} rule(s)", summary.usage_updates);
            }
        }
        Err(e) => {
            log::error!("Run failed: {e:#}");
            process::exit(1);
        }
    }
}

fn load_emails(path: &Path) -> anyhow::Result<Vec<Email>> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read emails from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse emails from {}", path.display()))
}

fn test_config(config: &Config, path: &Path) {
    println!("🔍 Testing configuration {}", path.display());
    println!();
    println!("Required label: {}", config.required_label);
    println!(
        "Enabled rules: {} ({} disabled)",
        config.rules.len(),
        config.disabled_rules
    );
    for (i, rule) in config.rules.iter().enumerate() {
        let retention = rule
            .retention
            .map(|r| format!("inbox_days {}", r.inbox_days()))
            .unwrap_or_else(|| "no archive opinion".to_string());
        println!("  Rule {}: {} ({retention})", i + 1, rule.name);
    }
    println!();

    let matcher = RuleMatcher::new(&config.rules);
    if matcher.diagnostics().is_empty() {
        println!("✅ All regex patterns compiled successfully.");
    } else {
        println!("❌ Invalid patterns (these never match):");
        for diagnostic in matcher.diagnostics() {
            println!(
                "  • {}: '{}' ({})",
                diagnostic.rule, diagnostic.pattern, diagnostic.error
            );
        }
        process::exit(1);
    }
}

fn generate_default_config(path: &str) {
    let config = ConfigFile::default();
    match config.to_file(Path::new(path)) {
        Ok(()) => println!("Default configuration written to: {path}"),
        Err(e) => {
            eprintln!("Error writing configuration: {e:#}");
            process::exit(1);
        }
    }
}
