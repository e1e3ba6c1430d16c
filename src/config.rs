use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "inbox-triage";

/// On-disk shape of the rule configuration, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_required_label")]
    pub required_label: String,
    #[serde(default = "default_auto_archive_label")]
    pub auto_archive_label: String,
    #[serde(default = "default_final_archive_label")]
    pub final_archive_label: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_gateway_command")]
    pub gateway_command: String,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    // Display only; the gateway never sees it.
    #[serde(default)]
    pub filter: String,
    #[serde(default, rename = "match")]
    pub criteria: MatchCriteria,
    #[serde(default)]
    pub exclude: ExcludeCriteria,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub mark_important: bool,
    #[serde(default)]
    pub inbox_days: Option<i64>,
}

/// Positive criteria. Every pattern that is present must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, alias = "recipients", skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_includes: Option<String>,
}

/// Negative criteria. Any matching pattern excludes the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeCriteria {
    #[serde(default, deserialize_with = "one_or_many")]
    pub any: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub subject: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub body: Vec<String>,
    #[serde(default, alias = "recipients", deserialize_with = "one_or_many")]
    pub to: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(pattern)) => vec![pattern],
        Some(OneOrMany::Many(patterns)) => patterns,
    })
}

fn default_required_label() -> String {
    "INBOX".to_string()
}

fn default_auto_archive_label() -> String {
    "Auto Archive".to_string()
}

fn default_final_archive_label() -> String {
    "Archived".to_string()
}

fn default_page_size() -> usize {
    20
}

fn default_limit() -> usize {
    50
}

fn default_fetch_timeout_seconds() -> u64 {
    60
}

fn default_gateway_command() -> String {
    "gwsa".to_string()
}

fn default_enabled() -> bool {
    true
}

/// How long a matched record may stay under the required label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Never,
    /// Archive once the record is at least this many days old; 0 archives immediately.
    Days(u32),
}

impl Retention {
    pub fn from_inbox_days(inbox_days: i64) -> Option<Self> {
        match inbox_days {
            -1 => Some(Retention::Never),
            n if n >= 0 => u32::try_from(n).ok().map(Retention::Days),
            _ => None,
        }
    }

    pub fn inbox_days(self) -> i64 {
        match self {
            Retention::Never => -1,
            Retention::Days(days) => i64::from(days),
        }
    }
}

/// A validated, enabled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub filter: String,
    pub criteria: MatchCriteria,
    pub exclude: ExcludeCriteria,
    pub label: Option<String>,
    pub mark_important: bool,
    pub retention: Option<Retention>,
}

/// Validated run configuration. Only enabled rules are kept, in file order.
#[derive(Debug, Clone)]
pub struct Config {
    pub required_label: String,
    pub auto_archive_label: String,
    pub final_archive_label: String,
    pub page_size: usize,
    pub limit: usize,
    pub fetch_timeout: Duration,
    pub gateway_command: String,
    pub rules: Vec<Rule>,
    pub disabled_rules: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile {
            required_label: default_required_label(),
            auto_archive_label: default_auto_archive_label(),
            final_archive_label: default_final_archive_label(),
            page_size: default_page_size(),
            limit: default_limit(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            gateway_command: default_gateway_command(),
            rules: vec![
                RuleConfig {
                    name: "Receipts".to_string(),
                    enabled: true,
                    filter: "subject:(receipt OR invoice)".to_string(),
                    criteria: MatchCriteria {
                        subject: Some(r"\b(receipt|invoice|order confirmation)\b".to_string()),
                        ..Default::default()
                    },
                    exclude: ExcludeCriteria::default(),
                    label: Some("Receipts".to_string()),
                    mark_important: false,
                    inbox_days: Some(7),
                },
                RuleConfig {
                    name: "Newsletters".to_string(),
                    enabled: true,
                    filter: "unsubscribe".to_string(),
                    criteria: MatchCriteria {
                        body: Some("unsubscribe".to_string()),
                        ..Default::default()
                    },
                    exclude: ExcludeCriteria {
                        any: vec!["urgent".to_string()],
                        ..Default::default()
                    },
                    label: Some("Newsletters".to_string()),
                    mark_important: false,
                    inbox_days: Some(0),
                },
            ],
        }
    }
}

impl ConfigFile {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: ConfigFile = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))
    }

    pub fn validate(self) -> anyhow::Result<Config> {
        if self.rules.is_empty() {
            bail!("No rules defined in configuration");
        }
        if self.page_size == 0 {
            bail!("page_size must be greater than zero");
        }

        let total = self.rules.len();
        let mut seen = HashSet::new();
        let mut rules = Vec::new();

        for (index, raw) in self.rules.into_iter().enumerate() {
            let name = raw.name.trim().to_string();
            if name.is_empty() {
                bail!("Rule {} has no name", index + 1);
            }
            if !raw.enabled {
                log::debug!("Rule '{name}' is disabled");
                continue;
            }
            if !seen.insert(name.clone()) {
                bail!("Duplicate rule name '{name}' among enabled rules");
            }

            let retention = match raw.inbox_days {
                None => None,
                Some(days) => match Retention::from_inbox_days(days) {
                    Some(retention) => Some(retention),
                    None => bail!(
                        "Rule '{name}' has invalid inbox_days {days} (expected -1, 0 or a positive number)"
                    ),
                },
            };

            rules.push(Rule {
                name,
                filter: raw.filter,
                criteria: raw.criteria,
                exclude: raw.exclude,
                label: raw.label.filter(|label| !label.is_empty()),
                mark_important: raw.mark_important,
                retention,
            });
        }

        if rules.is_empty() {
            bail!("All {total} rules are disabled");
        }

        Ok(Config {
            required_label: self.required_label,
            auto_archive_label: self.auto_archive_label,
            final_archive_label: self.final_archive_label,
            page_size: self.page_size,
            limit: self.limit,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_seconds),
            gateway_command: self.gateway_command,
            disabled_rules: total - rules.len(),
            rules,
        })
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        ConfigFile::from_file(path)?.validate()
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        ConfigFile::from_yaml(content)?.validate()
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}

/// Resolve the rule file: explicit path, then `INBOX_TRIAGE_CONFIG`, then the config directory.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("INBOX_TRIAGE_CONFIG") {
        return PathBuf::from(path);
    }
    let dir = std::env::var("INBOX_TRIAGE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config").join(APP_NAME));
    dir.join("config.yaml")
}

/// Directory holding run artifacts and the usage history.
pub fn data_dir() -> PathBuf {
    std::env::var("INBOX_TRIAGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share").join(APP_NAME))
}
