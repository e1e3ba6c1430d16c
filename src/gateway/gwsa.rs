use super::{GatewayError, MailboxGateway, Page};
use crate::email::Email;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Gateway backed by the `gwsa` CLI (`gwsa mail search`, `gwsa mail label`).
pub struct GwsaGateway {
    command: String,
    timeout: Duration,
}

/// Structured search output, preferred over scraping stderr when present.
#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    messages: Vec<Email>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(default, rename = "resultSizeEstimate")]
    result_size_estimate: Option<u64>,
}

impl GwsaGateway {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<(String, String), GatewayError> {
        log::debug!("Running {} {}", self.command, args.join(" "));

        let child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
            .map_err(|source| GatewayError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(GatewayError::Exit {
                command: self.command.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok((stdout, stderr))
    }
}

#[async_trait]
impl MailboxGateway for GwsaGateway {
    async fn search_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page, GatewayError> {
        let page_size = page_size.to_string();
        let mut args = vec![
            "mail",
            "search",
            query,
            "--max-results",
            page_size.as_str(),
            "--format",
            "full",
        ];
        if let Some(token) = page_token {
            args.push("--page-token");
            args.push(token);
        }

        let (stdout, stderr) = self.run(&args).await?;
        parse_search_output(&stdout, &stderr)
    }

    async fn label(&self, email_id: &str, label: &str, remove: bool) -> Result<(), GatewayError> {
        let mut args = vec!["mail", "label", email_id, label];
        if remove {
            args.push("--remove");
        }
        self.run(&args).await.map(|_| ())
    }
}

/// Turn `gwsa mail search` output into a [`Page`].
///
/// Stdout is either a JSON envelope with explicit pagination fields or a bare
/// JSON list. For the bare list, the estimate and next token are read from the
/// diagnostic lines on stderr.
pub fn parse_search_output(stdout: &str, stderr: &str) -> Result<Page, GatewayError> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(Page::default());
    }

    let value: Value = serde_json::from_str(stdout)
        .map_err(|e| GatewayError::Malformed(format!("invalid JSON: {e}")))?;

    let (scraped_estimate, scraped_token) = scrape_pagination(stderr);

    if value.is_array() {
        let records: Vec<Email> = serde_json::from_value(value)
            .map_err(|e| GatewayError::Malformed(format!("unexpected record shape: {e}")))?;
        return Ok(Page {
            records,
            next_page_token: scraped_token,
            result_size_estimate: scraped_estimate.unwrap_or(0),
        });
    }

    let is_envelope = matches!(&value, Value::Object(map) if map.contains_key("messages"));
    if !is_envelope {
        return Err(GatewayError::Malformed(format!(
            "expected a list of messages, got {}",
            json_kind(&value)
        )));
    }

    let envelope: SearchEnvelope = serde_json::from_value(value)
        .map_err(|e| GatewayError::Malformed(format!("unexpected envelope shape: {e}")))?;
    Ok(Page {
        records: envelope.messages,
        next_page_token: envelope
            .next_page_token
            .filter(|t| !t.is_empty())
            .or(scraped_token),
        result_size_estimate: envelope
            .result_size_estimate
            .or(scraped_estimate)
            .unwrap_or(0),
    })
}

/// Read "estimated total: N" and "--page-token TOKEN" from diagnostic lines.
fn scrape_pagination(stderr: &str) -> (Option<u64>, Option<String>) {
    let mut estimate = None;
    let mut token = None;

    for line in stderr.lines() {
        let lower = line.to_lowercase();
        if let Some(pos) = lower.find("estimated total:") {
            let rest = &lower[pos + "estimated total:".len()..];
            if let Some(number) = rest.split_whitespace().next() {
                if let Ok(n) = number.trim_end_matches(')').parse() {
                    estimate = Some(n);
                }
            }
        }

        if let Some(pos) = line.find("--page-token") {
            let rest = &line[pos + "--page-token".len()..];
            if let Some(value) = rest.split_whitespace().next() {
                token = Some(value.to_string());
            }
        }
    }

    (estimate, token)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stdout_is_empty_page() {
        let page = parse_search_output("  \n", "").unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.next_page_token, None);
    }

    #[test]
    fn test_bare_list_with_scraped_metadata() {
        let stdout = r#"[{"id": "a", "subject": "Hi"}, {"id": "b"}]"#;
        let stderr = "INFO Found 2 messages (estimated total: 137)\n\
                      INFO More pages available. Use --page-token CkQw9 to fetch next page\n";

        let page = parse_search_output(stdout, stderr).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].subject, "Hi");
        assert_eq!(page.result_size_estimate, 137);
        assert_eq!(page.next_page_token.as_deref(), Some("CkQw9"));
    }

    #[test]
    fn test_structured_envelope_preferred() {
        let stdout = r#"{"messages": [{"id": "a"}], "nextPageToken": "tok2", "resultSizeEstimate": 40}"#;
        let stderr = "Use --page-token stale to fetch next page";

        let page = parse_search_output(stdout, stderr).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("tok2"));
        assert_eq!(page.result_size_estimate, 40);
    }

    #[test]
    fn test_envelope_without_token_is_last_page() {
        let stdout = r#"{"messages": [], "nextPageToken": ""}"#;
        let page = parse_search_output(stdout, "").unwrap();
        assert_eq!(page.next_page_token, None);
        assert_eq!(page.result_size_estimate, 0);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            parse_search_output("not json", ""),
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            parse_search_output(r#"{"error": "quota"}"#, ""),
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            parse_search_output("42", ""),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let gateway = GwsaGateway::new("inbox-triage-no-such-binary", Duration::from_secs(5));
        let result = gateway.label("id", "Label", false).await;
        assert!(matches!(result, Err(GatewayError::Spawn { .. })));
    }

    /// Writes an executable shell script standing in for the gwsa binary.
    #[cfg(unix)]
    fn fake_gwsa(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("gwsa");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_carries_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_gwsa(dir.path(), "echo 'quota exceeded' >&2\nexit 3");
        let gateway = GwsaGateway::new(command, Duration::from_secs(5));

        match gateway.label("m1", "Receipts", false).await {
            Err(GatewayError::Exit { code, stderr, .. }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("expected exit error, got {other:?}"),
        }
        assert!(matches!(
            gateway.search_page("label:INBOX", 10, None).await,
            Err(GatewayError::Exit { code: 3, .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_gwsa(dir.path(), "exec sleep 5");
        let gateway = GwsaGateway::new(command, Duration::from_millis(100));

        let started = std::time::Instant::now();
        let result = gateway.search_page("label:INBOX", 10, None).await;
        assert!(matches!(result, Err(GatewayError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_search_parses_command_output() {
        let dir = tempfile::tempdir().unwrap();
        let command = fake_gwsa(
            dir.path(),
            r#"echo '{"messages": [{"id": "a"}], "nextPageToken": "t2", "resultSizeEstimate": 9}'"#,
        );
        let gateway = GwsaGateway::new(command, Duration::from_secs(5));

        let page = gateway.search_page("label:INBOX", 10, None).await.unwrap();
        assert_eq!(page.records[0].id, "a");
        assert_eq!(page.next_page_token.as_deref(), Some("t2"));
        assert_eq!(page.result_size_estimate, 9);
    }
}
