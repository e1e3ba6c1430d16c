use super::{GatewayError, MailboxGateway, Page};
use crate::email::Email;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// A call received by [`MemoryGateway`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Search {
        query: String,
        page_token: Option<String>,
    },
    Label {
        email_id: String,
        label: String,
        remove: bool,
    },
}

enum Paging {
    /// Split the records by whatever page size the caller asks for.
    BySize(Vec<Email>),
    /// Serve these exact pages in order.
    Fixed(Vec<Vec<Email>>),
}

/// In-memory mailbox used for offline replays and tests.
///
/// Page tokens are `page-<n>`. Label calls always succeed unless the
/// `(email_id, label)` pair was registered with [`MemoryGateway::fail_label`].
pub struct MemoryGateway {
    paging: Paging,
    failing_labels: HashSet<(String, String)>,
    failing_pages: HashSet<usize>,
    search_delay: Option<Duration>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl MemoryGateway {
    pub fn new(records: Vec<Email>) -> Self {
        Self::with_paging(Paging::BySize(records))
    }

    pub fn with_pages(pages: Vec<Vec<Email>>) -> Self {
        Self::with_paging(Paging::Fixed(pages))
    }

    fn with_paging(paging: Paging) -> Self {
        Self {
            paging,
            failing_labels: HashSet::new(),
            failing_pages: HashSet::new(),
            search_delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every `label` call for this pair fail, including removals.
    pub fn fail_label(mut self, email_id: &str, label: &str) -> Self {
        self.failing_labels
            .insert((email_id.to_string(), label.to_string()));
        self
    }

    /// Make the search for page `index` (0-based) fail.
    pub fn fail_page(mut self, index: usize) -> Self {
        self.failing_pages.insert(index);
        self
    }

    /// Delay every search, e.g. to exercise fetch timeouts.
    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Label calls only, as `(email_id, label, remove)`.
    pub fn label_calls(&self) -> Vec<(String, String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Label {
                    email_id,
                    label,
                    remove,
                } => Some((email_id, label, remove)),
                GatewayCall::Search { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Serve page `index` of the records carrying `label`, or of every record
    /// when the query names no label.
    fn page_at(&self, index: usize, page_size: usize, label: Option<&str>) -> Page {
        let visible = |records: &[Email]| -> Vec<Email> {
            records
                .iter()
                .filter(|email| label.map_or(true, |label| email.has_label(label)))
                .cloned()
                .collect()
        };

        match &self.paging {
            Paging::BySize(records) => {
                let records = visible(records);
                let size = page_size.max(1);
                let start = (index * size).min(records.len());
                let end = (start + size).min(records.len());
                Page {
                    records: records[start..end].to_vec(),
                    next_page_token: (end < records.len()).then(|| format!("page-{}", index + 1)),
                    result_size_estimate: records.len() as u64,
                }
            }
            Paging::Fixed(pages) => {
                let total: usize = pages.iter().map(|page| visible(page).len()).sum();
                Page {
                    records: pages.get(index).map(|page| visible(page)).unwrap_or_default(),
                    next_page_token: (index + 1 < pages.len())
                        .then(|| format!("page-{}", index + 1)),
                    result_size_estimate: total as u64,
                }
            }
        }
    }
}

/// The `label:<name>` term of a search query, if any.
fn query_label(query: &str) -> Option<&str> {
    query
        .split_whitespace()
        .find_map(|term| term.strip_prefix("label:"))
}

#[async_trait]
impl MailboxGateway for MemoryGateway {
    async fn search_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page, GatewayError> {
        self.record(GatewayCall::Search {
            query: query.to_string(),
            page_token: page_token.map(str::to_string),
        });

        if let Some(delay) = self.search_delay {
            tokio::time::sleep(delay).await;
        }

        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| GatewayError::Malformed(format!("unknown page token {token}")))?,
        };

        if self.failing_pages.contains(&index) {
            return Err(GatewayError::Exit {
                command: "memory".to_string(),
                code: 1,
                stderr: format!("page {index} unavailable"),
            });
        }

        Ok(self.page_at(index, page_size, query_label(query)))
    }

    async fn label(&self, email_id: &str, label: &str, remove: bool) -> Result<(), GatewayError> {
        self.record(GatewayCall::Label {
            email_id: email_id.to_string(),
            label: label.to_string(),
            remove,
        });

        if self
            .failing_labels
            .contains(&(email_id.to_string(), label.to_string()))
        {
            return Err(GatewayError::Rejected(format!(
                "cannot change label '{label}' on {email_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(n: usize) -> Vec<Email> {
        (0..n)
            .map(|i| Email {
                id: format!("m{i}"),
                label_ids: vec!["INBOX".to_string()],
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pages_by_requested_size() {
        let gateway = MemoryGateway::new(emails(5));

        let first = gateway.search_page("label:INBOX", 2, None).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.result_size_estimate, 5);
        assert_eq!(first.next_page_token.as_deref(), Some("page-1"));

        let last = gateway.search_page("label:INBOX", 2, Some("page-2")).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.next_page_token, None);
    }

    #[tokio::test]
    async fn test_search_only_returns_queried_label() {
        let mut records = emails(2);
        records.insert(
            1,
            Email {
                id: "arch".to_string(),
                label_ids: vec!["Archived".to_string()],
                ..Default::default()
            },
        );
        let gateway = MemoryGateway::new(records);

        let inbox = gateway.search_page("label:INBOX", 10, None).await.unwrap();
        let ids: Vec<_> = inbox.records.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1"]);
        assert_eq!(inbox.result_size_estimate, 2);

        let archived = gateway.search_page("label:Archived", 10, None).await.unwrap();
        assert_eq!(archived.records.len(), 1);
        assert_eq!(archived.records[0].id, "arch");

        let missing = gateway.search_page("label:Nowhere", 10, None).await.unwrap();
        assert!(missing.records.is_empty());
        assert_eq!(missing.next_page_token, None);

        assert_eq!(gateway.search_page("q", 10, None).await.unwrap().records.len(), 3);
    }

    #[tokio::test]
    async fn test_archive_is_remove_then_add() {
        let gateway = MemoryGateway::new(Vec::new());
        gateway.archive("m1", "INBOX", "Archived").await.unwrap();

        assert_eq!(
            gateway.label_calls(),
            vec![
                ("m1".to_string(), "INBOX".to_string(), true),
                ("m1".to_string(), "Archived".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_removal_stops_archive() {
        let gateway = MemoryGateway::new(Vec::new()).fail_label("m1", "INBOX");
        assert!(gateway.archive("m1", "INBOX", "Archived").await.is_err());
        assert_eq!(gateway.label_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_page() {
        let gateway = MemoryGateway::with_pages(vec![emails(1), emails(1)]).fail_page(1);
        assert!(gateway.search_page("q", 1, None).await.is_ok());
        assert!(gateway.search_page("q", 1, Some("page-1")).await.is_err());
    }
}
