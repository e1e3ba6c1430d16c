use crate::email::Email;
use crate::gateway::{MailboxGateway, Page};
use std::collections::HashSet;
use std::time::Duration;

/// What the walk saw, for the run artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub pages_walked: usize,
    pub total_fetched: usize,
    /// Taken from the first page only.
    pub estimated_total: u64,
    pub more_available: bool,
}

/// Pulls bounded pages of `label:<required_label>` from a gateway.
///
/// Fetch failures and timeouts end the walk with whatever was gathered so
/// far; nothing is retried.
pub struct PageWalker<'a, G: ?Sized> {
    gateway: &'a G,
    query: String,
    page_size: usize,
    fetch_timeout: Duration,
}

impl<'a, G: MailboxGateway + ?Sized> PageWalker<'a, G> {
    pub fn new(
        gateway: &'a G,
        required_label: &str,
        page_size: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            query: format!("label:{required_label}"),
            page_size,
            fetch_timeout,
        }
    }

    pub async fn walk(
        &self,
        max_count: Option<usize>,
        fetch_all: bool,
    ) -> (Vec<Email>, WalkSummary) {
        let mut records = Vec::new();
        let mut summary = WalkSummary::default();
        let mut token: Option<String> = None;
        let mut requested: HashSet<String> = HashSet::new();

        loop {
            let page = self.fetch(token.as_deref(), summary.pages_walked).await;
            if summary.pages_walked == 0 {
                summary.estimated_total = page.result_size_estimate;
            }
            summary.pages_walked += 1;
            log::info!(
                "Page {}: {} emails (next token: {})",
                summary.pages_walked,
                page.records.len(),
                page.next_page_token.as_deref().unwrap_or("none")
            );
            records.extend(page.records);

            let Some(next) = page.next_page_token else {
                break;
            };
            if requested.contains(&next) {
                log::warn!("Page token '{next}' was already requested, stopping pagination");
                break;
            }

            let keep_going = fetch_all || matches!(max_count, Some(max) if records.len() < max);
            if !keep_going {
                summary.more_available = true;
                break;
            }
            requested.insert(next.clone());
            token = Some(next);
        }

        summary.total_fetched = records.len();
        (records, summary)
    }

    async fn fetch(&self, token: Option<&str>, index: usize) -> Page {
        let request = self
            .gateway
            .search_page(&self.query, self.page_size, token);

        match tokio::time::timeout(self.fetch_timeout, request).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                log::error!("Fetching page {} failed: {e}", index + 1);
                Page::default()
            }
            Err(_) => {
                log::error!(
                    "Fetching page {} timed out after {:?}",
                    index + 1,
                    self.fetch_timeout
                );
                Page::default()
            }
        }
    }
}
