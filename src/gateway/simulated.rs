use super::{GatewayError, MailboxGateway, Page};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Dry-run wrapper: searches go to the inner gateway, mutations are logged
/// and reported as successful without being sent.
pub struct SimulatedGateway<G> {
    inner: G,
    suppressed: AtomicUsize,
}

impl<G: MailboxGateway> SimulatedGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            suppressed: AtomicUsize::new(0),
        }
    }

    /// Number of mutating calls that were not sent.
    pub fn suppressed_calls(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> G {
        self.inner
    }
}

#[async_trait]
impl<G: MailboxGateway> MailboxGateway for SimulatedGateway<G> {
    async fn search_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page, GatewayError> {
        self.inner.search_page(query, page_size, page_token).await
    }

    async fn label(&self, email_id: &str, label: &str, remove: bool) -> Result<(), GatewayError> {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        if remove {
            log::info!("[dry-run] would remove label '{label}' from {email_id}");
        } else {
            log::info!("[dry-run] would add label '{label}' to {email_id}");
        }
        Ok(())
    }
}
