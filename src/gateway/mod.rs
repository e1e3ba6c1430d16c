//! Mailbox gateway: search, label and archive operations against the mail store.
//!
//! The engine only talks to [`MailboxGateway`]. [`GwsaGateway`] drives the
//! `gwsa` command line tool, [`MemoryGateway`] serves records from memory and
//! [`SimulatedGateway`] wraps either one to suppress every mutating call.

mod gwsa;
mod memory;
mod simulated;

pub use gwsa::{parse_search_output, GwsaGateway};
pub use memory::{GatewayCall, MemoryGateway};
pub use simulated::SimulatedGateway;

use crate::email::Email;
use async_trait::async_trait;
use std::time::Duration;

pub const IMPORTANT_LABEL: &str = "IMPORTANT";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code}: {stderr}")]
    Exit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Rejected by mailbox: {0}")]
    Rejected(String),
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Email>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: u64,
}

#[async_trait]
pub trait MailboxGateway: Send + Sync {
    /// Fetch one page of results for `query`.
    async fn search_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Page, GatewayError>;

    /// Add `label` to the email, or remove it when `remove` is set.
    async fn label(&self, email_id: &str, label: &str, remove: bool) -> Result<(), GatewayError>;

    async fn mark_important(&self, email_id: &str) -> Result<(), GatewayError> {
        self.label(email_id, IMPORTANT_LABEL, false).await
    }

    /// Remove the required label, then apply the final archive label.
    async fn archive(
        &self,
        email_id: &str,
        required_label: &str,
        final_archive_label: &str,
    ) -> Result<(), GatewayError> {
        self.label(email_id, required_label, true).await?;
        self.label(email_id, final_archive_label, false).await
    }
}
