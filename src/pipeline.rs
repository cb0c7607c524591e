//! Pipeline driver: one pass from unread mail to filed issues.
//!
//! Flow:
//! 1. Load and validate both configurations
//! 2. Collect unread mail (fetch, extract, flag seen) on a blocking thread
//! 3. Publish each collected message, one at a time, in mailbox order
//!
//! Publishing starts only after every message has been fetched and flagged.
//! A failed publish is logged and does not stop the remaining messages.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::{ConfigProvider, MailboxConfig, TrackerConfig};
use crate::error::Result;
use crate::mailbox::{ImapMailbox, Mailbox, UnreadBatch, collect_unread};
use crate::tracker::{GithubPublisher, IssuePublisher};

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Messages fetched and flagged seen.
    pub fetched: usize,
    /// Messages left unseen because they could not be decoded.
    pub skipped: usize,
    /// Issues filed.
    pub published: usize,
    /// Publish attempts that failed.
    pub failed: usize,
    /// The run stopped before publishing (bad config or mailbox failure).
    pub aborted: bool,
}

impl RunReport {
    /// True when nothing went wrong.
    pub fn is_clean(&self) -> bool {
        !self.aborted && self.failed == 0 && self.skipped == 0
    }
}

/// Mail-to-issue pipeline with injected collaborators.
pub struct Pipeline {
    config: Arc<dyn ConfigProvider>,
    mailbox: Arc<dyn Mailbox>,
    publisher: Arc<dyn IssuePublisher>,
}

impl Pipeline {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        mailbox: Arc<dyn Mailbox>,
        publisher: Arc<dyn IssuePublisher>,
    ) -> Self {
        Self {
            config,
            mailbox,
            publisher,
        }
    }

    /// IMAP mailbox and GitHub publisher.
    pub fn with_defaults(config: Arc<dyn ConfigProvider>) -> Result<Self> {
        let publisher = GithubPublisher::new()?;
        Ok(Self::new(
            config,
            Arc::new(ImapMailbox::new()),
            Arc::new(publisher),
        ))
    }

    /// Run one pass. Never fails; problems are logged and counted.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();

        let mailbox_config = match MailboxConfig::from_map(&self.config.mailbox_config()) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(error = %e, "Invalid mailbox configuration");
                report.aborted = true;
                return report;
            }
        };
        // Both configs must be valid before the mailbox is touched.
        let tracker_config = match TrackerConfig::from_map(&self.config.tracker_config()) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(error = %e, "Invalid tracker configuration");
                report.aborted = true;
                return report;
            }
        };

        let mailbox = Arc::clone(&self.mailbox);
        let batch = match tokio::task::spawn_blocking(move || {
            collect_unread(mailbox.as_ref(), &mailbox_config)
        })
        .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!("Mailbox task panicked: {e}");
                report.aborted = true;
                return report;
            }
        };

        let UnreadBatch {
            messages,
            skipped,
            failure,
        } = batch;
        report.fetched = messages.len();
        report.skipped = skipped.len();
        report.aborted = failure.is_some();

        if !messages.is_empty() {
            info!(count = messages.len(), repo = %tracker_config.repo_slug(), "Publishing issues");
        }

        for message in &messages {
            match self.publisher.publish(message, &tracker_config).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    warn!(id = %message.id, subject = %message.subject, error = %e, "Failed to file issue");
                    report.failed += 1;
                }
            }
        }

        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            published = report.published,
            failed = report.failed,
            aborted = report.aborted,
            "Run complete"
        );
        report
    }
}
