//! Issue publisher: files one tracker issue per mail message.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{HTTP_CONNECT_TIMEOUT, HTTP_TIMEOUT, TrackerConfig};
use crate::error::PublishError;
use crate::message::MailMessage;

/// Body of an issue-creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
}

impl From<&MailMessage> for IssueRequest {
    fn from(message: &MailMessage) -> Self {
        Self {
            title: message.subject.clone(),
            body: message.body.clone(),
        }
    }
}

/// Destination for filed issues.
#[async_trait]
pub trait IssuePublisher: Send + Sync {
    async fn publish(
        &self,
        message: &MailMessage,
        config: &TrackerConfig,
    ) -> Result<(), PublishError>;
}

/// GitHub REST API publisher.
pub struct GithubPublisher {
    client: reqwest::Client,
}

impl GithubPublisher {
    pub fn new() -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("issue-bot/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PublishError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// `POST` target for new issues in the configured repository.
pub fn issues_url(config: &TrackerConfig) -> String {
    format!(
        "{}/repos/{}/{}/issues",
        config.api_url.trim_end_matches('/'),
        config.username,
        config.repo
    )
}

#[async_trait]
impl IssuePublisher for GithubPublisher {
    async fn publish(
        &self,
        message: &MailMessage,
        config: &TrackerConfig,
    ) -> Result<(), PublishError> {
        let request = IssueRequest::from(message);
        let repo = config.repo_slug();

        let resp = self
            .client
            .post(issues_url(config))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", config.token.expose_secret()),
            )
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Request {
                repo: repo.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PublishError::Status {
                repo,
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "Tracker accepted issue");
        info!(id = %message.id, repo = %repo, title = %request.title, "Filed issue");
        Ok(())
    }
}
