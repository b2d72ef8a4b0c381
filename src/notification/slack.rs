use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::task::JoinHandle;

/// Posts admin notifications to a Slack-compatible incoming webhook.
#[derive(Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            webhook_url,
        }
    }

    pub async fn send_new_request(
        &self,
        request_id: &uuid::Uuid,
        name: &str,
        email: &str,
        review_url: &str,
    ) -> anyhow::Result<()> {
        let text = format!(
            "📝 *New membership request*\n\nName: {}\nEmail: {}\nRequest ID: `{}`\n\nReview it at {}",
            name, email, request_id, review_url
        );
        self.post(text).await
    }

    /// `link` is the member's Telegram deep link; the admin forwards it.
    pub async fn send_request_approved(
        &self,
        request_id: &uuid::Uuid,
        member_email: &str,
        approved_by: &str,
        link: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut text = format!(
            "✅ Membership request `{}` for {} approved by {}",
            request_id, member_email, approved_by
        );
        if let Some(link) = link {
            text.push_str(&format!("\n\nSend this Telegram link to {}: {}", member_email, link));
        }
        self.post(text).await
    }

    /// Fire-and-forget wrapper: failures are logged, never returned.
    pub fn spawn_new_request(&self, request_id: uuid::Uuid, name: String, email: String, review_url: String) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_new_request(&request_id, &name, &email, &review_url)
                .await
            {
                tracing::warn!(request_id = %request_id, error = %e, "new request notification failed");
            }
        });
    }

    pub fn spawn_request_approved(
        &self,
        request_id: uuid::Uuid,
        member_email: String,
        approved_by: String,
        link: Option<String>,
    ) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_request_approved(&request_id, &member_email, &approved_by, link.as_deref())
                .await
            {
                tracing::warn!(request_id = %request_id, error = %e, "approval notification failed");
            }
        });
    }

    async fn post(&self, text: String) -> anyhow::Result<()> {
        let url = match &self.webhook_url {
            Some(u) => u,
            None => {
                tracing::debug!("No admin webhook URL configured, skipping notification");
                return Ok(());
            }
        };

        let resp = self
            .client
            .post(url)
            .json(&SlackMessage { text })
            .send()
            .await
            .context("failed to send admin notification")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned error: status={}, body={}", status, body);
        }

        tracing::debug!("Sent admin webhook notification");
        Ok(())
    }
}

#[derive(Serialize)]
struct SlackMessage {
    text: String,
}
