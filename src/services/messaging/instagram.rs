use anyhow::Context;
use async_trait::async_trait;

use super::MessagingProvider;

/// Instagram direct messages through the Graph API send endpoint.
pub struct InstagramMessenger {
    access_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl InstagramMessenger {
    pub fn new(access_token: String, api_version: &str) -> Self {
        Self::with_base_url(
            access_token,
            format!("https://graph.facebook.com/v{api_version}"),
        )
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: serde_json::Value, what: &str) -> anyhow::Result<()> {
        let url = format!("{}/me/messages", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("access_token", &self.access_token)])
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to {what}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let msg = body["error"]["message"].as_str().unwrap_or("unknown error");
            anyhow::bail!("Graph API error ({status}) on {what}: {msg}");
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingProvider for InstagramMessenger {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.post(
            serde_json::json!({
                "recipient": { "id": to },
                "message": { "text": body },
                "messaging_type": "RESPONSE",
            }),
            "send Instagram message",
        )
        .await
    }

    async fn mark_seen(&self, to: &str) -> anyhow::Result<()> {
        self.post(
            serde_json::json!({
                "recipient": { "id": to },
                "sender_action": "mark_seen",
            }),
            "mark Instagram message seen",
        )
        .await
    }
}
