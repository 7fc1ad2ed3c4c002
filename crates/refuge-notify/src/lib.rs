use std::sync::Arc;

use refuge_types::Error;
use tracing::{debug, warn};

/// Outbound mail relay settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// HTTP endpoint of the mail relay. Empty disables dispatch entirely.
    pub endpoint: String,
    pub from: String,
    /// Every privileged address gets its own delivery attempt.
    pub recipients: Vec<String>,
}

/// Fire-and-forget dispatcher for new-ticket notifications.
///
/// Each recipient gets an independent background task with a single delivery
/// attempt; failures are logged and dropped. The ticket write path never
/// holds a reference to or awaits these tasks.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    config: Arc<NotifyConfig>,
}

impl Notifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    /// Announce a freshly created ticket to every configured recipient.
    pub fn ticket_created(&self, protocol: &str, body: &str) {
        if self.config.endpoint.is_empty() || self.config.recipients.is_empty() {
            debug!("Notification transport disabled; skipping dispatch for {protocol}");
            return;
        }

        let text = format!(
            "A new report was filed under protocol {protocol}.\n\n{body}"
        );

        for to in &self.config.recipients {
            let client = self.client.clone();
            let endpoint = self.config.endpoint.clone();
            let payload = serde_json::json!({
                "from": self.config.from,
                "to": to,
                "subject": format!("New report {protocol}"),
                "text": text,
            });
            let to = to.clone();
            let protocol = protocol.to_string();

            tokio::spawn(async move {
                match deliver(&client, &endpoint, &payload).await {
                    Ok(()) => debug!("Notification for {} delivered to {}", protocol, to),
                    Err(e) => warn!("Notification for {} to {} dropped: {}", protocol, to, e),
                }
            });
        }
    }
}

async fn deliver(
    client: &reqwest::Client,
    endpoint: &str,
    payload: &serde_json::Value,
) -> Result<(), Error> {
    let resp = client
        .post(endpoint)
        .json(payload)
        .send()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(Error::Transport(format!("relay answered {}", resp.status())));
    }
    Ok(())
}
