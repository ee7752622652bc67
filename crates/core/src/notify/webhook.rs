use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Notification, Notifier};

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct Payload<'a> {
    source: &'static str,
    sent_at: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        Ok(Self {
            client: builder.build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) {
        let payload = Payload {
            source: "grinder",
            sent_at: Utc::now().to_rfc3339(),
            notification,
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %self.url, "Webhook notification delivered")
            }
            Ok(response) => warn!(
                url = %self.url,
                status = %response.status(),
                "Webhook rejected notification"
            ),
            Err(e) => warn!(url = %self.url, error = %e, "Webhook notification failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_flattens_notification() {
        let notification = Notification::OrganizeStarted { items: 3 };
        let payload = Payload {
            source: "grinder",
            sent_at: "2024-01-01T00:00:00Z".to_string(),
            notification: &notification,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "organize_started");
        assert_eq!(json["items"], 3);
        assert_eq!(json["source"], "grinder");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_does_not_fail() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", 1).unwrap();
        notifier
            .notify(&Notification::OrganizeStarted { items: 1 })
            .await;
    }
}
