use crate::channels::{mismatched, Channel, HttpTransport};
use crate::error::Result;
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Slack incoming-webhook channel
#[derive(Clone)]
pub struct SlackChannel {
    http: HttpTransport,
}

#[derive(Debug, Serialize)]
struct SlackWebhookPayload {
    text: String,
}

impl SlackChannel {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    fn build_payload(message: &ChannelMessage) -> SlackWebhookPayload {
        SlackWebhookPayload {
            text: message.chat_text(),
        }
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let Destination::Slack { url } = destination else {
            return Err(mismatched(self.kind(), destination));
        };

        let target = match self.http.check_url(url) {
            Ok(target) => target,
            Err(rejected) => return Ok(rejected.into_result(url)),
        };

        debug!(ref_tag, channel = "slack", "Posting to Slack webhook");
        let request = self
            .http
            .client()
            .post(target)
            .json(&Self::build_payload(message));

        Ok(self.http.execute(request).await.into_result(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::settings::SettingsHandle;
    use mockito::Matcher;
    use reqwest::StatusCode;

    fn channel() -> SlackChannel {
        let config = Config::from_defaults().unwrap();
        SlackChannel::new(HttpTransport::new(&config.dispatch, SettingsHandle::default()).unwrap())
    }

    #[test]
    fn test_build_payload() {
        let payload = SlackChannel::build_payload(&ChannelMessage::new("Deploy", "v2 is live"));
        assert_eq!(payload.text, "Deploy\n\nv2 is live");
    }

    #[tokio::test]
    async fn test_send_posts_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/services/T/B/X")
            .match_body(Matcher::Json(serde_json::json!({"text": "Deploy\n\nv2 is live"})))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let url = format!("{}/services/T/B/X", server.url());
        let result = channel()
            .send(
                "ref-1",
                &Destination::Slack { url: url.clone() },
                &ChannelMessage::new("Deploy", "v2 is live"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.recipient, url);
        assert_eq!(result.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_url_is_bad_request() {
        let result = channel()
            .send(
                "ref-1",
                &Destination::Slack {
                    url: "hooks.slack.com/no-scheme".to_string(),
                },
                &ChannelMessage::new("t", "b"),
            )
            .await
            .unwrap();
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_destination_is_error() {
        let result = channel()
            .send(
                "ref-1",
                &Destination::Chime {
                    url: "https://example.com".to_string(),
                },
                &ChannelMessage::new("t", "b"),
            )
            .await;
        assert!(result.is_err());
    }
}
