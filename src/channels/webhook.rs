use crate::channels::{mismatched, Channel, HttpTransport, TransportResponse};
use crate::error::Result;
use crate::models::{ChannelKind, ChannelMessage, Destination, HttpMethod, RecipientResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use std::collections::BTreeMap;

/// Custom webhook channel: configurable method and headers, text body
#[derive(Clone)]
pub struct WebhookChannel {
    http: HttpTransport,
}

impl WebhookChannel {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
        }
    }

    fn build_headers(
        headers: &BTreeMap<String, String>,
    ) -> std::result::Result<HeaderMap, TransportResponse> {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                TransportResponse::bad_request(format!("Invalid header name '{}'", name))
            })?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                TransportResponse::bad_request(format!("Invalid value for header '{}'", name))
            })?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let Destination::Webhook {
            url,
            method,
            headers,
        } = destination
        else {
            return Err(mismatched(self.kind(), destination));
        };

        let target = match self.http.check_url(url) {
            Ok(target) => target,
            Err(rejected) => return Ok(rejected.into_result(url)),
        };
        let headers = match Self::build_headers(headers) {
            Ok(headers) => headers,
            Err(rejected) => return Ok(rejected.into_result(url)),
        };

        tracing::debug!(ref_tag, channel = "webhook", method = %method, "Calling custom webhook");
        let request = self
            .http
            .client()
            .request(Self::method(*method), target)
            .headers(headers)
            .body(message.text_body.clone());

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

    fn channel() -> WebhookChannel {
        let config = Config::from_defaults().unwrap();
        WebhookChannel::new(HttpTransport::new(&config.dispatch, SettingsHandle::default()).unwrap())
    }

    #[tokio::test]
    async fn test_send_with_method_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/events")
            .match_header("x-api-key", "secret")
            .match_header("content-type", "text/plain")
            .match_body(Matcher::Exact("body text".to_string()))
            .with_status(202)
            .create_async()
            .await;

        let mut headers = BTreeMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        headers.insert("Content-Type".to_string(), "text/plain".to_string());

        let result = channel()
            .send(
                "ref-3",
                &Destination::Webhook {
                    url: format!("{}/events", server.url()),
                    method: HttpMethod::Put,
                    headers,
                },
                &ChannelMessage::new("ignored title", "body text"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_header_is_bad_request() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());

        let result = channel()
            .send(
                "ref-3",
                &Destination::Webhook {
                    url: "https://example.com/hook".to_string(),
                    method: HttpMethod::Post,
                    headers,
                },
                &ChannelMessage::new("", "b"),
            )
            .await
            .unwrap();
        assert_eq!(result.status(), StatusCode::BAD_REQUEST);
    }
}
