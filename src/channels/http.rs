use crate::channels::TransportResponse;
use crate::config::DispatchConfig;
use crate::error::{AppError, Result};
use crate::settings::SettingsHandle;
use reqwest::{Client, Request, RequestBuilder, Url};
use std::time::Duration;

/// Longest backend response body echoed into a status text
const MAX_STATUS_TEXT: usize = 512;

/// Shared HTTP client for webhook-family and AWS channels
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    settings: SettingsHandle,
}

impl HttpTransport {
    pub fn new(config: &DispatchConfig, settings: SettingsHandle) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(config.http_connect_timeout_secs))
            .user_agent(concat!("notification-dispatcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Parse a destination URL and apply the host deny list.
    ///
    /// Rejections come back as a 400 response ready to report.
    pub fn check_url(&self, raw: &str) -> std::result::Result<Url, TransportResponse> {
        let url = Url::parse(raw)
            .map_err(|e| TransportResponse::bad_request(format!("Invalid URL '{}': {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportResponse::bad_request(format!(
                "Unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportResponse::bad_request(format!("URL '{}' has no host", raw)))?;

        if self.settings.snapshot().is_host_denied(host) {
            return Err(TransportResponse::bad_request(format!(
                "Host '{}' is denied",
                host
            )));
        }

        Ok(url)
    }

    /// Send a request and fold every outcome into a response
    pub async fn execute(&self, request: RequestBuilder) -> TransportResponse {
        match request.build() {
            Ok(request) => self.execute_request(request).await,
            Err(e) => TransportResponse::bad_request(format!("Invalid request: {}", e)),
        }
    }

    pub async fn execute_request(&self, request: Request) -> TransportResponse {
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("Request timed out: {}", e)
                } else if e.is_connect() {
                    format!("Failed to connect: {}", e)
                } else {
                    format!("Request failed: {}", e)
                };
                return TransportResponse::unavailable(reason);
            }
        };

        let status = response.status();
        if status.is_success() {
            return TransportResponse::success();
        }

        let body = response.text().await.unwrap_or_default();
        let text = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        } else {
            truncate_chars(body.trim(), MAX_STATUS_TEXT)
        };
        TransportResponse::new(status, text)
    }
}

/// Truncate on a character boundary
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::settings::{ClusterOverrides, SettingsHandle};
    use reqwest::StatusCode;

    fn transport(deny: Vec<String>) -> HttpTransport {
        let settings = SettingsHandle::default();
        settings.apply_cluster_overrides(ClusterOverrides {
            host_deny_list: Some(deny),
            ..Default::default()
        });
        HttpTransport::new(&Config::from_defaults().unwrap().dispatch, settings).unwrap()
    }

    #[test]
    fn test_check_url_rejections() {
        let transport = transport(vec!["169.254.169.254".to_string()]);

        assert!(transport.check_url("https://hooks.example.com/x").is_ok());

        let err = transport.check_url("not a url").unwrap_err();
        assert_eq!(err.status_code, StatusCode::BAD_REQUEST);

        let err = transport.check_url("ftp://files.example.com/x").unwrap_err();
        assert_eq!(err.status_code, StatusCode::BAD_REQUEST);

        let err = transport
            .check_url("http://169.254.169.254/latest/meta-data")
            .unwrap_err();
        assert!(err.status_text.contains("denied"));
    }

    #[tokio::test]
    async fn test_backend_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let transport = transport(vec![]);
        let url = format!("{}/hook", server.url());
        let response = transport.execute(transport.client().post(url)).await;

        mock.assert_async().await;
        assert_eq!(response.status_code, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.status_text, "slow down");
    }

    #[tokio::test]
    async fn test_connection_failure_is_unavailable() {
        let transport = transport(vec![]);
        let response = transport
            .execute(transport.client().post("http://127.0.0.1:1/unreachable"))
            .await;
        assert_eq!(response.status_code, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
