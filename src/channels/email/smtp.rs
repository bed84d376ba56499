use crate::channels::email::{build_message, preflight};
use crate::channels::{mismatched, Channel, TransportResponse};
use crate::error::{AppError, Result};
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult, SmtpAccount, SmtpMethod};
use crate::settings::SettingsHandle;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::{debug, warn};

/// Email over SMTP
#[derive(Clone)]
pub struct SmtpChannel {
    settings: SettingsHandle,
    timeout: Duration,
}

impl SmtpChannel {
    pub fn new(settings: SettingsHandle, timeout: Duration) -> Self {
        Self { settings, timeout }
    }

    /// Env var prefix for an account's credentials, e.g. `NOTIFY_SMTP_OPS_MAIL`
    pub fn credential_env_prefix(account_name: &str) -> String {
        let name: String = account_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("NOTIFY_SMTP_{}", name)
    }

    fn credentials(account: &SmtpAccount) -> Option<Credentials> {
        let prefix = Self::credential_env_prefix(&account.name);
        let username = std::env::var(format!("{}_USERNAME", prefix)).ok()?;
        let password = std::env::var(format!("{}_PASSWORD", prefix)).ok()?;
        Some(Credentials::new(username, password))
    }

    fn transport(account: &SmtpAccount, timeout: Duration) -> Result<SmtpTransport> {
        if account.host.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "SMTP account '{}' has no host",
                account.name
            )));
        }

        let builder = match account.method {
            SmtpMethod::None => SmtpTransport::builder_dangerous(&account.host),
            SmtpMethod::Ssl => SmtpTransport::relay(&account.host).map_err(|e| {
                AppError::Configuration(format!("Invalid SMTP host '{}': {}", account.host, e))
            })?,
            SmtpMethod::StartTls => SmtpTransport::starttls_relay(&account.host).map_err(|e| {
                AppError::Configuration(format!("Invalid SMTP host '{}': {}", account.host, e))
            })?,
        };

        let builder = builder.port(account.port).timeout(Some(timeout));
        let builder = match Self::credentials(account) {
            Some(credentials) => builder.credentials(credentials),
            None => builder,
        };
        Ok(builder.build())
    }

    fn deliver(account: SmtpAccount, email: Message, timeout: Duration) -> TransportResponse {
        let transport = match Self::transport(&account, timeout) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(account = %account.name, error = %e, "SMTP transport misconfigured");
                return TransportResponse::internal_error(e.to_string());
            }
        };

        match transport.send(&email) {
            Ok(_) => TransportResponse::success(),
            Err(e) => {
                warn!(host = %account.host, error = %e, "SMTP delivery failed");
                TransportResponse::unavailable(format!("SMTP delivery failed: {}", e))
            }
        }
    }
}

#[async_trait]
impl Channel for SmtpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SmtpEmail
    }

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let Destination::SmtpEmail { account, recipient } = destination else {
            return Err(mismatched(self.kind(), destination));
        };

        let limit = self.settings.snapshot().email_size_limit_bytes;
        let envelope = match preflight(&account.from_address, recipient, message, limit) {
            Ok(envelope) => envelope,
            Err(rejected) => return Ok(rejected.into_result(recipient)),
        };
        let email = match build_message(envelope, message) {
            Ok(email) => email,
            Err(rejected) => return Ok(rejected.into_result(recipient)),
        };

        debug!(ref_tag, channel = "smtp_email", host = %account.host, "Sending email via SMTP");

        // lettre's SmtpTransport blocks
        let account = account.clone();
        let timeout = self.timeout;
        let response = tokio::task::spawn_blocking(move || Self::deliver(account, email, timeout))
            .await
            .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))?;

        Ok(response.into_result(recipient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ClusterOverrides;
    use reqwest::StatusCode;

    fn account(from_address: &str) -> SmtpAccount {
        account_on("127.0.0.1", from_address)
    }

    fn account_on(host: &str, from_address: &str) -> SmtpAccount {
        SmtpAccount {
            name: "ops-mail".to_string(),
            host: host.to_string(),
            port: 1,
            method: SmtpMethod::None,
            from_address: from_address.to_string(),
        }
    }

    fn channel(limit: usize) -> SmtpChannel {
        let settings = SettingsHandle::default();
        settings.apply_cluster_overrides(ClusterOverrides {
            email_size_limit_bytes: Some(limit),
            ..Default::default()
        });
        SmtpChannel::new(settings, Duration::from_secs(2))
    }

    async fn send(channel: &SmtpChannel, from: &str, message: ChannelMessage) -> RecipientResult {
        channel
            .send(
                "ref-5",
                &Destination::SmtpEmail {
                    account: account(from),
                    recipient: "oncall@example.com".to_string(),
                },
                &message,
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_credential_env_prefix() {
        assert_eq!(SmtpChannel::credential_env_prefix("ops-mail"), "NOTIFY_SMTP_OPS_MAIL");
    }

    #[tokio::test]
    async fn test_missing_from_is_not_implemented() {
        let result = send(&channel(10_000), "", ChannelMessage::new("t", "b")).await;
        assert_eq!(result.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_oversize_rejected_before_connecting() {
        // Port 1 is unreachable, so reaching the backend would yield 503
        let message = ChannelMessage::new("t", "x".repeat(500));
        let result = send(&channel(200), "alerts@example.com", message).await;
        assert_eq!(result.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let result = send(&channel(10_000), "alerts@example.com", ChannelMessage::new("t", "b")).await;
        assert_eq!(result.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(result.recipient, "oncall@example.com");
    }

    #[tokio::test]
    async fn test_unusable_transport_is_server_error() {
        let result = channel(10_000)
            .send(
                "ref-6",
                &Destination::SmtpEmail {
                    account: account_on(" ", "alerts@example.com"),
                    recipient: "oncall@example.com".to_string(),
                },
                &ChannelMessage::new("t", "b"),
            )
            .await
            .unwrap();

        assert_eq!(result.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(result.status_text.contains("no host"));
    }
}
