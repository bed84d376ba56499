use crate::channels::aws::{AwsClient, AwsService};
use crate::channels::email::{build_message, preflight};
use crate::channels::{mismatched, Channel};
use crate::error::{AppError, Result};
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult};
use crate::settings::SettingsHandle;
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use serde::Serialize;

/// Email through the SES v2 `SendEmail` API with a raw MIME body
#[derive(Clone)]
pub struct SesChannel {
    aws: AwsClient,
    settings: SettingsHandle,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest {
    from_email_address: String,
    destination: SesDestination,
    content: SesContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SesDestination {
    to_addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SesContent {
    raw: SesRawMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SesRawMessage {
    /// Base64 of the full MIME message
    data: String,
}

impl SesChannel {
    pub fn new(aws: AwsClient, settings: SettingsHandle) -> Self {
        Self { aws, settings }
    }
}

#[async_trait]
impl Channel for SesChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SesEmail
    }

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let Destination::SesEmail { account, recipient } = destination else {
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

        let payload = SendEmailRequest {
            from_email_address: account.from_address.clone(),
            destination: SesDestination {
                to_addresses: vec![recipient.clone()],
            },
            content: SesContent {
                raw: SesRawMessage {
                    data: Base64::encode_string(&email.formatted()),
                },
            },
        };

        let region = if account.region.is_empty() {
            self.aws.default_region()
        } else {
            account.region.as_str()
        };
        let url = format!(
            "{}/v2/email/outbound-emails",
            self.aws.endpoint(AwsService::Ses, region)
        );
        let request = self
            .aws
            .http()
            .client()
            .post(url)
            .json(&payload)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build SES request: {}", e)))?;

        tracing::debug!(ref_tag, channel = "ses_email", region, account = %account.name, "Sending email via SES");
        let response = self.aws.send_signed(request, AwsService::Ses, region).await?;
        Ok(response.into_result(recipient))
    }
}
