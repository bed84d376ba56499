use crate::channels::aws::{region_from_arn, AwsClient, AwsService};
use crate::channels::http::truncate_chars;
use crate::channels::{mismatched, Channel, TransportResponse};
use crate::error::{AppError, Result};
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult};
use async_trait::async_trait;

/// SNS caps subjects at 100 characters
const MAX_SUBJECT_CHARS: usize = 100;

/// Amazon SNS topic channel
#[derive(Clone)]
pub struct SnsChannel {
    aws: AwsClient,
}

impl SnsChannel {
    pub fn new(aws: AwsClient) -> Self {
        Self { aws }
    }

    fn publish_params(topic_arn: &str, message: &ChannelMessage) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("Action", "Publish".to_string()),
            ("Version", "2010-03-31".to_string()),
            ("TopicArn", topic_arn.to_string()),
            ("Message", message.text_body.clone()),
        ];
        // Subject must be non-empty and single-line when present
        let subject = message.title.lines().next().unwrap_or_default().trim();
        if !subject.is_empty() {
            params.push(("Subject", truncate_chars(subject, MAX_SUBJECT_CHARS)));
        }
        params
    }
}

#[async_trait]
impl Channel for SnsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sns
    }

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let Destination::Sns {
            topic_arn,
            role_arn,
        } = destination
        else {
            return Err(mismatched(self.kind(), destination));
        };

        if !topic_arn.starts_with("arn:") {
            return Ok(TransportResponse::bad_request(format!("Invalid topic ARN '{}'", topic_arn))
                .into_result(topic_arn));
        }
        if message.text_body.is_empty() {
            return Ok(TransportResponse::bad_request("SNS message body is empty")
                .into_result(topic_arn));
        }

        let region = region_from_arn(topic_arn).unwrap_or(self.aws.default_region());
        if let Some(role) = role_arn {
            tracing::debug!(ref_tag, role = %role, "Publishing with ambient credentials; role not assumed");
        }

        let url = format!("{}/", self.aws.endpoint(AwsService::Sns, region));
        let request = self
            .aws
            .http()
            .client()
            .post(url)
            .form(&Self::publish_params(topic_arn, message))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build SNS request: {}", e)))?;

        tracing::debug!(ref_tag, channel = "sns", region, "Publishing to SNS topic");
        let response = self.aws.send_signed(request, AwsService::Sns, region).await?;
        Ok(response.into_result(topic_arn))
    }
}
