use crate::channels::aws::AwsClient;
use crate::channels::{
    Channel, ChimeChannel, HttpTransport, SesChannel, SlackChannel, SmtpChannel, SnsChannel,
    TransportResponse, WebhookChannel,
};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{MetricsRegistry, NOTIFICATIONS_TOTAL, NOTIFICATION_DURATION_SECONDS};
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult};
use crate::settings::SettingsHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maps every channel kind to its implementation
pub struct ChannelRegistry {
    slack: Arc<dyn Channel>,
    chime: Arc<dyn Channel>,
    webhook: Arc<dyn Channel>,
    sns: Arc<dyn Channel>,
    smtp: Arc<dyn Channel>,
    ses: Arc<dyn Channel>,
    settings: SettingsHandle,
    metrics: Arc<MetricsRegistry>,
}

impl ChannelRegistry {
    pub fn new(
        config: &Config,
        settings: SettingsHandle,
        metrics: Arc<MetricsRegistry>,
        clock: SharedClock,
    ) -> Result<Self> {
        let http = HttpTransport::new(&config.dispatch, settings.clone())?;
        let aws = AwsClient::new(http.clone(), &config.channels.aws, clock);
        let smtp_timeout = Duration::from_secs(config.dispatch.http_timeout_secs);

        Ok(Self {
            slack: Arc::new(SlackChannel::new(http.clone())),
            chime: Arc::new(ChimeChannel::new(http.clone())),
            webhook: Arc::new(WebhookChannel::new(http)),
            sns: Arc::new(SnsChannel::new(aws.clone())),
            smtp: Arc::new(SmtpChannel::new(settings.clone(), smtp_timeout)),
            ses: Arc::new(SesChannel::new(aws, settings.clone())),
            settings,
            metrics,
        })
    }

    /// Replace the implementation for one kind
    pub fn with_channel(mut self, kind: ChannelKind, channel: Arc<dyn Channel>) -> Self {
        let slot = match kind {
            ChannelKind::Slack => &mut self.slack,
            ChannelKind::Chime => &mut self.chime,
            ChannelKind::Webhook => &mut self.webhook,
            ChannelKind::Sns => &mut self.sns,
            ChannelKind::SmtpEmail => &mut self.smtp,
            ChannelKind::SesEmail => &mut self.ses,
        };
        *slot = channel;
        self
    }

    pub fn resolve(&self, destination: &Destination) -> &dyn Channel {
        let channel = match destination.kind() {
            ChannelKind::Slack => &self.slack,
            ChannelKind::Chime => &self.chime,
            ChannelKind::Webhook => &self.webhook,
            ChannelKind::Sns => &self.sns,
            ChannelKind::SmtpEmail => &self.smtp,
            ChannelKind::SesEmail => &self.ses,
        };
        channel.as_ref()
    }

    /// Send through the resolved channel, enforcing the allowed kinds and
    /// recording the outcome
    pub async fn deliver(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult> {
        let kind = destination.kind();
        if !self.settings.snapshot().is_allowed(kind) {
            tracing::info!(ref_tag, channel = %kind, "Channel type not allowed");
            self.record(kind, false);
            return Ok(TransportResponse::bad_request("channel type not allowed")
                .into_result(destination.address()));
        }

        let start = Instant::now();
        let outcome = self.resolve(destination).send(ref_tag, destination, message).await;
        NOTIFICATION_DURATION_SECONDS
            .with_label_values(&[kind.as_ref()])
            .observe(start.elapsed().as_secs_f64());

        match &outcome {
            Ok(result) => {
                self.record(kind, result.is_success());
                tracing::info!(
                    ref_tag,
                    channel = %kind,
                    recipient = %result.recipient,
                    status = result.status_code,
                    "Recipient processed"
                );
            }
            Err(e) => {
                self.record(kind, false);
                tracing::error!(ref_tag, channel = %kind, error = %e, "Channel send failed");
            }
        }
        outcome
    }

    fn record(&self, kind: ChannelKind, success: bool) {
        self.metrics.record_send(kind, success);
        NOTIFICATIONS_TOTAL
            .with_label_values(&[kind.as_ref(), if success { "success" } else { "failure" }])
            .inc();
    }
}
