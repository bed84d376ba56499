//! Delivery channels.
//!
//! A [`Channel`] sends one message to one recipient and reports the outcome
//! as a [`RecipientResult`]. Expected failures (bad address, oversize
//! payload, backend or network errors) are results, not errors; `Err` is
//! reserved for faults the caller cannot act on per recipient.

pub mod aws;
pub mod chime;
pub mod email;
pub mod http;
pub mod registry;
pub mod slack;
pub mod sns;
pub mod webhook;

pub use chime::ChimeChannel;
pub use email::{SesChannel, SmtpChannel};
pub use http::HttpTransport;
pub use registry::ChannelRegistry;
pub use slack::SlackChannel;
pub use sns::SnsChannel;
pub use webhook::WebhookChannel;

use crate::error::{AppError, Result};
use crate::models::{ChannelKind, ChannelMessage, Destination, RecipientResult};
use async_trait::async_trait;
use reqwest::StatusCode;

#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(
        &self,
        ref_tag: &str,
        destination: &Destination,
        message: &ChannelMessage,
    ) -> Result<RecipientResult>;
}

/// Uniform outcome of one backend call
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status_code: StatusCode,
    pub status_text: String,
}

impl TransportResponse {
    pub fn new(status_code: StatusCode, status_text: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(StatusCode::OK, "Success")
    }

    pub fn bad_request(text: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, text)
    }

    pub fn unavailable(text: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, text)
    }

    /// Fault on our side, such as an unusable channel configuration
    pub fn internal_error(text: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, text)
    }

    pub fn into_result(self, recipient: &str) -> RecipientResult {
        RecipientResult::new(recipient, self.status_code, self.status_text)
    }
}

/// Error for a destination routed to the wrong channel
pub(crate) fn mismatched(kind: ChannelKind, destination: &Destination) -> AppError {
    AppError::Internal(format!(
        "{} channel cannot deliver to {} destination",
        kind,
        destination.kind()
    ))
}
